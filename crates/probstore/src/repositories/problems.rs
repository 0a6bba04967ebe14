use std::collections::HashSet;
use std::sync::Arc;

use probstore_core::keys;
use probstore_core::problem::{
    sort_testcases, BlobRef, Problem, ProblemUpdate, StoredTestCase, TestCase, TestCaseRecord,
};
use probstore_core::storage::{
    from_item, to_item, BlobStore, Condition, Index, Item, ItemKey, ItemStore, Query,
    RepositoryError, Result, WriteOutcome, WriteRequest,
};
use probstore_core::tiering;

use super::now;
use crate::tiering::BlobTieringService;

/// Problems and their test cases.
///
/// A problem's metadata (`META`) and test cases (`TC#<id>`) share one
/// partition. Large test cases live in the blob store and only a reference is
/// kept in the table.
#[derive(Clone)]
pub struct ProblemRepository {
    store: Arc<dyn ItemStore>,
    tiering: BlobTieringService,
}

impl ProblemRepository {
    pub fn new(store: Arc<dyn ItemStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            tiering: BlobTieringService::new(blobs),
        }
    }

    /// Creates a problem. Fails with `AlreadyExists` if the key is taken.
    pub async fn create_problem(&self, problem: &Problem) -> Result<()> {
        let item = to_item(problem)?;
        match self
            .store
            .put(item, Some(Condition::item_not_exists()))
            .await?
        {
            WriteOutcome::Applied(()) => {
                tracing::debug!(
                    platform = %problem.platform,
                    problem_id = %problem.problem_id,
                    "Created problem"
                );
                Ok(())
            }
            WriteOutcome::ConditionFailed => Err(RepositoryError::AlreadyExists {
                entity_type: "Problem",
                id: problem_ref(&problem.platform, &problem.problem_id),
            }),
        }
    }

    pub async fn get_problem(&self, platform: &str, problem_id: &str) -> Result<Option<Problem>> {
        let item = self
            .store
            .get(&Problem::item_key(platform, problem_id)?)
            .await?;
        item.as_ref().map(from_item::<Problem>).transpose()
    }

    /// Applies a partial update and returns the problem as stored.
    pub async fn update_problem(
        &self,
        platform: &str,
        problem_id: &str,
        changes: &ProblemUpdate,
    ) -> Result<Problem> {
        let key = Problem::item_key(platform, problem_id)?;
        match self.store.update(&key, &changes.to_update(now())?).await? {
            WriteOutcome::Applied(item) => from_item(&item),
            WriteOutcome::ConditionFailed => Err(RepositoryError::NotFound {
                entity_type: "Problem",
                id: problem_ref(platform, problem_id),
            }),
        }
    }

    /// Completed or draft problems, newest first.
    pub async fn list_problems(
        &self,
        completed: bool,
        limit: Option<usize>,
    ) -> Result<Vec<Problem>> {
        let query = Query::partition(keys::problem_gsi1_pk(completed))
            .on_index(Index::Gsi1)
            .descending()
            .limit(limit);
        let items = self.store.query(&query).await?;
        items.iter().map(from_item::<Problem>).collect()
    }

    /// Deletes a problem with all of its test cases and blobs.
    ///
    /// Blob deletion is best-effort; the table items are removed regardless.
    /// Returns true if the problem's metadata item existed.
    pub async fn delete_problem(&self, platform: &str, problem_id: &str) -> Result<bool> {
        let items = self
            .store
            .query(&Query::partition(keys::problem_pk(platform, problem_id)?))
            .await?;

        let meta_key = Problem::item_key(platform, problem_id)?;
        let mut existed = false;
        let mut deletes = Vec::with_capacity(items.len());
        let mut orphaned_blobs = 0usize;

        for item in &items {
            let Some(key) = ItemKey::from_item(item) else {
                continue;
            };
            if key == meta_key {
                existed = true;
            } else if key.sk.starts_with(keys::TESTCASE_PREFIX) {
                if let Some(blob_key) = tiered_blob_key(item) {
                    if !self.tiering.delete(&blob_key).await {
                        orphaned_blobs += 1;
                    }
                }
            }
            deletes.push(WriteRequest::Delete(key));
        }

        if !self
            .tiering
            .delete(&tiering::snapshot_blob_key(platform, problem_id)?)
            .await
        {
            orphaned_blobs += 1;
        }

        let removed = deletes.len();
        self.store.batch_write(deletes).await?;

        tracing::info!(
            platform,
            problem_id,
            removed,
            orphaned_blobs,
            "Deleted problem"
        );
        Ok(existed)
    }

    /// Stores one test case, tiering it if it is too large to keep inline.
    ///
    /// Test cases are immutable: an id that is already stored fails with
    /// `AlreadyExists`. The blob is written before the reference. If the
    /// reference cannot be written the blob is removed again, best-effort,
    /// unless another writer's reference points at it.
    pub async fn add_testcase(
        &self,
        platform: &str,
        problem_id: &str,
        testcase: TestCase,
    ) -> Result<StoredTestCase> {
        let now = now();
        let key = TestCaseRecord::item_key(platform, problem_id, &testcase.testcase_id)?;
        if self.store.get(&key).await?.is_some() {
            return Err(testcase_exists(platform, problem_id, &testcase.testcase_id));
        }

        if !BlobTieringService::should_tier(&testcase) {
            let record = TestCaseRecord::inline(platform, problem_id, testcase.clone(), now);
            return match self
                .store
                .put(to_item(&record)?, Some(Condition::item_not_exists()))
                .await?
            {
                WriteOutcome::Applied(()) => Ok(StoredTestCase::Inline(testcase)),
                WriteOutcome::ConditionFailed => {
                    Err(testcase_exists(platform, problem_id, &testcase.testcase_id))
                }
            };
        }

        let blob = self
            .tiering
            .store_testcase(platform, problem_id, &testcase)
            .await?;
        let record = TestCaseRecord::tiered(
            platform,
            problem_id,
            testcase.testcase_id.clone(),
            blob.clone(),
            now,
        );

        let written = match to_item(&record) {
            Ok(item) => {
                self.store
                    .put(item, Some(Condition::item_not_exists()))
                    .await
            }
            Err(err) => Err(err),
        };
        match written {
            Ok(WriteOutcome::Applied(())) => {}
            Ok(WriteOutcome::ConditionFailed) => {
                // Lost a race for the id. The winner may reference the same blob key.
                if !self.references_blob(&key, &blob.key).await {
                    self.tiering.delete(&blob.key).await;
                }
                return Err(testcase_exists(platform, problem_id, &testcase.testcase_id));
            }
            Err(err) => {
                tracing::warn!(
                    key = %blob.key,
                    error = %err,
                    "Reference write failed, removing blob"
                );
                if !self.references_blob(&key, &blob.key).await {
                    self.tiering.delete(&blob.key).await;
                }
                return Err(err);
            }
        }

        tracing::debug!(
            key = %blob.key,
            size = blob.size,
            compressed = blob.compressed_size,
            "Tiered test case"
        );
        Ok(StoredTestCase::Tiered {
            testcase_id: testcase.testcase_id,
            blob,
        })
    }

    /// Stores many test cases. Inline cases go out in batches; tiered cases
    /// are written one by one. Returns the number stored.
    ///
    /// Fails with `AlreadyExists` before writing anything if an id is
    /// repeated or already stored. Batch writes are unconditional, so a
    /// concurrent writer adding the same id can still slip in between.
    pub async fn add_testcases(
        &self,
        platform: &str,
        problem_id: &str,
        testcases: Vec<TestCase>,
    ) -> Result<usize> {
        let mut taken: HashSet<String> = self
            .store
            .query(&testcases_query(platform, problem_id)?)
            .await?
            .iter()
            .filter_map(|item| from_item::<TestCaseRecord>(item).ok())
            .map(|record| record.testcase_id)
            .collect();
        for testcase in &testcases {
            if !taken.insert(testcase.testcase_id.clone()) {
                return Err(testcase_exists(platform, problem_id, &testcase.testcase_id));
            }
        }

        let now = now();
        let total = testcases.len();
        let (tiered, inline): (Vec<_>, Vec<_>) = testcases
            .into_iter()
            .partition(BlobTieringService::should_tier);

        let puts = inline
            .into_iter()
            .map(|tc| {
                let record = TestCaseRecord::inline(platform, problem_id, tc, now);
                to_item(&record).map(WriteRequest::Put)
            })
            .collect::<Result<Vec<_>>>()?;
        self.store.batch_write(puts).await?;

        for testcase in tiered {
            self.add_testcase(platform, problem_id, testcase).await?;
        }

        Ok(total)
    }

    /// All test cases of a problem with their payloads, sorted by numeric id.
    ///
    /// A tiered case whose blob is missing or malformed is logged and
    /// skipped; the rest of the listing is still returned.
    pub async fn get_testcases(&self, platform: &str, problem_id: &str) -> Result<Vec<TestCase>> {
        let items = self.store.query(&testcases_query(platform, problem_id)?).await?;

        let mut testcases = Vec::with_capacity(items.len());
        for item in &items {
            let stored = match from_item::<TestCaseRecord>(item).and_then(|r| r.storage()) {
                Ok(stored) => stored,
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping unreadable test case");
                    continue;
                }
            };
            match self.load(stored).await {
                Ok(Some(testcase)) => testcases.push(testcase),
                Ok(None) => {}
                Err(RepositoryError::MalformedBlob { key, reason }) => {
                    tracing::warn!(%key, %reason, "Skipping malformed test case blob");
                }
                Err(err) => return Err(err),
            }
        }

        sort_testcases(&mut testcases);
        Ok(testcases)
    }

    /// One test case with its payload. `None` if the case or its blob is
    /// missing.
    pub async fn get_testcase(
        &self,
        platform: &str,
        problem_id: &str,
        testcase_id: &str,
    ) -> Result<Option<TestCase>> {
        let key = TestCaseRecord::item_key(platform, problem_id, testcase_id)?;
        let Some(item) = self.store.get(&key).await? else {
            return Ok(None);
        };
        let stored = from_item::<TestCaseRecord>(&item)?.storage()?;
        self.load(stored).await
    }

    pub async fn count_testcases(&self, platform: &str, problem_id: &str) -> Result<usize> {
        self.store.count(&testcases_query(platform, problem_id)?).await
    }

    /// Writes every test case of the problem to the snapshot blob.
    pub async fn snapshot_testcases(&self, platform: &str, problem_id: &str) -> Result<BlobRef> {
        let testcases = self.get_testcases(platform, problem_id).await?;
        self.tiering
            .store_snapshot(platform, problem_id, &testcases)
            .await
    }

    /// Reads the snapshot blob. `None` if no snapshot was taken.
    pub async fn load_snapshot(
        &self,
        platform: &str,
        problem_id: &str,
    ) -> Result<Option<Vec<TestCase>>> {
        self.tiering.load_snapshot(platform, problem_id).await
    }

    async fn references_blob(&self, key: &ItemKey, blob_key: &str) -> bool {
        match self.store.get(key).await {
            Ok(Some(item)) => tiered_blob_key(&item).as_deref() == Some(blob_key),
            Ok(None) => false,
            // Unknown; keep the blob.
            Err(_) => true,
        }
    }

    async fn load(&self, stored: StoredTestCase) -> Result<Option<TestCase>> {
        match stored {
            StoredTestCase::Inline(testcase) => Ok(Some(testcase)),
            StoredTestCase::Tiered { testcase_id, blob } => {
                let testcase = self.tiering.retrieve_testcase(&blob.key).await?;
                if testcase.is_none() {
                    tracing::warn!(%testcase_id, key = %blob.key, "Test case blob is missing");
                }
                Ok(testcase)
            }
        }
    }
}

fn problem_ref(platform: &str, problem_id: &str) -> String {
    format!("{platform}#{problem_id}")
}

fn testcase_exists(platform: &str, problem_id: &str, testcase_id: &str) -> RepositoryError {
    RepositoryError::AlreadyExists {
        entity_type: "TestCase",
        id: format!("{}#{}", problem_ref(platform, problem_id), testcase_id),
    }
}

fn testcases_query(platform: &str, problem_id: &str) -> Result<Query> {
    Ok(Query::partition(keys::problem_pk(platform, problem_id)?)
        .sort_begins_with(keys::TESTCASE_PREFIX))
}

fn tiered_blob_key(item: &Item) -> Option<String> {
    let record = from_item::<TestCaseRecord>(item).ok()?;
    record.s3_key
}
