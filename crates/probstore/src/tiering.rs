//! Blob tiering service.
//!
//! Moves large test case payloads to the blob store as compressed envelopes
//! and reads them back. Encoding rules and key naming live in
//! `probstore_core::tiering`; this module owns the I/O and the retry.

use std::sync::Arc;

use chrono::Utc;

use probstore_core::problem::{BlobRef, TestCase};
use probstore_core::storage::{BlobStore, Result};
use probstore_core::tiering::{self, BlobEnvelope, BlobKind, EncodedBlob, CONTENT_ENCODING};

use crate::retry::retry_transient;

/// Stores and retrieves tiered payloads.
#[derive(Clone)]
pub struct BlobTieringService {
    blobs: Arc<dyn BlobStore>,
}

impl std::fmt::Debug for BlobTieringService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobTieringService").finish_non_exhaustive()
    }
}

impl BlobTieringService {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// True if the test case is too large to keep inline.
    pub fn should_tier(testcase: &TestCase) -> bool {
        tiering::should_tier(&testcase.input, &testcase.output)
    }

    /// Writes one test case to its blob key and returns the reference to keep
    /// in the table.
    pub async fn store_testcase(
        &self,
        platform: &str,
        problem_id: &str,
        testcase: &TestCase,
    ) -> Result<BlobRef> {
        let key = tiering::testcase_blob_key(platform, problem_id, &testcase.testcase_id)?;
        let envelope = BlobEnvelope::new(BlobKind::Testcase, testcase, Utc::now().timestamp());
        let encoded = tiering::encode(&envelope)?;
        self.put(&key, &encoded).await?;
        Ok(encoded.blob_ref(key))
    }

    /// Reads a single test case blob. A missing key is `Ok(None)`.
    pub async fn retrieve_testcase(&self, key: &str) -> Result<Option<TestCase>> {
        let Some(body) = self.get(key).await? else {
            return Ok(None);
        };
        let envelope = tiering::decode::<TestCase>(key, BlobKind::Testcase, &body)?;
        Ok(Some(envelope.payload))
    }

    /// Writes the whole set of a problem's test cases to its snapshot key.
    pub async fn store_snapshot(
        &self,
        platform: &str,
        problem_id: &str,
        testcases: &[TestCase],
    ) -> Result<BlobRef> {
        let key = tiering::snapshot_blob_key(platform, problem_id)?;
        let envelope =
            BlobEnvelope::new(BlobKind::TestcaseSnapshot, testcases, Utc::now().timestamp());
        let encoded = tiering::encode(&envelope)?;
        self.put(&key, &encoded).await?;

        tracing::debug!(
            key = %key,
            testcases = testcases.len(),
            size = encoded.size,
            compressed = encoded.body.len(),
            "Stored test case snapshot"
        );
        Ok(encoded.blob_ref(key))
    }

    /// Reads a problem's snapshot. A missing snapshot is `Ok(None)`.
    pub async fn load_snapshot(
        &self,
        platform: &str,
        problem_id: &str,
    ) -> Result<Option<Vec<TestCase>>> {
        let key = tiering::snapshot_blob_key(platform, problem_id)?;
        let Some(body) = self.get(&key).await? else {
            return Ok(None);
        };
        let envelope = tiering::decode::<Vec<TestCase>>(&key, BlobKind::TestcaseSnapshot, &body)?;
        Ok(Some(envelope.payload))
    }

    /// Deletes a blob, best-effort.
    ///
    /// Failures are logged and reported as `false`; they never block removal
    /// of the owning table item.
    pub async fn delete(&self, key: &str) -> bool {
        let blobs = &self.blobs;
        match retry_transient("DeleteObject", move || async move {
            blobs.delete_object(key).await
        })
        .await
        {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(key, error = %err, "Failed to delete blob");
                false
            }
        }
    }

    async fn put(&self, key: &str, encoded: &EncodedBlob) -> Result<()> {
        let blobs = &self.blobs;
        retry_transient("PutObject", move || async move {
            blobs
                .put_object(key, encoded.body.clone(), Some(CONTENT_ENCODING))
                .await
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let blobs = &self.blobs;
        retry_transient("GetObject", move || async move { blobs.get_object(key).await }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::InMemoryBlobStore;
    use probstore_core::storage::RepositoryError;
    use probstore_core::tiering::TIER_THRESHOLD_BYTES;

    fn service() -> (BlobTieringService, InMemoryBlobStore) {
        let blobs = InMemoryBlobStore::new();
        (BlobTieringService::new(Arc::new(blobs.clone())), blobs)
    }

    #[tokio::test]
    async fn test_store_and_retrieve_large_testcase() {
        let (service, blobs) = service();
        let testcase = TestCase::new("1", "x".repeat(TIER_THRESHOLD_BYTES), "y");
        assert!(BlobTieringService::should_tier(&testcase));

        let blob = service
            .store_testcase("baekjoon", "1000", &testcase)
            .await
            .unwrap();
        assert_eq!(blob.key, "testcases/baekjoon/1000/tc_1.json.gz");
        assert!(blob.compressed_size < blob.size);
        assert_eq!(
            blobs.content_encoding(&blob.key).await.as_deref(),
            Some("gzip")
        );

        let restored = service.retrieve_testcase(&blob.key).await.unwrap();
        assert_eq!(restored, Some(testcase));
    }

    #[tokio::test]
    async fn test_retrieve_missing_is_none() {
        let (service, _) = service();
        let result = service
            .retrieve_testcase("testcases/baekjoon/1000/tc_9.json.gz")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_malformed_blob_is_reported() {
        let (service, blobs) = service();
        blobs
            .put_object("testcases/p/1/tc_1.json.gz", b"not gzip".to_vec(), None)
            .await
            .unwrap();

        let result = service.retrieve_testcase("testcases/p/1/tc_1.json.gz").await;
        assert!(matches!(result, Err(RepositoryError::MalformedBlob { .. })));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let (service, _) = service();
        let testcases = vec![TestCase::new("1", "1 2", "3"), TestCase::new("2", "5 7", "12")];

        let blob = service
            .store_snapshot("baekjoon", "1000", &testcases)
            .await
            .unwrap();
        assert_eq!(blob.key, "testcases/baekjoon/1000/testcases.json.gz");

        let loaded = service.load_snapshot("baekjoon", "1000").await.unwrap();
        assert_eq!(loaded, Some(testcases));
        assert!(service.load_snapshot("baekjoon", "1001").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_single_transient_failure_is_retried() {
        let (service, blobs) = service();
        let testcase = TestCase::new("1", "a", "b");
        let blob = service.store_testcase("p", "1", &testcase).await.unwrap();

        blobs.fail_next(1, true).await;
        assert_eq!(
            service.retrieve_testcase(&blob.key).await.unwrap(),
            Some(testcase)
        );
    }

    #[tokio::test]
    async fn test_second_transient_failure_surfaces() {
        let (service, blobs) = service();
        blobs.fail_next(2, true).await;
        let result = service
            .store_testcase("p", "1", &TestCase::new("1", "a", "b"))
            .await;
        assert!(matches!(result, Err(RepositoryError::Transient(_))));
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let (service, blobs) = service();
        blobs.fail_next(1, false).await;
        let result = service.retrieve_testcase("k").await;
        assert!(matches!(result, Err(RepositoryError::QueryFailed(_))));
        // The injected fault was consumed by the single attempt.
        assert!(service.retrieve_testcase("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_best_effort() {
        let (service, blobs) = service();
        let blob = service
            .store_testcase("p", "1", &TestCase::new("1", "a", "b"))
            .await
            .unwrap();

        blobs.fail_next(1, false).await;
        assert!(!service.delete(&blob.key).await);
        assert!(blobs.contains(&blob.key).await);

        assert!(service.delete(&blob.key).await);
        assert!(!blobs.contains(&blob.key).await);
    }
}
