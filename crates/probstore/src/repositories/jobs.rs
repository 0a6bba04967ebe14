use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use probstore_core::job::{
    plan_claim, plan_progress, plan_reclaim, plan_update, ClaimResult, Job, JobKind, JobProgress,
    JobStatus, JobUpdate, ReclaimAction,
};
use probstore_core::keys;
use probstore_core::storage::{
    from_item, to_item, Condition, Entity, Index, ItemKey, ItemStore, Query, RepositoryError,
    Result, WriteOutcome, WriteRequest, ATTR_UPDATED,
};

use super::now;

/// Compare-and-swap attempts for a field update before giving up.
const MAX_UPDATE_ATTEMPTS: usize = 3;

/// Attempts at finding a free sort key for a progress note.
const MAX_PROGRESS_ATTEMPTS: usize = 3;

/// Jobs of one kind and their progress notes.
///
/// Every status change is a conditional write on the current status, which is
/// also what lets exactly one worker claim a pending job.
#[derive(Clone)]
pub struct JobRepository {
    store: Arc<dyn ItemStore>,
    kind: JobKind,
}

impl JobRepository {
    pub fn new(store: Arc<dyn ItemStore>, kind: JobKind) -> Self {
        Self { store, kind }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Creates a pending job with a fresh id.
    pub async fn create_job(&self, params: Value) -> Result<Job> {
        let job = Job::new(self.kind, params, now());
        self.create(&job).await?;
        Ok(job)
    }

    /// Writes a prepared job. Fails with `AlreadyExists` if the id is taken.
    pub async fn create(&self, job: &Job) -> Result<()> {
        if job.kind != self.kind {
            return Err(RepositoryError::InvalidData(format!(
                "Cannot store a {} job in the {} repository",
                job.kind, self.kind
            )));
        }

        match self
            .store
            .put(to_item(job)?, Some(Condition::item_not_exists()))
            .await?
        {
            WriteOutcome::Applied(()) => {
                tracing::debug!(kind = %self.kind, job_id = %job.id, "Created job");
                Ok(())
            }
            WriteOutcome::ConditionFailed => Err(RepositoryError::AlreadyExists {
                entity_type: "Job",
                id: job.id.clone(),
            }),
        }
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        let item = self.store.get(&Job::item_key(self.kind, job_id)).await?;
        item.as_ref().map(from_item::<Job>).transpose()
    }

    /// Attempts to take ownership of a job in `expected` status.
    ///
    /// Only a [`ClaimResult::Claimed`] caller may do the job's work. Losing
    /// the race is an ordinary outcome, not an error.
    pub async fn claim(
        &self,
        job_id: &str,
        worker_token: &str,
        expected: JobStatus,
    ) -> Result<ClaimResult> {
        // The read supplies the creation time the index sort key is built from.
        let Some(job) = self.get_job(job_id).await? else {
            return Ok(ClaimResult::NotFound);
        };
        let update = plan_claim(&job, worker_token, expected, now())?;

        if job.status != expected {
            tracing::debug!(job_id, status = %job.status, %expected, "Job not claimable");
            return Ok(ClaimResult::AlreadyClaimed);
        }

        match self.store.update(&job.key()?, &update).await? {
            WriteOutcome::Applied(item) => {
                let claimed: Job = from_item(&item)?;
                tracing::info!(kind = %self.kind, job_id, worker = worker_token, "Claimed job");
                Ok(ClaimResult::Claimed(claimed))
            }
            WriteOutcome::ConditionFailed => {
                // A retried write can fail its guard on our own first attempt.
                if let Some(current) = self.get_job(job_id).await? {
                    if current.status == JobStatus::Processing
                        && current.worker_token.as_deref() == Some(worker_token)
                    {
                        tracing::info!(
                            kind = %self.kind,
                            job_id,
                            worker = worker_token,
                            "Claimed job on retried write"
                        );
                        return Ok(ClaimResult::Claimed(current));
                    }
                }
                tracing::debug!(job_id, worker = worker_token, "Lost claim race");
                Ok(ClaimResult::AlreadyClaimed)
            }
        }
    }

    /// Applies a field update and returns the job as stored.
    ///
    /// A status change must be legal from the job's current status. If another
    /// writer moves the job between the read and the write, the update is
    /// re-planned against the new state.
    pub async fn update(&self, job_id: &str, changes: &JobUpdate) -> Result<Job> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let job = self.require(job_id).await?;
            let update = plan_update(&job, changes, now())?;

            match self.store.update(&job.key()?, &update).await? {
                WriteOutcome::Applied(item) => {
                    let updated: Job = from_item(&item)?;
                    if updated.status != job.status {
                        tracing::info!(
                            kind = %self.kind,
                            job_id,
                            from = %job.status,
                            to = %updated.status,
                            "Job status changed"
                        );
                    }
                    return Ok(updated);
                }
                WriteOutcome::ConditionFailed => {
                    tracing::debug!(job_id, "Job changed during update, retrying");
                }
            }
        }

        Err(RepositoryError::QueryFailed(format!(
            "Job {} kept changing during update",
            job_id
        )))
    }

    /// Jobs in a status, newest first.
    pub async fn list_by_status(
        &self,
        status: JobStatus,
        limit: Option<usize>,
    ) -> Result<Vec<Job>> {
        let query = Query::partition(keys::job_gsi1_pk(self.kind, status))
            .on_index(Index::Gsi1)
            .descending()
            .limit(limit);
        self.decode_all(&query).await
    }

    /// `PROCESSING` jobs not updated since `cutoff` (Unix seconds), oldest
    /// first. Candidates for [`JobRepository::reclaim`].
    pub async fn find_stale(&self, cutoff: i64, limit: Option<usize>) -> Result<Vec<Job>> {
        let query = Query::partition(keys::job_gsi1_pk(self.kind, JobStatus::Processing))
            .on_index(Index::Gsi1)
            .filter(Condition::lt(ATTR_UPDATED, cutoff))
            .limit(limit);
        self.decode_all(&query).await
    }

    /// Resets or fails a job stuck in `PROCESSING` since before `cutoff`.
    ///
    /// Returns `None` if the job is gone, no longer processing, or reported
    /// in after `cutoff`.
    pub async fn reclaim(
        &self,
        job_id: &str,
        cutoff: i64,
        action: ReclaimAction,
    ) -> Result<Option<Job>> {
        let Some(job) = self.get_job(job_id).await? else {
            return Ok(None);
        };
        let update = plan_reclaim(&job, cutoff, action, now())?;

        match self.store.update(&job.key()?, &update).await? {
            WriteOutcome::Applied(item) => {
                let reclaimed: Job = from_item(&item)?;
                tracing::info!(
                    kind = %self.kind,
                    job_id,
                    worker = job.worker_token.as_deref().unwrap_or_default(),
                    status = %reclaimed.status,
                    "Reclaimed stale job"
                );
                Ok(Some(reclaimed))
            }
            WriteOutcome::ConditionFailed => {
                tracing::debug!(job_id, "Job is not stale, leaving it");
                Ok(None)
            }
        }
    }

    /// Finds and reclaims stale jobs in one pass. Returns the jobs reclaimed.
    pub async fn reclaim_stale(
        &self,
        cutoff: i64,
        action: ReclaimAction,
        limit: Option<usize>,
    ) -> Result<Vec<Job>> {
        let mut reclaimed = Vec::new();
        for job in self.find_stale(cutoff, limit).await? {
            if let Some(job) = self.reclaim(&job.id, cutoff, action).await? {
                reclaimed.push(job);
            }
        }
        Ok(reclaimed)
    }

    /// Cancels a job, optionally recording the retry that supersedes it.
    pub async fn cancel(&self, job_id: &str, superseded_by: Option<&str>) -> Result<Job> {
        let mut changes = JobUpdate::new().with_status(JobStatus::Cancelled);
        if let Some(retry_id) = superseded_by {
            changes = changes.with_superseded_by(retry_id);
        }
        self.update(job_id, &changes).await
    }

    /// Creates a fresh pending job with the same parameters and cancels the
    /// original in its favour. Returns the new job.
    pub async fn retry_job(&self, job_id: &str) -> Result<Job> {
        let original = self.require(job_id).await?;
        if !original.status.can_transition_to(JobStatus::Cancelled) {
            return Err(RepositoryError::InvalidTransition {
                from: original.status.to_string(),
                to: JobStatus::Cancelled.to_string(),
            });
        }
        let retry = Job::new(self.kind, original.params.clone(), now()).retrying(&original.id);
        self.create(&retry).await?;
        self.cancel(&original.id, Some(&retry.id)).await?;
        Ok(retry)
    }

    /// Records a progress note and refreshes the job's `upd`.
    pub async fn append_progress(
        &self,
        job_id: &str,
        message: &str,
        percent: Option<u8>,
    ) -> Result<JobProgress> {
        let key = Job::item_key(self.kind, job_id);
        let now = now();
        if let WriteOutcome::ConditionFailed = self
            .store
            .update(&key, &plan_progress(percent, now)?)
            .await?
        {
            return Err(not_found(job_id));
        }

        let mut progress = JobProgress {
            kind: self.kind,
            job_id: job_id.to_string(),
            message: message.to_string(),
            percent: percent.map(|p| p.min(100)),
            recorded_at_us: Utc::now().timestamp_micros(),
            created_at: now,
            updated_at: now,
        };

        for _ in 0..MAX_PROGRESS_ATTEMPTS {
            match self
                .store
                .put(to_item(&progress)?, Some(Condition::item_not_exists()))
                .await?
            {
                WriteOutcome::Applied(()) => return Ok(progress),
                WriteOutcome::ConditionFailed => progress.recorded_at_us += 1,
            }
        }

        Err(RepositoryError::AlreadyExists {
            entity_type: "JobProgress",
            id: progress.key()?.to_string(),
        })
    }

    /// Progress notes of a job, oldest first.
    pub async fn list_progress(
        &self,
        job_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<JobProgress>> {
        let items = self
            .store
            .query(&progress_query(self.kind, job_id).limit(limit))
            .await?;
        items.iter().map(from_item::<JobProgress>).collect()
    }

    /// Deletes a job and its progress notes. Returns true if the job existed.
    pub async fn delete_job(&self, job_id: &str) -> Result<bool> {
        let progress = self.store.query(&progress_query(self.kind, job_id)).await?;
        let deletes: Vec<_> = progress
            .iter()
            .filter_map(ItemKey::from_item)
            .map(WriteRequest::Delete)
            .collect();
        self.store.batch_write(deletes).await?;

        let existed = self.store.delete(&Job::item_key(self.kind, job_id)).await?;
        tracing::debug!(kind = %self.kind, job_id, existed, "Deleted job");
        Ok(existed)
    }

    async fn require(&self, job_id: &str) -> Result<Job> {
        self.get_job(job_id)
            .await?
            .ok_or_else(|| not_found(job_id))
    }

    async fn decode_all(&self, query: &Query) -> Result<Vec<Job>> {
        let items = self.store.query(query).await?;
        items.iter().map(from_item::<Job>).collect()
    }
}

fn progress_query(kind: JobKind, job_id: &str) -> Query {
    Query::partition(keys::progress_pk(kind, job_id)).sort_begins_with(keys::PROGRESS_PREFIX)
}

fn not_found(job_id: &str) -> RepositoryError {
    RepositoryError::NotFound {
        entity_type: "Job",
        id: job_id.to_string(),
    }
}
