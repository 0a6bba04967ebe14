//! Pure construction of the conditional updates behind every job write.
//!
//! Each function returns an [`Update`] whose guard encodes the state machine
//! precondition. Any update that changes the status also rewrites the GSI1
//! projection in the same write.

use serde_json::Value;

use crate::keys;
use crate::schema::JOB_FIELDS;
use crate::storage::{Condition, Index, RepositoryError, Result, Update, ATTR_UPDATED};

use super::types::{Job, JobStatus, ReclaimAction};

/// Error recorded on jobs failed by reclamation.
pub const RECLAIM_ERROR: &str = "Reclaimed after exceeding the processing window";

/// Partial update of a job's fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub worker_token: Option<String>,
    pub params: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub progress: Option<u8>,
    pub superseded_by: Option<String>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_worker_token(mut self, token: impl Into<String>) -> Self {
        self.worker_token = Some(token.into());
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_progress(mut self, percent: u8) -> Self {
        self.progress = Some(percent.min(100));
        self
    }

    pub fn with_superseded_by(mut self, job_id: impl Into<String>) -> Self {
        self.superseded_by = Some(job_id.into());
        self
    }

    /// Applies the changes to an in-memory copy of a job.
    pub fn apply_to(&self, job: &mut Job, now: i64) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(token) = &self.worker_token {
            job.worker_token = Some(token.clone());
        }
        if let Some(params) = &self.params {
            job.params = params.clone();
        }
        if let Some(result) = &self.result {
            job.result = Some(result.clone());
        }
        if let Some(error) = &self.error {
            job.error = Some(error.clone());
        }
        if let Some(progress) = self.progress {
            job.progress = Some(progress);
        }
        if let Some(superseded_by) = &self.superseded_by {
            job.superseded_by = Some(superseded_by.clone());
        }
        job.updated_at = now;
    }
}

/// Builds the write for a generic field update.
///
/// A status change must be a legal transition from the job's current status
/// and is guarded by a compare-and-swap on that status. Updates that leave the
/// status alone only require the job to exist.
pub fn plan_update(job: &Job, changes: &JobUpdate, now: i64) -> Result<Update> {
    let mut update = Update::new();

    match changes.status {
        Some(next) if next != job.status => {
            if !job.status.can_transition_to(next) {
                return Err(invalid_transition(job.status, next));
            }
            update = with_status(update, job, next)?
                .when(Condition::eq(JOB_FIELDS.data_path("status")?, job.status.as_str()));
        }
        _ => update = update.when(Condition::item_exists()),
    }

    if let Some(token) = &changes.worker_token {
        update = update.set(JOB_FIELDS.data_path("worker_token")?, token.as_str());
    }
    if let Some(params) = &changes.params {
        update = update.set(JOB_FIELDS.data_path("params")?, params.clone());
    }
    if let Some(result) = &changes.result {
        update = update.set(JOB_FIELDS.data_path("result")?, result.clone());
    }
    if let Some(error) = &changes.error {
        update = update.set(JOB_FIELDS.data_path("error")?, error.as_str());
    }
    if let Some(progress) = changes.progress {
        update = update.set(JOB_FIELDS.data_path("progress")?, progress);
    }
    if let Some(superseded_by) = &changes.superseded_by {
        update = update.set(JOB_FIELDS.data_path("superseded_by")?, superseded_by.as_str());
    }

    Ok(update.set(ATTR_UPDATED, now))
}

/// Builds the compare-and-swap that moves a job from `expected` to
/// `PROCESSING` and records the claiming worker.
pub fn plan_claim(job: &Job, worker_token: &str, expected: JobStatus, now: i64) -> Result<Update> {
    if expected.is_finished() {
        return Err(invalid_transition(expected, JobStatus::Processing));
    }

    Ok(with_status(Update::new(), job, JobStatus::Processing)?
        .set(JOB_FIELDS.data_path("worker_token")?, worker_token)
        .set(ATTR_UPDATED, now)
        .when(Condition::eq(JOB_FIELDS.data_path("status")?, expected.as_str())))
}

/// Builds the write that resets or fails a job stuck in `PROCESSING`.
///
/// Guarded on the job still being in `PROCESSING` with `upd` older than
/// `cutoff`, so a worker that reported in meanwhile keeps its job.
pub fn plan_reclaim(job: &Job, cutoff: i64, action: ReclaimAction, now: i64) -> Result<Update> {
    let target = action.target_status();
    let mut update = with_status(Update::new(), job, target)?
        .remove(JOB_FIELDS.data_path("worker_token")?)
        .set(ATTR_UPDATED, now)
        .when(
            Condition::eq(
                JOB_FIELDS.data_path("status")?,
                JobStatus::Processing.as_str(),
            )
            .and(Condition::lt(ATTR_UPDATED, cutoff)),
        );

    if action == ReclaimAction::Fail {
        update = update.set(JOB_FIELDS.data_path("error")?, RECLAIM_ERROR);
    }

    Ok(update)
}

/// Builds the touch written alongside a progress note: refreshes `upd`, and
/// the job's progress when a percentage is given.
///
/// A job that keeps reporting progress therefore never looks stale.
pub fn plan_progress(percent: Option<u8>, now: i64) -> Result<Update> {
    let mut update = Update::new().when(Condition::item_exists());
    if let Some(percent) = percent {
        update = update.set(JOB_FIELDS.data_path("progress")?, percent.min(100));
    }
    Ok(update.set(ATTR_UPDATED, now))
}

fn with_status(update: Update, job: &Job, status: JobStatus) -> Result<Update> {
    Ok(update
        .set(JOB_FIELDS.data_path("status")?, status.as_str())
        .set(
            Index::Gsi1.partition_attr(),
            keys::job_gsi1_pk(job.kind, status),
        )
        .set(
            Index::Gsi1.sort_attr(),
            keys::job_gsi1_sk(job.created_at, &job.id),
        ))
}

fn invalid_transition(from: JobStatus, to: JobStatus) -> RepositoryError {
    RepositoryError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}
