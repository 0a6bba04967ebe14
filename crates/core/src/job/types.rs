use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::keys;
use crate::schema::{FieldMap, JOB_FIELDS, PROGRESS_FIELDS};
use crate::storage::{self, Entity, Index, ItemKey, RepositoryError};

/// The two job families sharing one repository implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Extraction,
    Generation,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::Extraction, JobKind::Generation];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Extraction => "extraction",
            JobKind::Generation => "generation",
        }
    }

    /// Upper-case label used in partition and index keys.
    pub fn key_label(&self) -> &'static str {
        match self {
            JobKind::Extraction => "EXTRACTION",
            JobKind::Generation => "GENERATION",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "extraction" => Ok(JobKind::Extraction),
            "generation" => Ok(JobKind::Generation),
            other => Err(RepositoryError::invalid_data(format!(
                "Unknown job kind: {}",
                other
            ))),
        }
    }
}

/// Lifecycle state of a job.
///
/// `PENDING -> PROCESSING -> {COMPLETED, FAILED}`, and `CANCELLED` from any
/// other state when a job is superseded by a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    /// Returns true if the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
                | (Completed, Cancelled)
                | (Failed, Cancelled)
        )
    }

    /// Returns true if no worker will touch the job again.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| RepositoryError::invalid_data(format!("Unknown job status: {}", s)))
    }
}

/// A unit of background work tracked in the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_token: Option<String>,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Completion percentage reported by the worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Id of the job this one retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<String>,
    /// Id of the retry that cancelled this job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Job {
    /// Creates a pending job with a fresh id.
    pub fn new(kind: JobKind, params: Value, now: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            status: JobStatus::Pending,
            worker_token: None,
            params,
            result: None,
            error: None,
            progress: None,
            retry_of: None,
            superseded_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets a specific ID for this job (useful for testing).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Marks this job as a retry of another.
    pub fn retrying(mut self, job_id: impl Into<String>) -> Self {
        self.retry_of = Some(job_id.into());
        self
    }

    pub fn item_key(kind: JobKind, job_id: &str) -> ItemKey {
        ItemKey::new(keys::job_pk(kind, job_id), keys::META_SK)
    }
}

impl Entity for Job {
    const ENTITY_TYPE: &'static str = "job";

    fn fields() -> &'static FieldMap {
        &JOB_FIELDS
    }

    fn key(&self) -> storage::Result<ItemKey> {
        Ok(Job::item_key(self.kind, &self.id))
    }

    fn index_keys(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                Index::Gsi1.partition_attr(),
                keys::job_gsi1_pk(self.kind, self.status),
            ),
            (
                Index::Gsi1.sort_attr(),
                keys::job_gsi1_sk(self.created_at, &self.id),
            ),
        ]
    }
}

/// An append-only progress note written by the worker holding a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub kind: JobKind,
    pub job_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
    /// Microsecond timestamp, also the sort key.
    pub recorded_at_us: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Entity for JobProgress {
    const ENTITY_TYPE: &'static str = "job_progress";

    fn fields() -> &'static FieldMap {
        &PROGRESS_FIELDS
    }

    fn key(&self) -> storage::Result<ItemKey> {
        Ok(ItemKey::new(
            keys::progress_pk(self.kind, &self.job_id),
            keys::progress_sk(self.recorded_at_us),
        ))
    }
}

/// Outcome of a claim attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimResult {
    /// This caller owns the job and must process it.
    Claimed(Job),
    /// The job was not in the expected status; another worker has it.
    AlreadyClaimed,
    NotFound,
}

impl ClaimResult {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimResult::Claimed(_))
    }
}

/// What to do with a job stuck in `PROCESSING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReclaimAction {
    /// Put the job back in the queue.
    Reset,
    /// Give up on the job.
    Fail,
}

impl ReclaimAction {
    pub fn target_status(&self) -> JobStatus {
        match self {
            ReclaimAction::Reset => JobStatus::Pending,
            ReclaimAction::Fail => JobStatus::Failed,
        }
    }
}

impl FromStr for ReclaimAction {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reset" => Ok(ReclaimAction::Reset),
            "fail" => Ok(ReclaimAction::Fail),
            other => Err(RepositoryError::invalid_data(format!(
                "Unknown reclaim action: {}",
                other
            ))),
        }
    }
}
