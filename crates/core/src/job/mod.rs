//! Job model and state machine.

mod types;
mod updates;

pub use types::{ClaimResult, Job, JobKind, JobProgress, JobStatus, ReclaimAction};
pub use updates::{plan_claim, plan_progress, plan_reclaim, plan_update, JobUpdate, RECLAIM_ERROR};
