//! Entity repositories over a shared [`ItemStore`](probstore_core::storage::ItemStore).
//!
//! Each repository is cheap to clone and holds the store behind an `Arc`, so
//! any number of them can share one table.

mod counters;
mod jobs;
mod problems;
mod usage;
mod users;

pub use counters::CounterService;
pub use jobs::JobRepository;
pub use problems::ProblemRepository;
pub use usage::UsageRepository;
pub use users::UserRepository;

/// Current time in Unix seconds.
pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
