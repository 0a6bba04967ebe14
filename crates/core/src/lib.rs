//! Functional core of the probstore persistence layer.
//!
//! Pure types and functions only: entity models, key generation, the short-key
//! schema, item envelopes, typed expressions, the job state machine and the
//! tiering rules. All I/O lives in the `probstore` crate behind the
//! [`storage::ItemStore`] and [`storage::BlobStore`] traits.

pub mod counter;
pub mod job;
pub mod keys;
pub mod problem;
pub mod schema;
pub mod storage;
pub mod tiering;
pub mod usage;
pub mod user;
