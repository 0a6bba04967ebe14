//! DynamoDB single-table persistence with S3 blob tiering.
//!
//! The pure parts (key layout, expressions, state machine rules, blob
//! encoding) live in `probstore_core`. This crate performs the I/O: the
//! DynamoDB and in-memory item stores, the S3 and in-memory blob stores, and
//! the repositories built on top of them.

pub mod blob;
pub mod config;
pub mod repositories;
pub mod retry;
pub mod storage;
pub mod tiering;

pub use config::Config;
