//! Blob store backends for tiered payloads.
//!
//! - `s3`: objects in the configured bucket via `aws-sdk-s3`
//! - `memory`: a map of objects with fault injection, used by tests
//!
//! Neither backend retries; callers wrap operations in
//! [`retry_transient`](crate::retry::retry_transient).

mod memory;
mod s3;

pub use memory::InMemoryBlobStore;
pub use s3::S3BlobStore;
