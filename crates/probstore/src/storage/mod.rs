//! Item store backends.
//!
//! Concrete implementations of [`ItemStore`](probstore_core::storage::ItemStore):
//!
//! - `dynamodb`: the production single-table backend on `aws-sdk-dynamodb`
//! - `inmemory`: an ordered map with the same conditional-write semantics,
//!   used by tests and local runs
//!
//! Both backends are always compiled; the binary picks one from
//! configuration.

pub mod dynamodb;
pub mod inmemory;
pub mod marshal;

pub use dynamodb::DynamoDbStore;
pub use inmemory::InMemoryStore;
