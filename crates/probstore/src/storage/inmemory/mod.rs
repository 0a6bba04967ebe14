//! In-memory storage backend for testing.
//!
//! Implements [`ItemStore`](probstore_core::storage::ItemStore) over an
//! ordered map wrapped in `Arc<RwLock<_>>`, with GSI queries emulated by
//! filtering on the index attributes. Items are normalized through the same
//! marshaller the DynamoDB backend uses.
//!
//! # Example
//!
//! ```rust,ignore
//! use probstore::storage::inmemory::InMemoryStore;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let problems = ProblemRepository::new(store, blobs);
//! ```

mod repository;

pub use repository::InMemoryStore;
