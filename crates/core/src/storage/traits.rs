use async_trait::async_trait;

use super::expression::{Condition, Query, Update};
use super::types::{Item, ItemKey, WriteOutcome, WriteRequest};
use super::Result;

/// Generic item operations over the single table.
///
/// Every entity repository is written against this trait. Absent items are
/// `Ok(None)`, lost conditions are [`WriteOutcome::ConditionFailed`]; only
/// infrastructure failures are `Err`.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Gets an item by its primary key.
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>>;

    /// Writes a whole item, optionally guarded by a condition.
    async fn put(&self, item: Item, condition: Option<Condition>) -> Result<WriteOutcome<()>>;

    /// Runs a key-condition query, following pagination until `limit`
    /// post-filter items are collected or the partition is exhausted.
    async fn query(&self, query: &Query) -> Result<Vec<Item>>;

    /// Counts matching items without transferring them.
    async fn count(&self, query: &Query) -> Result<usize>;

    /// Reads the whole table. Only for small tables and maintenance tasks.
    async fn scan(&self, filter: Option<&Condition>, limit: Option<usize>) -> Result<Vec<Item>>;

    /// Applies an update and returns the item as it is after the write.
    ///
    /// Without a condition the update upserts, like the store does.
    async fn update(&self, key: &ItemKey, update: &Update) -> Result<WriteOutcome<Item>>;

    /// Deletes an item. Returns true if an item was removed.
    async fn delete(&self, key: &ItemKey) -> Result<bool>;

    /// Writes puts and deletes in chunks of at most
    /// [`MAX_BATCH_WRITE`](super::MAX_BATCH_WRITE). Not atomic.
    async fn batch_write(&self, requests: Vec<WriteRequest>) -> Result<()>;
}

/// Object storage for payloads too large to keep inline.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes an object, replacing any previous content.
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_encoding: Option<&str>,
    ) -> Result<()>;

    /// Reads an object. A missing key is `Ok(None)`.
    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Deletes an object. Deleting a missing key succeeds.
    async fn delete_object(&self, key: &str) -> Result<()>;
}
