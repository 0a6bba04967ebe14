use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use probstore_core::storage::{BlobStore, RepositoryError, Result};

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    content_encoding: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    objects: HashMap<String, StoredObject>,
    /// Remaining injected failures and whether they are transient.
    faults: Option<(usize, bool)>,
}

impl Inner {
    fn take_fault(&mut self, operation: &str, key: &str) -> Result<()> {
        let Some((remaining, transient)) = self.faults else {
            return Ok(());
        };
        self.faults = (remaining > 1).then_some((remaining - 1, transient));

        let message = format!("Injected {} failure for '{}'", operation, key);
        if transient {
            Err(RepositoryError::Transient(message))
        } else {
            Err(RepositoryError::QueryFailed(message))
        }
    }
}

/// In-memory blob store for testing.
///
/// Failures can be injected with [`InMemoryBlobStore::fail_next`] to exercise
/// retry and best-effort cleanup paths.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlobStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` operations fail, transiently or not.
    pub async fn fail_next(&self, count: usize, transient: bool) {
        let mut inner = self.inner.write().await;
        inner.faults = (count > 0).then_some((count, transient));
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.read().await.objects.contains_key(key)
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut keys: Vec<_> = inner.objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn content_encoding(&self, key: &str) -> Option<String> {
        let inner = self.inner.read().await;
        inner.objects.get(key)?.content_encoding.clone()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_encoding: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.take_fault("PutObject", key)?;
        inner.objects.insert(
            key.to_string(),
            StoredObject {
                body,
                content_encoding: content_encoding.map(str::to_string),
            },
        );
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.write().await;
        inner.take_fault("GetObject", key)?;
        Ok(inner.objects.get(key).map(|object| object.body.clone()))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.take_fault("DeleteObject", key)?;
        inner.objects.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryBlobStore::new();
        store
            .put_object("testcases/p/1/1.json.gz", vec![1, 2, 3], Some("gzip"))
            .await
            .unwrap();

        assert!(store.contains("testcases/p/1/1.json.gz").await);
        assert_eq!(
            store.content_encoding("testcases/p/1/1.json.gz").await.as_deref(),
            Some("gzip")
        );
        assert_eq!(
            store.get_object("testcases/p/1/1.json.gz").await.unwrap(),
            Some(vec![1, 2, 3])
        );

        store.delete_object("testcases/p/1/1.json.gz").await.unwrap();
        assert_eq!(store.get_object("testcases/p/1/1.json.gz").await.unwrap(), None);
        // Deleting again is fine.
        store.delete_object("testcases/p/1/1.json.gz").await.unwrap();
    }

    #[tokio::test]
    async fn test_injected_faults_are_consumed() {
        let store = InMemoryBlobStore::new();
        store.fail_next(2, true).await;

        let first = store.put_object("k", vec![], None).await;
        assert!(matches!(first, Err(RepositoryError::Transient(_))));
        let second = store.get_object("k").await;
        assert!(matches!(second, Err(RepositoryError::Transient(_))));

        store.put_object("k", vec![9], None).await.unwrap();
        assert_eq!(store.keys().await, vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn test_permanent_fault() {
        let store = InMemoryBlobStore::new();
        store.fail_next(1, false).await;
        let result = store.delete_object("k").await;
        assert!(matches!(result, Err(RepositoryError::QueryFailed(_))));
    }
}
