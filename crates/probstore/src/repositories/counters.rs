use std::sync::Arc;

use probstore_core::counter::{self, counter_filter, next_value_update, Counter};
use probstore_core::storage::{ItemStore, RepositoryError, Result, WriteOutcome};

use super::now;

/// Named monotonic counters.
///
/// Low-frequency id issuing only; rate limiting uses usage logs instead.
#[derive(Clone)]
pub struct CounterService {
    store: Arc<dyn ItemStore>,
}

impl CounterService {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }

    /// Returns the next value of a counter, starting at 1.
    ///
    /// One conditional upsert both creates a missing counter and increments
    /// an existing one, so concurrent callers always receive distinct values.
    pub async fn next_id(&self, name: &str) -> Result<i64> {
        let key = Counter::item_key(name);
        match self.store.update(&key, &next_value_update(now())).await? {
            WriteOutcome::Applied(item) => {
                let value = counter::value_of(&item)?;
                tracing::debug!(counter = name, value, "Issued counter value");
                Ok(value)
            }
            // The key is taken by an item that is not a counter.
            WriteOutcome::ConditionFailed => Err(RepositoryError::InvalidData(format!(
                "Item {} is not a counter",
                key
            ))),
        }
    }

    /// Current value without side effects. `None` if never issued.
    pub async fn current_value(&self, name: &str) -> Result<Option<i64>> {
        match self.store.get(&Counter::item_key(name)).await? {
            Some(item) => Ok(Some(counter::value_of(&item)?)),
            None => Ok(None),
        }
    }

    /// Overwrites a counter's value.
    ///
    /// Migration use only: races with concurrent `next_id` calls.
    pub async fn set_value(&self, name: &str, value: i64) -> Result<()> {
        let counter = Counter {
            name: name.to_string(),
            value,
        };
        self.store.put(counter.to_item(now()), None).await?;
        tracing::info!(counter = name, value, "Counter value set");
        Ok(())
    }

    /// Every counter in the table. Scans, so maintenance only.
    pub async fn list_counters(&self) -> Result<Vec<Counter>> {
        let items = self.store.scan(Some(&counter_filter()), None).await?;
        let mut counters = items
            .iter()
            .map(Counter::from_item)
            .collect::<Result<Vec<_>>>()?;
        counters.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn service() -> (CounterService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (CounterService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_next_id_starts_at_one() {
        let (counters, _) = service();
        assert_eq!(counters.current_value("user").await.unwrap(), None);
        assert_eq!(counters.next_id("user").await.unwrap(), 1);
        assert_eq!(counters.next_id("user").await.unwrap(), 2);
        assert_eq!(counters.current_value("user").await.unwrap(), Some(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_next_id_has_no_gaps_or_duplicates() {
        let (counters, _) = service();
        let calls = 50;

        let handles: Vec<_> = (0..calls)
            .map(|_| {
                let counters = counters.clone();
                tokio::spawn(async move { counters.next_id("problem").await.unwrap() })
            })
            .collect();

        let mut values = BTreeSet::new();
        for handle in handles {
            assert!(values.insert(handle.await.unwrap()));
        }
        assert_eq!(values, (1..=calls).collect::<BTreeSet<i64>>());
    }

    #[tokio::test]
    async fn test_set_value_then_continue() {
        let (counters, _) = service();
        counters.set_value("user", 1000).await.unwrap();
        assert_eq!(counters.next_id("user").await.unwrap(), 1001);
    }

    #[tokio::test]
    async fn test_counter_record_shape() {
        let (counters, store) = service();
        counters.next_id("user").await.unwrap();
        let item = store
            .get(&Counter::item_key("user"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item["PK"], json!("COUNTER#user"));
        assert_eq!(item["SK"], json!("VALUE"));
        assert_eq!(item["tp"], json!("counter"));
        assert_eq!(item["val"], json!(1));
    }

    #[tokio::test]
    async fn test_next_id_refuses_foreign_item() {
        let (counters, store) = service();
        let item = json!({"PK": "COUNTER#x", "SK": "VALUE", "tp": "problem"});
        store
            .put(item.as_object().cloned().unwrap(), None)
            .await
            .unwrap();
        assert!(matches!(
            counters.next_id("x").await,
            Err(RepositoryError::InvalidData(_))
        ));
    }

    #[tokio::test]
    async fn test_list_counters_ignores_other_items() {
        let (counters, store) = service();
        counters.next_id("user").await.unwrap();
        counters.set_value("job", 4).await.unwrap();
        let other = json!({"PK": "PROB#a#1", "SK": "META", "tp": "problem"});
        store
            .put(other.as_object().cloned().unwrap(), None)
            .await
            .unwrap();

        let listed = counters.list_counters().await.unwrap();
        assert_eq!(
            listed,
            vec![
                Counter { name: "job".to_string(), value: 4 },
                Counter { name: "user".to_string(), value: 1 },
            ]
        );
    }
}
