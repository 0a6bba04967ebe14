//! In-memory item store implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use probstore_core::storage::{
    Condition, Item, ItemKey, ItemStore, Query, RepositoryError, Result, Update, WriteOutcome,
    WriteRequest, ATTR_PK, ATTR_SK, MAX_BATCH_WRITE,
};

use crate::storage::marshal::normalize;

/// In-memory single-table store for testing.
///
/// Items live in one ordered map keyed by (PK, SK) behind an
/// `Arc<RwLock<_>>`. Conditional writes evaluate and apply under the write
/// lock, so they are atomic with respect to each other just like
/// single-item conditional writes in DynamoDB. Data is not persisted and will
/// be lost when the store is dropped.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    items: Arc<RwLock<BTreeMap<ItemKey, Item>>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items in the table.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// Items matching the key condition, in the order the table or index
    /// would return them, before filter and limit.
    fn candidates<'a>(items: &'a BTreeMap<ItemKey, Item>, query: &Query) -> Vec<&'a Item> {
        let sort_matches = |sk: &str| query.sort.as_ref().is_none_or(|s| s.matches(sk));

        let mut matched: Vec<(&str, &ItemKey, &'a Item)> = match query.index {
            None => items
                .range(ItemKey::new(query.partition.clone(), String::new())..)
                .take_while(|(key, _)| key.pk == query.partition)
                .filter(|(key, _)| sort_matches(&key.sk))
                .map(|(key, item)| (key.sk.as_str(), key, item))
                .collect(),
            Some(index) => {
                let (pk_attr, sk_attr) = (index.partition_attr(), index.sort_attr());
                let mut matched: Vec<_> = items
                    .iter()
                    .filter_map(|(key, item)| {
                        let pk = item.get(pk_attr).and_then(Value::as_str)?;
                        let sk = item.get(sk_attr).and_then(Value::as_str)?;
                        (pk == query.partition && sort_matches(sk)).then_some((sk, key, item))
                    })
                    .collect();
                matched.sort_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.cmp(b.1)));
                matched
            }
        };

        if !query.ascending {
            matched.reverse();
        }
        matched.into_iter().map(|(_, _, item)| item).collect()
    }

    fn run_query(items: &BTreeMap<ItemKey, Item>, query: &Query) -> Vec<Item> {
        Self::candidates(items, query)
            .into_iter()
            .filter(|item| query.filter.as_ref().is_none_or(|f| f.evaluate(item)))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    fn write(items: &mut BTreeMap<ItemKey, Item>, request: WriteRequest) -> Result<()> {
        match request {
            WriteRequest::Put(item) => {
                let key = item_key(&item)?;
                items.insert(key, normalize(&item)?);
            }
            WriteRequest::Delete(key) => {
                items.remove(&key);
            }
        }
        Ok(())
    }
}

fn item_key(item: &Item) -> Result<ItemKey> {
    ItemKey::from_item(item)
        .ok_or_else(|| RepositoryError::invalid_data("Item is missing PK or SK"))
}

fn seed_item(key: &ItemKey) -> Item {
    let mut item = Item::new();
    item.insert(ATTR_PK.to_string(), Value::String(key.pk.clone()));
    item.insert(ATTR_SK.to_string(), Value::String(key.sk.clone()));
    item
}

#[async_trait]
impl ItemStore for InMemoryStore {
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>> {
        let items = self.items.read().await;
        Ok(items.get(key).cloned())
    }

    async fn put(&self, item: Item, condition: Option<Condition>) -> Result<WriteOutcome<()>> {
        let key = item_key(&item)?;
        let item = normalize(&item)?;

        let mut items = self.items.write().await;
        if let Some(condition) = condition {
            let empty = Item::new();
            let current = items.get(&key).unwrap_or(&empty);
            if !condition.evaluate(current) {
                return Ok(WriteOutcome::ConditionFailed);
            }
        }
        items.insert(key, item);
        Ok(WriteOutcome::Applied(()))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Item>> {
        let items = self.items.read().await;
        Ok(Self::run_query(&items, query))
    }

    async fn count(&self, query: &Query) -> Result<usize> {
        let items = self.items.read().await;
        Ok(Self::run_query(&items, query).len())
    }

    async fn scan(&self, filter: Option<&Condition>, limit: Option<usize>) -> Result<Vec<Item>> {
        let items = self.items.read().await;
        Ok(items
            .values()
            .filter(|item| filter.is_none_or(|f| f.evaluate(item)))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn update(&self, key: &ItemKey, update: &Update) -> Result<WriteOutcome<Item>> {
        if update.actions.is_empty() {
            return Err(RepositoryError::invalid_data("Update has no actions"));
        }

        let mut items = self.items.write().await;
        let current = items.get(key);

        if let Some(condition) = &update.condition {
            let empty = Item::new();
            if !condition.evaluate(current.unwrap_or(&empty)) {
                return Ok(WriteOutcome::ConditionFailed);
            }
        }

        let mut next = current.cloned().unwrap_or_else(|| seed_item(key));
        update.apply(&mut next)?;
        let next = normalize(&next)?;
        items.insert(key.clone(), next.clone());
        Ok(WriteOutcome::Applied(next))
    }

    async fn delete(&self, key: &ItemKey) -> Result<bool> {
        let mut items = self.items.write().await;
        Ok(items.remove(key).is_some())
    }

    async fn batch_write(&self, requests: Vec<WriteRequest>) -> Result<()> {
        let mut requests = requests.into_iter().peekable();
        while requests.peek().is_some() {
            let chunk: Vec<_> = requests.by_ref().take(MAX_BATCH_WRITE).collect();
            let mut items = self.items.write().await;
            for request in chunk {
                Self::write(&mut items, request)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probstore_core::storage::{Index, SortCondition};
    use serde_json::json;

    fn item(value: Value) -> Item {
        value.as_object().cloned().unwrap()
    }

    fn job(id: &str, status: &str, crt: i64) -> Item {
        item(json!({
            "PK": format!("EXTRACTIONJOB#{id}"),
            "SK": "META",
            "tp": "job",
            "dat": {"st": status},
            "crt": crt,
            "upd": crt,
            "GSI1PK": format!("EXTRACTIONJOB#STATUS#{status}"),
            "GSI1SK": format!("{crt:020}#{id}")
        }))
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = InMemoryStore::new();
        let result = store.get(&ItemKey::new("PROB#x#1", "META")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_put_normalizes_nulls() {
        let store = InMemoryStore::new();
        store
            .put(item(json!({"PK": "A", "SK": "B", "gone": null, "n": 2.0})), None)
            .await
            .unwrap();
        let stored = store.get(&ItemKey::new("A", "B")).await.unwrap().unwrap();
        assert!(!stored.contains_key("gone"));
        assert_eq!(stored["n"], json!(2));
    }

    #[tokio::test]
    async fn test_conditional_put() {
        let store = InMemoryStore::new();
        let first = item(json!({"PK": "A", "SK": "B", "v": 1}));
        let second = item(json!({"PK": "A", "SK": "B", "v": 2}));

        let outcome = store
            .put(first, Some(Condition::item_not_exists()))
            .await
            .unwrap();
        assert!(outcome.is_applied());

        let outcome = store
            .put(second, Some(Condition::item_not_exists()))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::ConditionFailed);

        let stored = store.get(&ItemKey::new("A", "B")).await.unwrap().unwrap();
        assert_eq!(stored["v"], json!(1));
    }

    #[tokio::test]
    async fn test_query_partition_in_sort_order() {
        let store = InMemoryStore::new();
        for sk in ["TC#2", "META", "TC#1", "TC#10"] {
            store
                .put(item(json!({"PK": "PROB#p#1", "SK": sk})), None)
                .await
                .unwrap();
        }
        store
            .put(item(json!({"PK": "PROB#p#10", "SK": "TC#1"})), None)
            .await
            .unwrap();

        let query = Query::partition("PROB#p#1").sort_begins_with("TC#");
        let sks: Vec<_> = store
            .query(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i["SK"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(sks, vec!["TC#1", "TC#10", "TC#2"]);

        assert_eq!(store.count(&query).await.unwrap(), 3);
        assert_eq!(store.count(&query.clone().limit(Some(2))).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_index_query_descending_with_filter() {
        let store = InMemoryStore::new();
        store.put(job("a", "PENDING", 100), None).await.unwrap();
        store.put(job("b", "PENDING", 300), None).await.unwrap();
        store.put(job("c", "PENDING", 200), None).await.unwrap();
        store.put(job("d", "PROCESSING", 400), None).await.unwrap();

        let query = Query::partition("EXTRACTIONJOB#STATUS#PENDING")
            .on_index(Index::Gsi1)
            .descending();
        let ids: Vec<_> = store
            .query(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i["PK"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            ids,
            vec!["EXTRACTIONJOB#b", "EXTRACTIONJOB#c", "EXTRACTIONJOB#a"]
        );

        let filtered = query
            .filter(Condition::lt("upd", 250))
            .sort(SortCondition::Ge(format!("{:020}", 0)))
            .limit(Some(1));
        let items = store.query(&filtered).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["PK"], json!("EXTRACTIONJOB#c"));
    }

    #[tokio::test]
    async fn test_update_upserts_and_returns_new_item() {
        let store = InMemoryStore::new();
        let key = ItemKey::new("COUNTER#user", "VALUE");
        let update = Update::new().increment("val", 1);

        let first = store.update(&key, &update).await.unwrap().applied().unwrap();
        assert_eq!(first["val"], json!(1));
        assert_eq!(first["PK"], json!("COUNTER#user"));

        let second = store.update(&key, &update).await.unwrap().applied().unwrap();
        assert_eq!(second["val"], json!(2));
    }

    #[tokio::test]
    async fn test_failed_condition_leaves_item_untouched() {
        let store = InMemoryStore::new();
        store.put(job("a", "PROCESSING", 1), None).await.unwrap();
        let key = ItemKey::new("EXTRACTIONJOB#a", "META");

        let update = Update::new()
            .set("dat.st", "PROCESSING")
            .when(Condition::eq("dat.st", "PENDING"));
        assert_eq!(
            store.update(&key, &update).await.unwrap(),
            WriteOutcome::ConditionFailed
        );
    }

    #[tokio::test]
    async fn test_invalid_update_is_not_partially_applied() {
        let store = InMemoryStore::new();
        store
            .put(item(json!({"PK": "A", "SK": "B", "v": 1})), None)
            .await
            .unwrap();
        let key = ItemKey::new("A", "B");
        let update = Update::new().set("v", 2).set("missing.child", 3);

        assert!(store.update(&key, &update).await.is_err());
        let stored = store.get(&key).await.unwrap().unwrap();
        assert_eq!(stored["v"], json!(1));
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = InMemoryStore::new();
        store
            .put(item(json!({"PK": "A", "SK": "B"})), None)
            .await
            .unwrap();
        assert!(store.delete(&ItemKey::new("A", "B")).await.unwrap());
        assert!(!store.delete(&ItemKey::new("A", "B")).await.unwrap());
    }

    #[tokio::test]
    async fn test_batch_write_over_chunk_size() {
        let store = InMemoryStore::new();
        let puts = (0..60)
            .map(|i| WriteRequest::Put(item(json!({"PK": "P", "SK": format!("TC#{i}")}))))
            .collect();
        store.batch_write(puts).await.unwrap();
        assert_eq!(store.len().await, 60);

        let deletes = (0..60)
            .map(|i| WriteRequest::Delete(ItemKey::new("P", format!("TC#{i}"))))
            .collect();
        store.batch_write(deletes).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_scan_with_filter() {
        let store = InMemoryStore::new();
        store.put(job("a", "PENDING", 1), None).await.unwrap();
        store
            .put(item(json!({"PK": "COUNTER#x", "SK": "VALUE", "tp": "counter", "val": 3})), None)
            .await
            .unwrap();
        let counters = store
            .scan(Some(&Condition::eq("tp", "counter")), None)
            .await
            .unwrap();
        assert_eq!(counters.len(), 1);
    }
}
