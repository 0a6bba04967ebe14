use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::Value;

use probstore_core::storage::{
    from_item, to_item, Condition, Entity, ItemKey, ItemStore, RepositoryError, Result,
    WriteOutcome, WriteRequest,
};
use probstore_core::usage::{usage_query, UsageLog};

/// Attempts at finding a free sort key when two events share a microsecond.
const MAX_LOG_ATTEMPTS: usize = 3;

/// Append-only usage logs, one partition per subject and UTC day.
#[derive(Clone)]
pub struct UsageRepository {
    store: Arc<dyn ItemStore>,
}

impl UsageRepository {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }

    /// Records an action by `subject` now.
    pub async fn log_usage(
        &self,
        subject: &str,
        action: &str,
        metadata: Option<Value>,
    ) -> Result<UsageLog> {
        let mut log = UsageLog::new(subject, action, Utc::now().timestamp_micros());
        log.metadata = metadata;
        self.record(log).await
    }

    /// Writes a prepared log. An existing log at the same instant and action
    /// pushes this one forward by a microsecond rather than overwriting it.
    pub async fn record(&self, mut log: UsageLog) -> Result<UsageLog> {
        for _ in 0..MAX_LOG_ATTEMPTS {
            let key = log.key()?;
            let item = to_item(&log)?;
            match self
                .store
                .put(item, Some(Condition::item_not_exists()))
                .await?
            {
                WriteOutcome::Applied(()) => return Ok(log),
                WriteOutcome::ConditionFailed => {
                    tracing::debug!(%key, "Usage log key taken, shifting");
                    log.logged_at_us += 1;
                }
            }
        }

        Err(RepositoryError::AlreadyExists {
            entity_type: "UsageLog",
            id: log.key()?.to_string(),
        })
    }

    /// Number of logs for a subject on a day, optionally for one action.
    ///
    /// Count-only query; no log is transferred.
    pub async fn count_usage(
        &self,
        subject: &str,
        day: NaiveDate,
        action: Option<&str>,
    ) -> Result<usize> {
        self.store.count(&usage_query(subject, day, action)?).await
    }

    /// Logs for a subject on a day, oldest first.
    pub async fn list_usage(
        &self,
        subject: &str,
        day: NaiveDate,
        limit: Option<usize>,
    ) -> Result<Vec<UsageLog>> {
        let query = usage_query(subject, day, None)?.limit(limit);
        let items = self.store.query(&query).await?;
        items.iter().map(from_item::<UsageLog>).collect()
    }

    /// Deletes every log of a subject for a day, for operators who cannot
    /// wait for TTL expiry. Returns the number of logs removed.
    pub async fn purge_day(&self, subject: &str, day: NaiveDate) -> Result<usize> {
        let items = self.store.query(&usage_query(subject, day, None)?).await?;
        let deletes: Vec<_> = items
            .iter()
            .filter_map(ItemKey::from_item)
            .map(WriteRequest::Delete)
            .collect();
        let removed = deletes.len();

        self.store.batch_write(deletes).await?;
        tracing::info!(subject, %day, removed, "Purged usage logs");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use probstore_core::usage::expires_at;
    use serde_json::json;

    // 2024-03-09T16:00:00Z
    const BASE_US: i64 = 1_710_000_000_000_000;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    fn repo() -> UsageRepository {
        UsageRepository::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn test_count_by_action() {
        let usage = repo();
        for (offset, action) in [(0, "generate"), (1, "generate"), (2, "extract")] {
            usage
                .record(UsageLog::new("USR#7", action, BASE_US + offset))
                .await
                .unwrap();
        }

        assert_eq!(usage.count_usage("USR#7", day(), None).await.unwrap(), 3);
        assert_eq!(
            usage
                .count_usage("USR#7", day(), Some("generate"))
                .await
                .unwrap(),
            2
        );
        assert_eq!(usage.count_usage("USR#8", day(), None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_days_are_separate_partitions() {
        let usage = repo();
        usage
            .record(UsageLog::new("USR#7", "generate", BASE_US))
            .await
            .unwrap();
        usage
            .record(UsageLog::new("USR#7", "generate", BASE_US + 86_400_000_000))
            .await
            .unwrap();

        assert_eq!(usage.count_usage("USR#7", day(), None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_same_instant_is_not_overwritten() {
        let usage = repo();
        let first = usage
            .record(UsageLog::new("USR#7", "generate", BASE_US))
            .await
            .unwrap();
        let second = usage
            .record(UsageLog::new("USR#7", "generate", BASE_US))
            .await
            .unwrap();

        assert_eq!(second.logged_at_us, first.logged_at_us + 1);
        assert_eq!(usage.count_usage("USR#7", day(), None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unrepresentable_instant_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let usage = UsageRepository::new(store.clone());
        let err = usage
            .record(UsageLog::new("USR#7", "generate", i64::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidData(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_carries_ttl_and_metadata() {
        let store = Arc::new(InMemoryStore::new());
        let usage = UsageRepository::new(store.clone());
        let log = UsageLog::new("USR#7", "generate", BASE_US).with_metadata(json!({"model": "m"}));
        usage.record(log.clone()).await.unwrap();

        let listed = usage.list_usage("USR#7", day(), None).await.unwrap();
        assert_eq!(listed, vec![log.clone()]);

        let item = store.get(&log.key().unwrap()).await.unwrap().unwrap();
        assert_eq!(item["ttl"], json!(expires_at(1_710_000_000)));
    }

    #[tokio::test]
    async fn test_log_usage_uses_current_day() {
        let usage = repo();
        let log = usage.log_usage("USR#1", "extract", None).await.unwrap();
        let today = log.day().unwrap();
        assert_eq!(usage.count_usage("USR#1", today, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_day() {
        let usage = repo();
        for offset in 0..30 {
            usage
                .record(UsageLog::new("USR#7", "generate", BASE_US + offset))
                .await
                .unwrap();
        }

        assert_eq!(usage.purge_day("USR#7", day()).await.unwrap(), 30);
        assert_eq!(usage.count_usage("USR#7", day(), None).await.unwrap(), 0);
    }
}
