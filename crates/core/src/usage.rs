//! Date-partitioned usage logs for rate limiting.
//!
//! Each (subject, day) pair owns a partition and every event is its own item,
//! so checking a limit is a count-only query over one partition.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::keys;
use crate::schema::{FieldMap, USAGE_FIELDS};
use crate::storage::{Condition, Entity, ItemKey, Query, RepositoryError, Result};

/// Retention window before the store's TTL sweeper removes a log.
pub const USAGE_RETENTION_DAYS: i64 = 90;

const SECONDS_PER_DAY: i64 = 86_400;

/// One recorded action by a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageLog {
    /// Owner of the usage, usually a user partition key such as `USR#7`.
    pub subject: String,
    pub action: String,
    /// Microseconds since the epoch.
    pub logged_at_us: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl UsageLog {
    pub fn new(subject: impl Into<String>, action: impl Into<String>, logged_at_us: i64) -> Self {
        let seconds = logged_at_us.div_euclid(1_000_000);
        Self {
            subject: subject.into(),
            action: action.into(),
            logged_at_us,
            metadata: None,
            created_at: seconds,
            updated_at: seconds,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// UTC day the log belongs to.
    pub fn day(&self) -> Result<NaiveDate> {
        day_of(self.logged_at_us)
    }
}

impl Entity for UsageLog {
    const ENTITY_TYPE: &'static str = "usage";

    fn fields() -> &'static FieldMap {
        &USAGE_FIELDS
    }

    fn key(&self) -> Result<ItemKey> {
        Ok(ItemKey::new(
            keys::usage_pk(&self.subject, self.day()?),
            keys::usage_sk(self.logged_at_us, &self.action),
        ))
    }

    fn ttl(&self) -> Option<i64> {
        Some(expires_at(self.created_at))
    }
}

/// `ttl` for a log created at `created_at` (Unix seconds).
pub fn expires_at(created_at: i64) -> i64 {
    created_at + USAGE_RETENTION_DAYS * SECONDS_PER_DAY
}

pub fn day_of(timestamp_us: i64) -> Result<NaiveDate> {
    DateTime::from_timestamp_micros(timestamp_us)
        .map(|dt| dt.date_naive())
        .ok_or_else(|| {
            RepositoryError::invalid_data(format!("Timestamp out of range: {}", timestamp_us))
        })
}

/// Query over one subject's logs for one day, optionally narrowed to an action.
pub fn usage_query(subject: &str, day: NaiveDate, action: Option<&str>) -> Result<Query> {
    let mut query =
        Query::partition(keys::usage_pk(subject, day)).sort_begins_with(keys::USAGE_PREFIX);
    if let Some(action) = action {
        query = query.filter(Condition::eq(USAGE_FIELDS.data_path("action")?, action));
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{from_item, to_item};
    use serde_json::json;

    // 2024-03-09T16:00:00Z
    const LOGGED_AT_US: i64 = 1_710_000_000_000_000;

    #[test]
    fn test_usage_log_envelope() {
        let log = UsageLog::new("USR#7", "generate", LOGGED_AT_US);
        let item = to_item(&log).unwrap();

        assert_eq!(item["PK"], json!("USR#7#ULOG#20240309"));
        assert_eq!(item["SK"], json!("ULOG#00001710000000000000#generate"));
        assert_eq!(item["tp"], json!("usage"));
        assert_eq!(item["crt"], json!(1_710_000_000));
        assert_eq!(item["ttl"], json!(1_710_000_000 + 90 * 86_400));
        assert_eq!(from_item::<UsageLog>(&item).unwrap(), log);
    }

    #[test]
    fn test_out_of_range_timestamp_is_rejected() {
        let log = UsageLog::new("USR#7", "generate", i64::MAX);
        assert!(matches!(log.key(), Err(RepositoryError::InvalidData(_))));
        assert!(matches!(to_item(&log), Err(RepositoryError::InvalidData(_))));
    }

    #[test]
    fn test_usage_query_filters_by_action() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let query = usage_query("USR#7", day, Some("generate")).unwrap();
        assert_eq!(query.partition, "USR#7#ULOG#20240309");
        assert_eq!(
            query.filter,
            Some(Condition::eq("dat.act", "generate"))
        );
        assert!(usage_query("USR#7", day, None).unwrap().filter.is_none());
    }

    #[test]
    fn test_day_boundary_is_utc() {
        let last_us_of_day = 1_710_028_799_999_999; // 2024-03-09T23:59:59.999999Z
        assert_eq!(
            day_of(last_us_of_day).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
        );
        assert_eq!(
            day_of(last_us_of_day + 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
        );
    }
}
