//! Atomic counter records.
//!
//! A counter is a bare item `{PK: "COUNTER#<name>", SK: "VALUE", tp: "counter",
//! val: <int>}` without a `dat` map.

use serde_json::Value;

use crate::keys;
use crate::storage::{
    Condition, Item, ItemKey, RepositoryError, Result, Update, ATTR_CREATED, ATTR_PK, ATTR_SK,
    ATTR_TYPE, ATTR_UPDATED,
};

pub const COUNTER_TYPE: &str = "counter";
pub const ATTR_VALUE: &str = "val";

/// Counter that issues user ids.
pub const USER_COUNTER: &str = "user";

/// A named counter and its last issued value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counter {
    pub name: String,
    pub value: i64,
}

impl Counter {
    pub fn item_key(name: &str) -> ItemKey {
        ItemKey::new(keys::counter_pk(name), keys::COUNTER_SK)
    }

    /// Builds the full counter item, used when a value is set directly.
    pub fn to_item(&self, now: i64) -> Item {
        let key = Counter::item_key(&self.name);
        let mut item = Item::new();
        item.insert(ATTR_PK.to_string(), Value::String(key.pk));
        item.insert(ATTR_SK.to_string(), Value::String(key.sk));
        item.insert(ATTR_TYPE.to_string(), Value::from(COUNTER_TYPE));
        item.insert(ATTR_VALUE.to_string(), Value::from(self.value));
        item.insert(ATTR_CREATED.to_string(), Value::from(now));
        item.insert(ATTR_UPDATED.to_string(), Value::from(now));
        item
    }

    pub fn from_item(item: &Item) -> Result<Self> {
        let name = item
            .get(ATTR_PK)
            .and_then(Value::as_str)
            .and_then(|pk| pk.strip_prefix(keys::COUNTER_PREFIX))
            .ok_or_else(|| RepositoryError::invalid_data("Counter item without COUNTER# key"))?;
        Ok(Self {
            name: name.to_string(),
            value: value_of(item)?,
        })
    }
}

/// Reads the `val` attribute.
pub fn value_of(item: &Item) -> Result<i64> {
    item.get(ATTR_VALUE)
        .and_then(Value::as_i64)
        .ok_or_else(|| RepositoryError::invalid_data("Counter item has no integer val"))
}

/// The single atomic upsert behind `next_id`.
///
/// `val = if_not_exists(val, 0) + 1` creates a missing counter and increments
/// an existing one in the same write, so concurrent first callers still each
/// receive a distinct value.
pub fn next_value_update(now: i64) -> Update {
    Update::new()
        .increment(ATTR_VALUE, 1)
        .set_if_not_exists(ATTR_TYPE, COUNTER_TYPE)
        .set_if_not_exists(ATTR_CREATED, now)
        .set(ATTR_UPDATED, now)
        .when(Condition::Or(vec![
            Condition::not_exists(ATTR_TYPE),
            Condition::eq(ATTR_TYPE, COUNTER_TYPE),
        ]))
}

/// Filter selecting counter items during a scan.
pub fn counter_filter() -> Condition {
    Condition::eq(ATTR_TYPE, COUNTER_TYPE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_next_value_creates_then_increments() {
        let update = next_value_update(10);
        let mut item = Item::new();
        for expected in 1..=3 {
            assert!(update.condition.as_ref().unwrap().evaluate(&item));
            update.apply(&mut item).unwrap();
            assert_eq!(value_of(&item).unwrap(), expected);
        }
        assert_eq!(item["tp"], json!("counter"));
        assert_eq!(item["crt"], json!(10));
    }

    #[test]
    fn test_next_value_refuses_foreign_item() {
        let mut item = Item::new();
        item.insert("tp".to_string(), json!("user"));
        assert!(!next_value_update(1)
            .condition
            .unwrap()
            .evaluate(&item));
    }

    #[test]
    fn test_counter_item_round_trip() {
        let counter = Counter {
            name: "user".to_string(),
            value: 41,
        };
        let item = counter.to_item(5);
        assert_eq!(item["PK"], json!("COUNTER#user"));
        assert_eq!(item["SK"], json!("VALUE"));
        assert_eq!(item["val"], json!(41));
        assert_eq!(Counter::from_item(&item).unwrap(), counter);
    }
}
