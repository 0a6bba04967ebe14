use serde_json::{Map, Value};

/// Native representation of a stored item: attribute name to JSON-like value.
pub type Item = Map<String, Value>;

/// Partition key attribute name.
pub const ATTR_PK: &str = "PK";
/// Sort key attribute name.
pub const ATTR_SK: &str = "SK";
/// Entity type discriminator.
pub const ATTR_TYPE: &str = "tp";
/// Compact field map.
pub const ATTR_DATA: &str = "dat";
/// Creation timestamp (Unix seconds).
pub const ATTR_CREATED: &str = "crt";
/// Last update timestamp (Unix seconds).
pub const ATTR_UPDATED: &str = "upd";
/// Expiry timestamp read by the store's TTL sweeper.
pub const ATTR_TTL: &str = "ttl";

/// Maximum number of requests accepted by a single batch write call.
pub const MAX_BATCH_WRITE: usize = 25;

/// Composite primary key of an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    pub pk: String,
    pub sk: String,
}

impl ItemKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }

    /// Extracts the key from an item, if both key attributes are strings.
    pub fn from_item(item: &Item) -> Option<Self> {
        let pk = item.get(ATTR_PK)?.as_str()?;
        let sk = item.get(ATTR_SK)?.as_str()?;
        Some(Self::new(pk, sk))
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.pk, self.sk)
    }
}

/// Result of a conditional write.
///
/// A lost condition is expected control flow (claim lost, duplicate create),
/// not a fault.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    Applied(T),
    ConditionFailed,
}

impl<T> WriteOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, WriteOutcome::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            WriteOutcome::Applied(value) => Some(value),
            WriteOutcome::ConditionFailed => None,
        }
    }
}

/// A single request inside a batch write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    Put(Item),
    Delete(ItemKey),
}

/// Secondary indexes available on the table.
///
/// Both project all attributes; items lacking the index attributes are simply
/// absent from the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Index {
    /// Status listings (jobs, problems) and user email lookup.
    Gsi1,
    /// User OAuth identity lookup.
    Gsi2,
}

impl Index {
    pub fn name(&self) -> &'static str {
        match self {
            Index::Gsi1 => "GSI1",
            Index::Gsi2 => "GSI2",
        }
    }

    pub fn partition_attr(&self) -> &'static str {
        match self {
            Index::Gsi1 => "GSI1PK",
            Index::Gsi2 => "GSI2PK",
        }
    }

    pub fn sort_attr(&self) -> &'static str {
        match self {
            Index::Gsi1 => "GSI1SK",
            Index::Gsi2 => "GSI2SK",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_key_from_item() {
        let item = json!({"PK": "COUNTER#user", "SK": "VALUE", "val": 3});
        let key = ItemKey::from_item(item.as_object().unwrap()).unwrap();
        assert_eq!(key, ItemKey::new("COUNTER#user", "VALUE"));
        assert_eq!(key.to_string(), "COUNTER#user/VALUE");
    }

    #[test]
    fn test_item_key_requires_string_keys() {
        let item = json!({"PK": 1, "SK": "META"});
        assert!(ItemKey::from_item(item.as_object().unwrap()).is_none());
    }

    #[test]
    fn test_index_attribute_names() {
        assert_eq!(Index::Gsi1.name(), "GSI1");
        assert_eq!(Index::Gsi1.partition_attr(), "GSI1PK");
        assert_eq!(Index::Gsi2.sort_attr(), "GSI2SK");
    }

    #[test]
    fn test_write_outcome_applied() {
        assert_eq!(WriteOutcome::Applied(5).applied(), Some(5));
        assert!(WriteOutcome::<()>::ConditionFailed.applied().is_none());
    }
}
