//! Table configuration types (Functional Core - pure data).

use probstore_core::storage::{Index, ATTR_PK, ATTR_SK, ATTR_TTL};

/// Table schema configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    pub table_name: String,
    pub partition_key: String,
    pub sort_key: String,
    pub gsis: Vec<GsiConfig>,
    /// Attribute holding the expiry timestamp, if items can expire.
    pub ttl_attribute: Option<String>,
}

/// Global Secondary Index configuration. Every index projects all attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GsiConfig {
    pub name: String,
    pub partition_key: String,
    pub sort_key: String,
}

impl GsiConfig {
    fn from_index(index: Index) -> Self {
        Self {
            name: index.name().to_string(),
            partition_key: index.partition_attr().to_string(),
            sort_key: index.sort_attr().to_string(),
        }
    }
}

impl TableConfig {
    /// Sets the table name.
    pub fn with_table_name(mut self, name: &str) -> Self {
        self.table_name = name.to_string();
        self
    }

    /// Every string key attribute the table and its indexes declare,
    /// without duplicates.
    pub fn key_attributes(&self) -> Vec<&str> {
        let mut attrs = vec![self.partition_key.as_str(), self.sort_key.as_str()];
        for gsi in &self.gsis {
            for attr in [gsi.partition_key.as_str(), gsi.sort_key.as_str()] {
                if !attrs.contains(&attr) {
                    attrs.push(attr);
                }
            }
        }
        attrs
    }
}

/// Returns the table layout the probstore repositories expect.
/// This is a pure function - no I/O.
pub fn probstore_table_config() -> TableConfig {
    TableConfig {
        table_name: "probstore".to_string(),
        partition_key: ATTR_PK.to_string(),
        sort_key: ATTR_SK.to_string(),
        gsis: vec![
            GsiConfig::from_index(Index::Gsi1),
            GsiConfig::from_index(Index::Gsi2),
        ],
        ttl_attribute: Some(ATTR_TTL.to_string()),
    }
}
