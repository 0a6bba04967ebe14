//! Short-key schema mapping for the compact `dat` attribute.
//!
//! Each entity has exactly one table translating its long field names into the
//! short keys stored on the wire. Reads and writes both go through these
//! tables, so the two directions cannot drift.

use serde_json::Value;

use crate::storage::{AttrPath, Item, RepositoryError, Result, ATTR_DATA};

/// Version of the mapping tables below. Written into every `dat` map.
pub const SCHEMA_VERSION: i64 = 1;

/// Key inside `dat` holding the schema version.
pub const VERSION_KEY: &str = "v";

/// Long-name to short-key mapping for one entity type.
#[derive(Debug)]
pub struct FieldMap {
    pub entity: &'static str,
    pub fields: &'static [(&'static str, &'static str)],
}

impl FieldMap {
    pub fn short(&self, long: &str) -> Option<&'static str> {
        self.fields
            .iter()
            .find(|(l, _)| *l == long)
            .map(|(_, s)| *s)
    }

    pub fn long(&self, short: &str) -> Option<&'static str> {
        self.fields
            .iter()
            .find(|(_, s)| *s == short)
            .map(|(l, _)| *l)
    }

    /// Document path of a field inside `dat`, for partial updates and conditions.
    pub fn data_path(&self, long: &str) -> Result<AttrPath> {
        let short = self.short(long).ok_or_else(|| self.unmapped(long))?;
        Ok(AttrPath::new(&format!("{ATTR_DATA}.{short}")))
    }

    /// Renames long-named fields to short keys, dropping nulls.
    ///
    /// A field without a mapping is rejected rather than silently written.
    pub fn compact(&self, fields: Item) -> Result<Item> {
        let mut dat = Item::new();
        for (long, value) in fields {
            if value.is_null() {
                continue;
            }
            let short = self.short(&long).ok_or_else(|| self.unmapped(&long))?;
            dat.insert(short.to_string(), value);
        }
        dat.insert(VERSION_KEY.to_string(), Value::from(SCHEMA_VERSION));
        Ok(dat)
    }

    /// Renames short keys back to long field names.
    ///
    /// Unknown keys are skipped so that items written by a newer schema remain
    /// readable.
    pub fn expand(&self, dat: &Item) -> Item {
        let mut fields = Item::new();
        for (short, value) in dat {
            if short == VERSION_KEY {
                if value.as_i64().is_some_and(|v| v > SCHEMA_VERSION) {
                    tracing::warn!(
                        entity = self.entity,
                        version = %value,
                        "Reading item written by a newer schema version"
                    );
                }
                continue;
            }
            match self.long(short) {
                Some(long) => {
                    fields.insert(long.to_string(), value.clone());
                }
                None => {
                    tracing::warn!(entity = self.entity, key = %short, "Skipping unknown data key");
                }
            }
        }
        fields
    }

    fn unmapped(&self, long: &str) -> RepositoryError {
        RepositoryError::Serialization(format!(
            "Field '{}' has no short key in the {} schema",
            long, self.entity
        ))
    }
}

pub static PROBLEM_FIELDS: FieldMap = FieldMap {
    entity: "problem",
    fields: &[
        ("platform", "pf"),
        ("problem_id", "pid"),
        ("title", "ti"),
        ("description", "ds"),
        ("input_format", "inf"),
        ("output_format", "ouf"),
        ("constraints", "cs"),
        ("time_limit_ms", "tl"),
        ("memory_limit_mb", "ml"),
        ("tags", "tg"),
        ("difficulty", "df"),
        ("source_url", "url"),
        ("is_completed", "cmp"),
        ("metadata", "md"),
    ],
};

pub static TESTCASE_FIELDS: FieldMap = FieldMap {
    entity: "testcase",
    fields: &[
        ("platform", "pf"),
        ("problem_id", "pid"),
        ("testcase_id", "tid"),
        ("input", "i"),
        ("output", "o"),
        ("s3_key", "s3_key"),
        ("size", "size"),
        ("compressed_size", "compressed_size"),
    ],
};

pub static USER_FIELDS: FieldMap = FieldMap {
    entity: "user",
    fields: &[
        ("id", "id"),
        ("email", "em"),
        ("name", "nm"),
        ("oauth_provider", "op"),
        ("oauth_subject", "os"),
        ("plan", "pl"),
        ("is_active", "act"),
    ],
};

pub static JOB_FIELDS: FieldMap = FieldMap {
    entity: "job",
    fields: &[
        ("id", "id"),
        ("kind", "k"),
        ("status", "st"),
        ("worker_token", "wk"),
        ("params", "prm"),
        ("result", "res"),
        ("error", "err"),
        ("progress", "pg"),
        ("retry_of", "rof"),
        ("superseded_by", "sup"),
    ],
};

pub static PROGRESS_FIELDS: FieldMap = FieldMap {
    entity: "progress",
    fields: &[
        ("kind", "k"),
        ("job_id", "jid"),
        ("message", "msg"),
        ("percent", "pct"),
        ("recorded_at_us", "ts"),
    ],
};

pub static USAGE_FIELDS: FieldMap = FieldMap {
    entity: "usage",
    fields: &[
        ("subject", "sub"),
        ("action", "act"),
        ("logged_at_us", "ts"),
        ("metadata", "md"),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn all_maps() -> [&'static FieldMap; 6] {
        [
            &PROBLEM_FIELDS,
            &TESTCASE_FIELDS,
            &USER_FIELDS,
            &JOB_FIELDS,
            &PROGRESS_FIELDS,
            &USAGE_FIELDS,
        ]
    }

    #[test]
    fn test_short_keys_are_unique_per_entity() {
        for map in all_maps() {
            let mut shorts: Vec<&str> = map.fields.iter().map(|(_, s)| *s).collect();
            shorts.sort_unstable();
            shorts.dedup();
            assert_eq!(shorts.len(), map.fields.len(), "duplicate in {}", map.entity);
            assert!(
                !shorts.contains(&VERSION_KEY),
                "{} reuses the version key",
                map.entity
            );
        }
    }

    #[test]
    fn test_compact_and_expand() {
        let fields = json!({"status": "PENDING", "worker_token": null, "id": "j1"});
        let dat = JOB_FIELDS
            .compact(fields.as_object().cloned().unwrap())
            .unwrap();

        assert_eq!(dat, *json!({"st": "PENDING", "id": "j1", "v": 1}).as_object().unwrap());

        let expanded = JOB_FIELDS.expand(&dat);
        assert_eq!(
            expanded,
            *json!({"status": "PENDING", "id": "j1"}).as_object().unwrap()
        );
    }

    #[test]
    fn test_compact_rejects_unmapped_field() {
        let fields = json!({"colour": "red"});
        let result = JOB_FIELDS.compact(fields.as_object().cloned().unwrap());
        assert!(matches!(result, Err(RepositoryError::Serialization(_))));
    }

    #[test]
    fn test_expand_skips_unknown_keys() {
        let dat = json!({"st": "PENDING", "zz": 1, "v": 2});
        let expanded = JOB_FIELDS.expand(dat.as_object().unwrap());
        assert_eq!(expanded, *json!({"status": "PENDING"}).as_object().unwrap());
    }

    #[test]
    fn test_data_path() {
        assert_eq!(
            JOB_FIELDS.data_path("status").unwrap(),
            AttrPath::new("dat.st")
        );
        assert!(JOB_FIELDS.data_path("nope").is_err());
    }
}
