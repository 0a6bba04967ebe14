//! Encoding between entity structs and the shared item envelope.
//!
//! Envelope: `{PK, SK, tp, dat, crt, upd, GSI*?, ttl?}`. Entities serialize
//! with serde using long field names; `created_at`/`updated_at` are lifted
//! into `crt`/`upd` and every other field is compacted into `dat` through the
//! entity's [`FieldMap`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::schema::FieldMap;

use super::error::{RepositoryError, Result};
use super::types::{
    Item, ItemKey, ATTR_CREATED, ATTR_DATA, ATTR_PK, ATTR_SK, ATTR_TTL, ATTR_TYPE, ATTR_UPDATED,
};

const CREATED_FIELD: &str = "created_at";
const UPDATED_FIELD: &str = "updated_at";

/// An entity stored in the single table.
///
/// Implementors must serialize `created_at` and `updated_at` as Unix seconds.
pub trait Entity: Serialize + DeserializeOwned {
    /// Value of the `tp` discriminator.
    const ENTITY_TYPE: &'static str;

    /// Short-key mapping for the entity's `dat` fields.
    fn fields() -> &'static FieldMap;

    /// Primary key of this entity.
    fn key(&self) -> Result<ItemKey>;

    /// Secondary index projections, recomputed on every full write.
    fn index_keys(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    /// Expiry timestamp for the store's TTL sweeper.
    fn ttl(&self) -> Option<i64> {
        None
    }
}

/// Encodes an entity into a complete item.
pub fn to_item<E: Entity>(entity: &E) -> Result<Item> {
    let mut fields = match serde_json::to_value(entity).map_err(RepositoryError::serialization)? {
        Value::Object(fields) => fields,
        other => {
            return Err(RepositoryError::Serialization(format!(
                "{} did not serialize to a map: {}",
                E::ENTITY_TYPE,
                other
            )))
        }
    };

    let created = take_timestamp(&mut fields, CREATED_FIELD)?;
    let updated = take_timestamp(&mut fields, UPDATED_FIELD)?;
    let dat = E::fields().compact(fields)?;
    let key = entity.key()?;

    let mut item = Item::new();
    item.insert(ATTR_PK.to_string(), Value::String(key.pk));
    item.insert(ATTR_SK.to_string(), Value::String(key.sk));
    item.insert(
        ATTR_TYPE.to_string(),
        Value::String(E::ENTITY_TYPE.to_string()),
    );
    item.insert(ATTR_DATA.to_string(), Value::Object(dat));
    item.insert(ATTR_CREATED.to_string(), Value::from(created));
    item.insert(ATTR_UPDATED.to_string(), Value::from(updated));
    for (attr, value) in entity.index_keys() {
        item.insert(attr.to_string(), Value::String(value));
    }
    if let Some(ttl) = entity.ttl() {
        item.insert(ATTR_TTL.to_string(), Value::from(ttl));
    }

    Ok(item)
}

/// Decodes an item into an entity, checking the type discriminator.
pub fn from_item<E: Entity>(item: &Item) -> Result<E> {
    let tp = item.get(ATTR_TYPE).and_then(Value::as_str);
    if tp != Some(E::ENTITY_TYPE) {
        return Err(RepositoryError::InvalidData(format!(
            "Expected item type '{}', found {:?}",
            E::ENTITY_TYPE,
            tp
        )));
    }

    let dat = item
        .get(ATTR_DATA)
        .and_then(Value::as_object)
        .ok_or_else(|| RepositoryError::invalid_data("Missing or invalid field: dat"))?;

    let mut fields = E::fields().expand(dat);
    fields.insert(CREATED_FIELD.to_string(), Value::from(timestamp(item, ATTR_CREATED)?));
    fields.insert(UPDATED_FIELD.to_string(), Value::from(timestamp(item, ATTR_UPDATED)?));

    serde_json::from_value(Value::Object(fields)).map_err(RepositoryError::serialization)
}

/// Reads a required integer timestamp attribute.
pub fn timestamp(item: &Item, attr: &str) -> Result<i64> {
    item.get(attr)
        .and_then(Value::as_i64)
        .ok_or_else(|| RepositoryError::invalid_data(format!("Missing or invalid field: {}", attr)))
}

fn take_timestamp(fields: &mut Item, field: &str) -> Result<i64> {
    fields
        .remove(field)
        .as_ref()
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            RepositoryError::Serialization(format!("Missing integer timestamp: {}", field))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldMap;
    use serde::Deserialize;
    use serde_json::json;

    static NOTE_FIELDS: FieldMap = FieldMap {
        entity: "note",
        fields: &[("id", "id"), ("body", "b"), ("pinned", "p")],
    };

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: String,
        body: String,
        pinned: Option<bool>,
        created_at: i64,
        updated_at: i64,
    }

    impl Entity for Note {
        const ENTITY_TYPE: &'static str = "note";

        fn fields() -> &'static FieldMap {
            &NOTE_FIELDS
        }

        fn key(&self) -> Result<ItemKey> {
            Ok(ItemKey::new(format!("NOTE#{}", self.id), "META"))
        }

        fn index_keys(&self) -> Vec<(&'static str, String)> {
            vec![("GSI1PK", "NOTES".to_string())]
        }

        fn ttl(&self) -> Option<i64> {
            Some(self.created_at + 60)
        }
    }

    fn sample() -> Note {
        Note {
            id: "n1".to_string(),
            body: "hello".to_string(),
            pinned: None,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_100,
        }
    }

    #[test]
    fn test_to_item_envelope() {
        let item = to_item(&sample()).unwrap();
        assert_eq!(
            Value::Object(item),
            json!({
                "PK": "NOTE#n1",
                "SK": "META",
                "tp": "note",
                "dat": {"id": "n1", "b": "hello", "v": 1},
                "crt": 1_700_000_000,
                "upd": 1_700_000_100,
                "GSI1PK": "NOTES",
                "ttl": 1_700_000_060
            })
        );
    }

    #[test]
    fn test_from_item_restores_entity() {
        let note = Note {
            pinned: Some(true),
            ..sample()
        };
        let item = to_item(&note).unwrap();
        assert_eq!(from_item::<Note>(&item).unwrap(), note);
    }

    #[test]
    fn test_from_item_rejects_other_type() {
        let mut item = to_item(&sample()).unwrap();
        item.insert("tp".to_string(), json!("counter"));
        assert!(matches!(
            from_item::<Note>(&item),
            Err(RepositoryError::InvalidData(_))
        ));
    }

    #[test]
    fn test_from_item_requires_timestamps() {
        let mut item = to_item(&sample()).unwrap();
        item.remove("upd");
        assert!(from_item::<Note>(&item).is_err());
    }
}
