//! Persisted per-object properties.
//!
//! User state that survives reloads (such as the `tracked` flag of an
//! achievement) is stored through a [`PropertyStore`] keyed by the object's
//! full name. Record types describe their layout with an explicit
//! [`RecordSchema`] built field by field, so column names and defaults are
//! visible in one place instead of being inferred.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PropertyError;

/// Durable key/value storage for object properties.
pub trait PropertyStore: Send + Sync + fmt::Debug {
    /// Value stored for `property` of the object named `full_name`.
    fn load(&self, full_name: &str, property: &str) -> Option<Value>;

    /// Persist a value.
    fn store(&self, full_name: &str, property: &str, value: Value);
}

/// In-memory [`PropertyStore`].
#[derive(Debug, Default)]
pub struct MemoryPropertyStore {
    values: RwLock<BTreeMap<(String, String), Value>>,
}

impl MemoryPropertyStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl PropertyStore for MemoryPropertyStore {
    fn load(&self, full_name: &str, property: &str) -> Option<Value> {
        self.values
            .read()
            .get(&(full_name.to_string(), property.to_string()))
            .cloned()
    }

    fn store(&self, full_name: &str, property: &str, value: Value) {
        self.values
            .write()
            .insert((full_name.to_string(), property.to_string()), value);
    }
}

// ─── Schemas ─────────────────────────────────────────────────────────

/// One field of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    /// Field name in the Rust record.
    pub name: String,
    /// Column (property) name in the store.
    pub column: String,
    /// Whether this field is the record key. The key holds the full name and
    /// is never stored as a property.
    pub primary_key: bool,
    /// Value used when nothing is stored.
    pub default: Value,
}

/// Layout of a storable record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    record: String,
    fields: Vec<FieldSchema>,
}

impl RecordSchema {
    /// Start describing a record.
    pub fn builder(record: impl Into<String>) -> RecordSchemaBuilder {
        RecordSchemaBuilder {
            record: record.into(),
            fields: Vec::new(),
        }
    }

    /// Record name.
    pub fn record(&self) -> &str {
        &self.record
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// The key field.
    pub fn primary_key(&self) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Builder for [`RecordSchema`].
#[derive(Debug, Clone)]
pub struct RecordSchemaBuilder {
    record: String,
    fields: Vec<FieldSchema>,
}

impl RecordSchemaBuilder {
    /// Add a field.
    pub fn field(
        mut self,
        name: impl Into<String>,
        column: impl Into<String>,
        primary_key: bool,
        default: impl Into<Value>,
    ) -> Self {
        self.fields.push(FieldSchema {
            name: name.into(),
            column: column.into(),
            primary_key,
            default: default.into(),
        });
        self
    }

    /// Check and finish the schema.
    pub fn build(self) -> Result<RecordSchema, PropertyError> {
        if self.fields.iter().filter(|f| f.primary_key).count() != 1 {
            return Err(PropertyError::PrimaryKey {
                record: self.record,
            });
        }
        let mut names = BTreeSet::new();
        let mut columns = BTreeSet::new();
        for field in &self.fields {
            let duplicate = if !names.insert(field.name.as_str()) {
                Some(&field.name)
            } else if !columns.insert(field.column.as_str()) {
                Some(&field.column)
            } else {
                None
            };
            if let Some(duplicate) = duplicate {
                return Err(PropertyError::DuplicateField {
                    record: self.record.clone(),
                    field: duplicate.clone(),
                });
            }
        }
        Ok(RecordSchema {
            record: self.record,
            fields: self.fields,
        })
    }
}

/// A record persisted through a [`PropertyStore`].
pub trait Storable: Serialize + DeserializeOwned {
    /// The record layout.
    fn schema() -> Result<RecordSchema, PropertyError>;
}

/// Load a record for `key`, filling missing columns with their defaults.
pub fn load_record<T: Storable>(store: &dyn PropertyStore, key: &str) -> Result<T, PropertyError> {
    let schema = T::schema()?;
    let mut object = Map::new();
    for field in schema.fields() {
        let value = if field.primary_key {
            Value::String(key.to_string())
        } else {
            store
                .load(key, &field.column)
                .unwrap_or_else(|| field.default.clone())
        };
        object.insert(field.name.clone(), value);
    }
    serde_json::from_value(Value::Object(object)).map_err(|e| PropertyError::Decode {
        record: schema.record().to_string(),
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Store every non-key field of `record`.
pub fn store_record<T: Storable>(store: &dyn PropertyStore, record: &T) -> Result<(), PropertyError> {
    let schema = T::schema()?;
    let encoded = serde_json::to_value(record).map_err(|e| PropertyError::Decode {
        record: schema.record().to_string(),
        key: String::new(),
        reason: e.to_string(),
    })?;
    let key = schema
        .primary_key()
        .and_then(|pk| encoded.get(&pk.name))
        .and_then(Value::as_str)
        .ok_or_else(|| PropertyError::PrimaryKey {
            record: schema.record().to_string(),
        })?
        .to_string();
    for field in schema.fields().iter().filter(|f| !f.primary_key) {
        let value = encoded.get(&field.name).cloned().unwrap_or(Value::Null);
        store.store(&key, &field.column, value);
    }
    Ok(())
}

/// Persisted user state of an achievement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementProperties {
    /// Achievement full name.
    pub full_name: String,
    /// Whether the user pinned this achievement.
    pub tracked: bool,
}

impl Storable for AchievementProperties {
    fn schema() -> Result<RecordSchema, PropertyError> {
        RecordSchema::builder("achievement")
            .field("full_name", "full_name", true, Value::Null)
            .field("tracked", "is_tracked", false, false)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_nothing_is_stored() {
        let store = MemoryPropertyStore::new();
        let props: AchievementProperties = load_record(&store, "core.a.b.c").unwrap();
        assert_eq!(props.full_name, "core.a.b.c");
        assert!(!props.tracked);
    }

    #[test]
    fn store_uses_column_names() {
        let store = MemoryPropertyStore::new();
        let props = AchievementProperties {
            full_name: "core.a.b.c".into(),
            tracked: true,
        };
        store_record(&store, &props).unwrap();
        assert_eq!(store.load("core.a.b.c", "is_tracked"), Some(Value::Bool(true)));
        assert_eq!(store.len(), 1);
        assert_eq!(load_record::<AchievementProperties>(&store, "core.a.b.c").unwrap(), props);
    }

    #[test]
    fn schema_requires_one_primary_key() {
        let err = RecordSchema::builder("r")
            .field("a", "a", false, 0)
            .build()
            .unwrap_err();
        assert!(matches!(err, PropertyError::PrimaryKey { .. }));
        assert!(RecordSchema::builder("r")
            .field("a", "a", true, 0)
            .field("b", "b", true, 0)
            .build()
            .is_err());
    }

    #[test]
    fn schema_rejects_duplicate_columns() {
        let err = RecordSchema::builder("r")
            .field("key", "key", true, Value::Null)
            .field("a", "col", false, 0)
            .field("b", "col", false, 0)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            PropertyError::DuplicateField {
                record: "r".into(),
                field: "col".into()
            }
        );
    }

    #[test]
    fn wrong_stored_type_is_a_decode_error() {
        let store = MemoryPropertyStore::new();
        store.store("core.x", "is_tracked", Value::String("yes".into()));
        assert!(matches!(
            load_record::<AchievementProperties>(&store, "core.x"),
            Err(PropertyError::Decode { .. })
        ));
    }
}
