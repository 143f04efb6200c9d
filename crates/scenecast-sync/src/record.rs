//! Entity records: the wire shape of one synchronized entity.
//!
//! A record is an open mapping from component names (or
//! `component|property` pairs) to JSON values, plus three reserved fields:
//! [`ID_FIELD`], [`PARENT_FIELD`], and [`BROADCAST_META_FIELD`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stable application-level id of the entity.
pub const ID_FIELD: &str = "id";

/// Remote id of the parent entity's record. Absent for scene-root entities.
pub const PARENT_FIELD: &str = "parentId";

/// Sharing and ownership metadata. Never applied as a component on add.
pub const BROADCAST_META_FIELD: &str = "firebase-broadcast";

/// Sharing and ownership metadata carried in [`BROADCAST_META_FIELD`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastMeta {
    /// Whether the entity is arbitrated by ownership.
    #[serde(default)]
    pub shared: bool,
    /// Client identity of the current owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl BroadcastMeta {
    /// The owner, treating an empty string as unowned.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref().filter(|owner| !owner.is_empty())
    }

    /// JSON form as written on the wire.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("shared".to_string(), Value::Bool(self.shared));
        if let Some(owner) = &self.owner {
            map.insert("owner".to_string(), Value::String(owner.clone()));
        }
        Value::Object(map)
    }
}

/// One synchronized entity's fields, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRecord {
    fields: BTreeMap<String, Value>,
}

impl EntityRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a record from a JSON object. Returns `None` for any other
    /// JSON shape.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self {
                fields: map.into_iter().collect(),
            }),
            _ => None,
        }
    }

    /// Converts the record into a JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields.into_iter().collect())
    }

    /// Reads one field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Sets one field, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    /// Removes one field.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Returns `true` if the field is present.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// All fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// The stable id, or `""` when absent or not a string.
    pub fn stable_id(&self) -> &str {
        self.fields
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Sets the stable id.
    pub fn set_stable_id(&mut self, id: &str) {
        self.insert(ID_FIELD, Value::String(id.to_string()));
    }

    /// The parent's remote id, if present and non-empty.
    pub fn parent_id(&self) -> Option<&str> {
        self.fields
            .get(PARENT_FIELD)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Sets the parent's remote id.
    pub fn set_parent_id(&mut self, remote_id: &str) {
        self.insert(PARENT_FIELD, Value::String(remote_id.to_string()));
    }

    /// Broadcast metadata. Missing or malformed metadata reads as
    /// non-shared and unowned.
    pub fn broadcast_meta(&self) -> BroadcastMeta {
        self.fields
            .get(BROADCAST_META_FIELD)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default()
    }

    /// Sets the broadcast metadata.
    pub fn set_broadcast_meta(&mut self, meta: &BroadcastMeta) {
        self.insert(BROADCAST_META_FIELD, meta.to_value());
    }

    /// Fields that are applied to an entity as components: everything but
    /// the broadcast metadata and the parent link.
    pub fn component_fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.iter()
            .filter(|(name, _)| *name != BROADCAST_META_FIELD && *name != PARENT_FIELD)
    }

    /// Applies a partial update: fields in `patch` overwrite fields here,
    /// and `null` values delete the field.
    pub fn merge(&mut self, patch: &EntityRecord) {
        for (name, value) in patch.iter() {
            if value.is_null() {
                self.fields.remove(name);
            } else {
                self.fields.insert(name.to_string(), value.clone());
            }
        }
    }
}

impl FromIterator<(String, Value)> for EntityRecord {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> EntityRecord {
        EntityRecord::from_value(value).unwrap()
    }

    #[test]
    fn test_reserved_field_accessors() {
        let rec = record(json!({
            "id": "box1",
            "parentId": "-K1",
            "firebase-broadcast": {"shared": true, "owner": "client-a"},
            "position": {"x": 1}
        }));
        assert_eq!(rec.stable_id(), "box1");
        assert_eq!(rec.parent_id(), Some("-K1"));
        let meta = rec.broadcast_meta();
        assert!(meta.shared);
        assert_eq!(meta.owner(), Some("client-a"));
    }

    #[test]
    fn test_missing_reserved_fields_read_as_defaults() {
        let rec = record(json!({"position": {"x": 1}}));
        assert_eq!(rec.stable_id(), "");
        assert_eq!(rec.parent_id(), None);
        assert_eq!(rec.broadcast_meta(), BroadcastMeta::default());
    }

    #[test]
    fn test_empty_owner_is_unowned() {
        let rec = record(json!({"firebase-broadcast": {"shared": true, "owner": ""}}));
        assert_eq!(rec.broadcast_meta().owner(), None);
    }

    #[test]
    fn test_malformed_meta_reads_as_default() {
        let rec = record(json!({"firebase-broadcast": "yes"}));
        assert_eq!(rec.broadcast_meta(), BroadcastMeta::default());
    }

    #[test]
    fn test_component_fields_strip_meta_and_parent() {
        let rec = record(json!({
            "id": "e1",
            "parentId": "-K1",
            "firebase-broadcast": {"shared": false},
            "position": {"x": 1},
            "material|color": "red"
        }));
        let names: Vec<&str> = rec.component_fields().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["id", "material|color", "position"]);
    }

    #[test]
    fn test_non_shared_meta_has_no_owner_key() {
        let meta = BroadcastMeta {
            shared: false,
            owner: None,
        };
        assert_eq!(meta.to_value(), json!({"shared": false}));
    }

    #[test]
    fn test_merge_overwrites_and_deletes() {
        let mut rec = record(json!({"id": "e1", "position": 1, "rotation": 2}));
        rec.merge(&record(json!({"position": 5, "rotation": null, "scale": 3})));
        assert_eq!(rec.into_value(), json!({"id": "e1", "position": 5, "scale": 3}));
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(EntityRecord::from_value(json!([1, 2])).is_none());
        assert!(EntityRecord::from_value(json!("x")).is_none());
    }
}
