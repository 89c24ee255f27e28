/*
    element.rs - The versioned drawable element

    An element is the unit of replication: the whole record travels on the
    wire and the whole record wins or loses a conflict. The payload is a
    flat field map so the history layer can diff it field by field, but the
    resolver never looks inside it.
*/

use super::types::{ElementId, ElementKind, Timestamp};
use crate::scene_store::crdt::version::VersionStamp;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Payload field holding the ids of groups an element belongs to
pub const GROUP_IDS: &str = "groupIds";

/// Payload field holding ids of elements bound to this one (arrows, labels)
pub const BOUND_ELEMENTS: &str = "boundElements";

/// Payload field holding the id of a container (text inside a shape)
pub const CONTAINER_ID: &str = "containerId";

/// Names taken by element metadata on the wire; payload fields may not use
/// them
pub const RESERVED_FIELDS: [&str; 6] = ["id", "type", "version", "versionNonce", "updated", "isDeleted"];

/// A single payload value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Whether the value has an exact JSON form. NaN and infinities do not.
    pub fn is_representable(&self) -> bool {
        match self {
            FieldValue::Number(n) => n.is_finite(),
            FieldValue::List(items) => items.iter().all(FieldValue::is_representable),
            _ => true,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(items: Vec<FieldValue>) -> Self {
        FieldValue::List(items)
    }
}

/// Geometry and style data of an element, keyed by field name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload(BTreeMap<String, FieldValue>);

impl Payload {
    pub fn new() -> Self {
        Payload(BTreeMap::new())
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.0.remove(key)
    }

    /// Set `key` to `value`, or drop it when `value` is `None`
    pub fn put(&mut self, key: &str, value: Option<FieldValue>) {
        match value {
            Some(v) => {
                self.0.insert(key.to_string(), v);
            }
            None => {
                self.0.remove(key);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check that every field survives the wire unchanged: no reserved
    /// name, no non-finite number. The error names the offending field.
    pub fn validate(&self) -> Result<(), String> {
        for (key, value) in &self.0 {
            if RESERVED_FIELDS.contains(&key.as_str()) {
                return Err(format!("field `{}` is reserved for element metadata", key));
            }
            if !value.is_representable() {
                return Err(format!("field `{}` holds a non-finite number", key));
            }
        }
        Ok(())
    }

    /// Names of fields whose value differs between `self` and `other`,
    /// including fields present on only one side
    pub fn changed_fields(&self, other: &Payload) -> BTreeSet<String> {
        let mut changed = BTreeSet::new();
        for (key, value) in &self.0 {
            if other.0.get(key) != Some(value) {
                changed.insert(key.clone());
            }
        }
        for key in other.0.keys() {
            if !self.0.contains_key(key) {
                changed.insert(key.clone());
            }
        }
        changed
    }
}

/// A versioned drawable element record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: ElementId,
    pub kind: ElementKind,
    pub version: u64,
    pub version_tie_break: u32,
    pub updated_at: Timestamp,
    pub deleted: bool,
    pub payload: Payload,
}

impl Element {
    /// Build a record stamped with `stamp`
    pub fn new(id: ElementId, kind: ElementKind, payload: Payload, stamp: VersionStamp) -> Self {
        Element {
            id,
            kind,
            version: stamp.version,
            version_tie_break: stamp.tie_break,
            updated_at: Timestamp::now(),
            deleted: false,
            payload,
        }
    }

    /// The `(version, tie_break)` pair this record is ordered by
    pub fn stamp(&self) -> VersionStamp {
        VersionStamp::new(self.version, self.version_tie_break)
    }

    /// Overwrite the version metadata after a mutation
    pub fn restamp(&mut self, stamp: VersionStamp) {
        self.version = stamp.version;
        self.version_tie_break = stamp.tie_break;
        self.updated_at = Timestamp::now();
    }

    pub fn is_live(&self) -> bool {
        !self.deleted
    }

    /// Ids of other elements this one references through binding or
    /// container fields
    pub fn referenced_ids(&self) -> BTreeSet<ElementId> {
        let mut ids = BTreeSet::new();
        if let Some(items) = self.payload.get(BOUND_ELEMENTS).and_then(FieldValue::as_list) {
            ids.extend(items.iter().filter_map(FieldValue::as_text).map(ElementId::from));
        }
        if let Some(container) = self.payload.get(CONTAINER_ID).and_then(FieldValue::as_text) {
            ids.insert(ElementId::from(container));
        }
        ids
    }

    /// Group ids this element belongs to, innermost first
    pub fn group_ids(&self) -> Vec<String> {
        self.payload
            .get(GROUP_IDS)
            .and_then(FieldValue::as_list)
            .map(|items| items.iter().filter_map(FieldValue::as_text).map(str::to_string).collect())
            .unwrap_or_default()
    }
}
