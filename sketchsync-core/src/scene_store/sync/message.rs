/*
    message.rs - Scene sync wire format

    JSON so peers written against other toolchains can read it.

    Message format:
    - formatVersion: u8, currently 1
    - type: SCENE_INIT (full scene) | SCENE_UPDATE (changed elements)
    - elements: full element records, tombstones included

    Element records put the payload fields next to the metadata:

        { "id": "a", "type": "rectangle", "version": 3, "versionNonce": 81,
          "updated": 1700000000000, "isDeleted": false, "x": 10, "y": 20 }

    Payload fields never use the metadata names and never hold non-finite
    numbers; the store refuses such writes, so every record encodes exactly.

    Elements are decoded one by one. A message that is not JSON or carries
    an unknown format version fails as a whole; a single bad element only
    fails itself.
*/

use crate::scene_store::model::{Element, ElementId, ElementKind, FieldValue, Payload, Timestamp};
use crate::scene_store::store::errors::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::sync::Arc;

/// Version of the wire format
pub const FORMAT_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Full scene, sent when a peer joins
    #[serde(rename = "SCENE_INIT")]
    SceneInit,
    /// Elements changed since the last message
    #[serde(rename = "SCENE_UPDATE")]
    SceneUpdate,
}

/// A sync message as it travels between peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    pub format_version: u8,

    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Raw element records, validated individually on decode
    #[serde(default)]
    pub elements: Vec<Value>,
}

impl SyncMessage {
    /// Build a message from store records
    pub fn from_elements(kind: MessageKind, elements: &[Arc<Element>]) -> Self {
        SyncMessage {
            format_version: FORMAT_VERSION,
            kind,
            elements: elements.iter().map(|e| element_to_wire(e)).collect(),
        }
    }

    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Decode the envelope. Elements stay raw.
    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        let message: SyncMessage = serde_json::from_slice(bytes)?;
        if message.format_version != FORMAT_VERSION {
            return Err(StoreError::UnsupportedFormat(message.format_version));
        }
        Ok(message)
    }
}

/// Serialize one element record
pub fn element_to_wire(element: &Element) -> Value {
    let mut object = Map::new();
    for (key, value) in element.payload.iter() {
        object.insert(key.clone(), field_to_json(value));
    }
    object.insert("id".into(), Value::String(element.id.as_str().to_string()));
    object.insert("type".into(), Value::String(element.kind.as_str().to_string()));
    object.insert("version".into(), Value::from(element.version));
    object.insert("versionNonce".into(), Value::from(element.version_tie_break));
    object.insert("updated".into(), Value::from(element.updated_at.as_millis()));
    object.insert("isDeleted".into(), Value::Bool(element.deleted));
    Value::Object(object)
}

/// Best-effort id of a raw record, for reporting rejections
pub fn wire_element_id(raw: &Value) -> Option<ElementId> {
    raw.get("id").and_then(Value::as_str).filter(|s| !s.is_empty()).map(ElementId::new)
}

/// Validate and convert one raw record. Missing or invalid metadata gives
/// `MalformedElement`.
pub fn element_from_wire(raw: Value) -> StoreResult<Element> {
    let Value::Object(mut object) = raw else {
        return Err(malformed("element is not an object"));
    };

    let id = match object.remove("id") {
        Some(Value::String(id)) if !id.is_empty() => ElementId::new(id),
        Some(Value::String(_)) => return Err(malformed("empty id")),
        Some(_) => return Err(malformed("id is not a string")),
        None => return Err(malformed("missing field `id`")),
    };

    let kind: ElementKind = match object.remove("type") {
        Some(kind) => serde_json::from_value(kind)
            .map_err(|e| malformed(format!("invalid type of {}: {}", id, e)))?,
        None => return Err(malformed(format!("missing field `type` on {}", id))),
    };

    let version = required_u64(&mut object, "version", &id)?;
    if version == 0 {
        return Err(malformed(format!("version 0 on {}", id)));
    }

    let tie_break = required_u64(&mut object, "versionNonce", &id)?;
    let tie_break = u32::try_from(tie_break)
        .map_err(|_| malformed(format!("versionNonce out of range on {}", id)))?;

    let deleted = match object.remove("isDeleted") {
        Some(Value::Bool(deleted)) => deleted,
        Some(_) => return Err(malformed(format!("isDeleted is not a bool on {}", id))),
        None => return Err(malformed(format!("missing field `isDeleted` on {}", id))),
    };

    // Advisory only; absent or odd timestamps are tolerated
    let updated_at = Timestamp::from_millis(object.remove("updated").and_then(|v| v.as_u64()).unwrap_or(0));

    let mut payload = Payload::new();
    for (key, value) in object {
        let value = field_from_json(value)
            .map_err(|reason| malformed(format!("field `{}` on {}: {}", key, id, reason)))?;
        payload.set(key, value);
    }

    Ok(Element {
        id,
        kind,
        version,
        version_tie_break: tie_break,
        updated_at,
        deleted,
        payload,
    })
}

fn required_u64(object: &mut Map<String, Value>, key: &str, id: &ElementId) -> StoreResult<u64> {
    match object.remove(key) {
        Some(value) => value
            .as_u64()
            .ok_or_else(|| malformed(format!("`{}` is not an unsigned integer on {}", key, id))),
        None => Err(malformed(format!("missing field `{}` on {}", key, id))),
    }
}

fn malformed(reason: impl Into<String>) -> StoreError {
    StoreError::MalformedElement(reason.into())
}

/// Payload value to its natural JSON form
pub fn field_to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Bool(b) => Value::Bool(*b),
        FieldValue::Number(n) => Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
        FieldValue::Text(s) => Value::String(s.clone()),
        FieldValue::List(items) => Value::Array(items.iter().map(field_to_json).collect()),
    }
}

/// JSON back to a payload value. Nested objects are not part of the model.
pub fn field_from_json(value: Value) -> Result<FieldValue, String> {
    match value {
        Value::Null => Ok(FieldValue::Null),
        Value::Bool(b) => Ok(FieldValue::Bool(b)),
        Value::Number(n) => {
            n.as_f64().map(FieldValue::Number).ok_or_else(|| format!("unrepresentable number {}", n))
        }
        Value::String(s) => Ok(FieldValue::Text(s)),
        Value::Array(items) => {
            items.into_iter().map(field_from_json).collect::<Result<Vec<_>, _>>().map(FieldValue::List)
        }
        Value::Object(_) => Err("nested objects are not supported".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_store::crdt::VersionStamp;
    use crate::scene_store::model::RESERVED_FIELDS;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample() -> Element {
        Element::new(
            ElementId::new("a"),
            ElementKind::Arrow,
            Payload::new()
                .with("x", 10)
                .with("label", "hi")
                .with("boundElements", vec![FieldValue::from("b")]),
            VersionStamp::new(4, 77),
        )
    }

    #[test]
    fn test_wire_shape_is_flat() {
        let wire = element_to_wire(&sample());
        assert_eq!(wire["id"], json!("a"));
        assert_eq!(wire["type"], json!("arrow"));
        assert_eq!(wire["version"], json!(4));
        assert_eq!(wire["versionNonce"], json!(77));
        assert_eq!(wire["isDeleted"], json!(false));
        assert_eq!(wire["x"], json!(10.0));
        assert_eq!(wire["boundElements"], json!(["b"]));
    }

    #[test]
    fn test_element_survives_the_wire() {
        let original = sample();
        let decoded = element_from_wire(element_to_wire(&original)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_missing_version_is_malformed() {
        let raw = json!({ "id": "a", "type": "rectangle", "versionNonce": 1, "isDeleted": false });
        let err = element_from_wire(raw).unwrap_err();
        assert!(err.is_malformed());
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_version_zero_is_malformed() {
        let raw = json!({ "id": "a", "type": "rectangle", "version": 0, "versionNonce": 1, "isDeleted": false });
        assert!(element_from_wire(raw).unwrap_err().is_malformed());
    }

    #[test]
    fn test_unknown_kind_is_malformed() {
        let raw = json!({ "id": "a", "type": "hexagon", "version": 1, "versionNonce": 1, "isDeleted": false });
        assert!(element_from_wire(raw).unwrap_err().is_malformed());
    }

    #[test]
    fn test_nested_object_field_is_malformed() {
        let raw = json!({
            "id": "a", "type": "text", "version": 1, "versionNonce": 1, "isDeleted": false,
            "style": { "font": "mono" }
        });
        assert!(element_from_wire(raw).unwrap_err().is_malformed());
    }

    #[test]
    fn test_missing_updated_is_tolerated() {
        let raw = json!({ "id": "a", "type": "text", "version": 2, "versionNonce": 5, "isDeleted": true });
        let el = element_from_wire(raw).unwrap();
        assert!(el.deleted);
        assert_eq!(el.updated_at.as_millis(), 0);
    }

    #[test]
    fn test_wire_element_id_extraction() {
        assert_eq!(wire_element_id(&json!({ "id": "q" })), Some(ElementId::new("q")));
        assert_eq!(wire_element_id(&json!({ "id": 3 })), None);
        assert_eq!(wire_element_id(&json!([])), None);
    }

    #[test]
    fn test_decode_rejects_unknown_format() {
        let bytes = serde_json::to_vec(&json!({ "formatVersion": 9, "type": "SCENE_UPDATE", "elements": [] })).unwrap();
        assert!(matches!(SyncMessage::decode(&bytes), Err(StoreError::UnsupportedFormat(9))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(SyncMessage::decode(b"not json"), Err(StoreError::Deserialization(_))));
    }

    #[test]
    fn test_encode_decode_envelope() {
        let message = SyncMessage::from_elements(MessageKind::SceneInit, &[Arc::new(sample())]);
        let decoded = SyncMessage::decode(&message.encode().unwrap()).unwrap();
        assert_eq!(decoded.kind, MessageKind::SceneInit);
        assert_eq!(decoded.elements.len(), 1);
    }

    fn field_value() -> impl Strategy<Value = FieldValue> {
        let leaf = prop_oneof![
            Just(FieldValue::Null),
            any::<bool>().prop_map(FieldValue::Bool),
            any::<f64>().prop_filter("finite", |n| n.is_finite()).prop_map(FieldValue::Number),
            ".{0,12}".prop_map(FieldValue::Text),
        ];
        leaf.prop_recursive(2, 8, 4, |inner| prop::collection::vec(inner, 0..4).prop_map(FieldValue::List))
    }

    fn payload() -> impl Strategy<Value = Payload> {
        prop::collection::btree_map("[a-zA-Z][a-zA-Z0-9]{0,8}", field_value(), 0..6).prop_map(|fields| {
            let mut payload = Payload::new();
            for (key, value) in fields {
                if !RESERVED_FIELDS.contains(&key.as_str()) {
                    payload.set(key, value);
                }
            }
            payload
        })
    }

    fn element() -> impl Strategy<Value = Element> {
        let kind = prop::sample::select(vec![
            ElementKind::Rectangle,
            ElementKind::Arrow,
            ElementKind::FreeDraw,
            ElementKind::Text,
            ElementKind::Embeddable,
        ]);
        ("[a-z0-9-]{1,10}", kind, 1u64..1_000, any::<u32>(), any::<u64>(), any::<bool>(), payload()).prop_map(
            |(id, kind, version, tie_break, updated, deleted, payload)| Element {
                id: ElementId::new(id),
                kind,
                version,
                version_tie_break: tie_break,
                updated_at: Timestamp::from_millis(updated),
                deleted,
                payload,
            },
        )
    }

    proptest! {
        #[test]
        fn prop_wire_encoding_is_lossless(original in element()) {
            let decoded = element_from_wire(element_to_wire(&original)).unwrap();
            prop_assert_eq!(decoded, original);
        }
    }
}
