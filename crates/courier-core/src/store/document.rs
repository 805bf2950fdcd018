//! On-disk document format and shape normalisation.
//!
//! Current form: `{ "version": 1, "items": [ ... ] }`.
//! Also accepted when reading:
//! - a bare array of items (legacy, implies version 1)
//! - a JSON string whose content is one of the above (unwrapped once)

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::OutboxState;
use crate::domain::{ArtifactRef, OutboxItem, OutboxKey};

/// Version written by this build.
pub const STORE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub(crate) enum DocumentError {
    #[error("not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unrecognized document shape: {0}")]
    Unrecognized(&'static str),
}

/// The top-level shapes a store file can take.
#[derive(Debug)]
enum DocumentShape {
    Versioned { version: u32, items: Vec<Value> },
    LegacyArray(Vec<Value>),
    DoubleEncoded(String),
    Unrecognized(&'static str),
}

impl DocumentShape {
    fn classify(value: Value) -> Self {
        match value {
            Value::Array(items) => DocumentShape::LegacyArray(items),
            Value::String(inner) => DocumentShape::DoubleEncoded(inner),
            Value::Object(mut map) => {
                let version = map
                    .get("version")
                    .and_then(Value::as_u64)
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or(STORE_VERSION);
                match map.remove("items") {
                    Some(Value::Array(items)) => DocumentShape::Versioned { version, items },
                    Some(_) => DocumentShape::Unrecognized("`items` is not an array"),
                    None => DocumentShape::Unrecognized("object without `items`"),
                }
            }
            _ => DocumentShape::Unrecognized("scalar document"),
        }
    }
}

/// Resolve any accepted shape to `(version, raw items)`.
fn normalize(bytes: &[u8]) -> Result<(u32, Vec<Value>), DocumentError> {
    let outer = serde_json::from_slice::<Value>(bytes)?;
    let shape = match DocumentShape::classify(outer) {
        DocumentShape::DoubleEncoded(inner) => {
            DocumentShape::classify(serde_json::from_str::<Value>(&inner)?)
        }
        shape => shape,
    };

    match shape {
        DocumentShape::Versioned { version, items } => Ok((version, items)),
        DocumentShape::LegacyArray(items) => Ok((STORE_VERSION, items)),
        DocumentShape::DoubleEncoded(_) => Err(DocumentError::Unrecognized(
            "string nested more than one level",
        )),
        DocumentShape::Unrecognized(reason) => Err(DocumentError::Unrecognized(reason)),
    }
}

/// Decode a store file. Items that do not parse, or lack a subject or
/// artifact file name, are dropped. Later duplicates of a key win.
pub(crate) fn decode<R: ArtifactRef>(bytes: &[u8]) -> Result<OutboxState<R>, DocumentError> {
    let (version, raw_items) = normalize(bytes)?;

    let mut items: BTreeMap<OutboxKey, OutboxItem<R>> = BTreeMap::new();
    let mut dropped = 0usize;
    for raw in raw_items {
        match serde_json::from_value::<OutboxItem<R>>(raw) {
            Ok(item) if item.key.is_valid() && item.artifact.is_valid() => {
                items.insert(item.key.clone(), item);
            }
            Ok(_) => dropped += 1,
            Err(err) => {
                debug!(error = %err, "dropping unparsable outbox item");
                dropped += 1;
            }
        }
    }
    if dropped > 0 {
        debug!(dropped, kept = items.len(), "dropped invalid outbox items on load");
    }

    Ok(OutboxState { version, items })
}

#[derive(Serialize)]
struct StoreDocument<'a, R> {
    version: u32,
    items: Vec<&'a OutboxItem<R>>,
}

pub(crate) fn encode<R: ArtifactRef>(state: &OutboxState<R>) -> Result<Vec<u8>, serde_json::Error> {
    let document = StoreDocument {
        version: state.version,
        items: state.items.values().collect(),
    };
    serde_json::to_vec_pretty(&document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeliveryStatus, ExportFileRef};
    use rstest::rstest;

    const ITEMS: &str = r#"[
        {"subjectId":"g1","fileName":"e1.json","status":"PENDING","attempts":0,"lastError":null,"updatedAt":10},
        {"subjectId":"g2","partition":"2026","fileName":"e2.json","overrideId":"x","status":"FAILED","attempts":3,"lastError":"boom","updatedAt":20}
    ]"#;

    fn decode_export(bytes: &[u8]) -> OutboxState<ExportFileRef> {
        decode::<ExportFileRef>(bytes).unwrap()
    }

    #[test]
    fn legacy_array_loads_like_versioned_document() {
        let versioned = format!(r#"{{"version":1,"items":{ITEMS}}}"#);
        let legacy = decode_export(ITEMS.as_bytes());
        let current = decode_export(versioned.as_bytes());

        assert_eq!(legacy, current);
        assert_eq!(legacy.version, 1);
        assert_eq!(legacy.items.len(), 2);
    }

    #[test]
    fn double_encoded_document_is_unwrapped_once() {
        let versioned = format!(r#"{{"version":1,"items":{ITEMS}}}"#);
        let wrapped = serde_json::to_string(&versioned).unwrap();

        let state = decode_export(wrapped.as_bytes());
        let item = &state.items[&OutboxKey::with_partition("g2", "2026")];
        assert_eq!(item.status, DeliveryStatus::Failed);
        assert_eq!(item.attempts, 3);
        assert_eq!(item.artifact.override_id.as_deref(), Some("x"));
    }

    #[test]
    fn missing_version_defaults_to_one() {
        let doc = format!(r#"{{"items":{ITEMS}}}"#);
        assert_eq!(decode_export(doc.as_bytes()).version, 1);
    }

    #[rstest]
    #[case::garbage(b"{not json".as_slice())]
    #[case::number(b"42".as_slice())]
    #[case::object_without_items(br#"{"version":1}"#.as_slice())]
    #[case::items_not_array(br#"{"version":1,"items":{}}"#.as_slice())]
    #[case::twice_encoded(br#""\"[]\"""#.as_slice())]
    fn unreadable_shapes_are_errors(#[case] bytes: &[u8]) {
        assert!(decode::<ExportFileRef>(bytes).is_err());
    }

    #[test]
    fn items_missing_required_fields_are_dropped() {
        let doc = br#"[
            {"subjectId":"g1","fileName":"e1.json","status":"PENDING"},
            {"fileName":"orphan.json","status":"PENDING"},
            {"subjectId":"g3","status":"PENDING"},
            {"subjectId":"g4","fileName":"e4.json","status":"LOST"},
            {"subjectId":" ","fileName":"e5.json","status":"SENT"}
        ]"#;
        let state = decode_export(doc);

        assert_eq!(state.items.len(), 1);
        let item = &state.items[&OutboxKey::new("g1")];
        assert_eq!(item.attempts, 0);
        assert_eq!(item.updated_at, 0);
    }

    #[test]
    fn encode_then_decode_preserves_items() {
        let state = decode_export(ITEMS.as_bytes());
        let bytes = encode(&state).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();

        assert!(text.contains("\"version\": 1"));
        assert_eq!(decode_export(&bytes), state);
    }
}
