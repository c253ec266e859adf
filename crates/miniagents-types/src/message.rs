//! Immutable, content-addressed messages.
//!
//! A `Message` is text plus a metadata map. Its identity is `hash_key`, the
//! SHA-256 of a canonical JSON rendering of its content, computed once at
//! construction. Two messages with the same content share a `hash_key` no
//! matter where or when they were built, which is what persistence hooks use
//! to deduplicate.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::MessageError;

/// Metadata key set on messages that stand in for a captured failure.
pub const IS_ERROR_KEY: &str = "is_error";

/// An immutable message.
///
/// Cloning is cheap (the content lives behind an `Arc`). There are no
/// setters; `with_text` and `with_metadata_entry` build new messages.
#[derive(Clone, Serialize, Deserialize)]
#[serde(into = "MessageRecord", from = "MessageRecord")]
pub struct Message {
    inner: Arc<MessageInner>,
}

#[derive(Debug)]
struct MessageInner {
    text: String,
    metadata: BTreeMap<String, Value>,
    hash_key: String,
}

/// Wire shape of a message. `hash_key` is written for readers' convenience
/// and ignored on input; it is always recomputed from content.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MessageRecord {
    text: String,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
    #[serde(default)]
    hash_key: String,
}

impl Message {
    /// Create a message with text and no metadata.
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_metadata(text, BTreeMap::new())
    }

    /// Create a message with text and metadata.
    pub fn with_metadata(text: impl Into<String>, metadata: BTreeMap<String, Value>) -> Self {
        let text = text.into();
        let hash_key = compute_hash_key(&text, &metadata);
        Self {
            inner: Arc::new(MessageInner {
                text,
                metadata,
                hash_key,
            }),
        }
    }

    /// Create a message that records a failure as data.
    pub fn error(text: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(IS_ERROR_KEY.to_string(), Value::Bool(true));
        Self::with_metadata(text, metadata)
    }

    /// Build a message from a JSON value.
    ///
    /// - A string becomes the text.
    /// - An object's `"text"` key becomes the text (empty when absent) and
    ///   every other key becomes metadata.
    /// - Anything else is rejected.
    pub fn from_json(value: Value) -> Result<Self, MessageError> {
        match value {
            Value::String(text) => Ok(Self::new(text)),
            Value::Object(map) => {
                let mut text = String::new();
                let mut metadata = BTreeMap::new();
                for (key, value) in map {
                    if key == "text" {
                        match value {
                            Value::String(s) => text = s,
                            Value::Null => {}
                            other => return Err(MessageError::InvalidText(json_kind(&other))),
                        }
                    } else {
                        metadata.insert(key, value);
                    }
                }
                Ok(Self::with_metadata(text, metadata))
            }
            other => Err(MessageError::NotAMessage(json_kind(&other))),
        }
    }

    /// The message text.
    pub fn text(&self) -> &str {
        &self.inner.text
    }

    /// All metadata entries, ordered by key.
    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.inner.metadata
    }

    /// A single metadata value.
    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.inner.metadata.get(key)
    }

    /// Content hash (lowercase hex SHA-256) identifying this message.
    pub fn hash_key(&self) -> &str {
        &self.inner.hash_key
    }

    /// Whether this message stands in for a captured failure.
    pub fn is_error(&self) -> bool {
        matches!(self.meta(IS_ERROR_KEY), Some(Value::Bool(true)))
    }

    /// A new message with the same metadata and different text.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self::with_metadata(text, self.inner.metadata.clone())
    }

    /// A new message with one metadata entry added or replaced.
    pub fn with_metadata_entry(&self, key: impl Into<String>, value: Value) -> Self {
        let mut metadata = self.inner.metadata.clone();
        metadata.insert(key.into(), value);
        Self::with_metadata(self.inner.text.clone(), metadata)
    }

    /// Canonical JSON of the content (sorted keys, no whitespace).
    pub fn canonical_json(&self) -> String {
        canonical_content(&self.inner.text, &self.inner.metadata)
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.inner.hash_key == other.inner.hash_key
    }
}

impl Eq for Message {}

impl Hash for Message {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash_key.hash(state);
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("text", &self.inner.text)
            .field("metadata", &self.inner.metadata)
            .field("hash_key", &self.inner.hash_key)
            .finish()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl From<Message> for MessageRecord {
    fn from(message: Message) -> Self {
        Self {
            text: message.inner.text.clone(),
            metadata: message.inner.metadata.clone(),
            hash_key: message.inner.hash_key.clone(),
        }
    }
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Self::with_metadata(record.text, record.metadata)
    }
}

fn compute_hash_key(text: &str, metadata: &BTreeMap<String, Value>) -> String {
    let digest = Sha256::digest(canonical_content(text, metadata).as_bytes());
    format!("{:x}", digest)
}

fn canonical_content(text: &str, metadata: &BTreeMap<String, Value>) -> String {
    let mut out = String::from("{\"metadata\":{");
    for (i, (key, value)) in metadata.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_json_string(key, &mut out);
        out.push(':');
        write_canonical(value, &mut out);
    }
    out.push_str("},\"text\":");
    write_json_string(text, &mut out);
    out.push('}');
    out
}

/// Serialize with object keys sorted at every depth, independent of how
/// `serde_json::Map` happens to order its entries.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json_string(key, out);
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_json_string(s: &str, out: &mut String) {
    out.push_str(&Value::String(s.to_string()).to_string());
}

fn json_kind(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(_) => "string".to_string(),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identical_content_identical_hash() {
        let a = Message::with_metadata("hi", BTreeMap::from([("role".to_string(), json!("user"))]));
        let b = Message::with_metadata("hi", BTreeMap::from([("role".to_string(), json!("user"))]));
        assert_eq!(a.hash_key(), b.hash_key());
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_content_different_hash() {
        let a = Message::new("hi");
        let b = Message::new("hi!");
        let c = a.with_metadata_entry("role", json!("user"));
        assert_ne!(a.hash_key(), b.hash_key());
        assert_ne!(a.hash_key(), c.hash_key());
    }

    #[test]
    fn test_hash_is_lowercase_hex_sha256() {
        let msg = Message::new("test");
        assert_eq!(msg.hash_key().len(), 64);
        assert!(msg.hash_key().chars().all(|c| c.is_ascii_hexdigit()));
        assert!(msg.hash_key().chars().all(|c| !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_nested_metadata_key_order_does_not_matter() {
        let a = Message::from_json(json!({"text": "x", "extra": {"b": 1, "a": [1, {"d": 2, "c": 3}]}}))
            .unwrap();
        let b = Message::from_json(json!({"extra": {"a": [1, {"c": 3, "d": 2}], "b": 1}, "text": "x"}))
            .unwrap();
        assert_eq!(a.hash_key(), b.hash_key());
    }

    #[test]
    fn test_canonical_json_shape() {
        let msg = Message::from_json(json!({"text": "hi", "z": 1, "a": true})).unwrap();
        assert_eq!(
            msg.canonical_json(),
            r#"{"metadata":{"a":true,"z":1},"text":"hi"}"#
        );
    }

    #[test]
    fn test_with_text_builds_new_message() {
        let original = Message::new("before").with_metadata_entry("k", json!("v"));
        let changed = original.with_text("after");
        assert_eq!(original.text(), "before");
        assert_eq!(changed.text(), "after");
        assert_eq!(changed.meta("k"), Some(&json!("v")));
        assert_ne!(original.hash_key(), changed.hash_key());
    }

    #[test]
    fn test_from_json_string_and_object() {
        let a = Message::from_json(json!("hello")).unwrap();
        assert_eq!(a.text(), "hello");
        assert!(a.metadata().is_empty());

        let b = Message::from_json(json!({"text": "hello", "role": "assistant"})).unwrap();
        assert_eq!(b.text(), "hello");
        assert_eq!(b.meta("role"), Some(&json!("assistant")));

        let c = Message::from_json(json!({"role": "system"})).unwrap();
        assert_eq!(c.text(), "");
    }

    #[test]
    fn test_from_json_rejects_scalars() {
        let err = Message::from_json(json!(42)).unwrap_err();
        assert_eq!(err, MessageError::NotAMessage("number 42".to_string()));

        let err = Message::from_json(json!({"text": 5})).unwrap_err();
        assert!(matches!(err, MessageError::InvalidText(_)));
    }

    #[test]
    fn test_error_message_flag() {
        let msg = Message::error("it broke");
        assert!(msg.is_error());
        assert!(!Message::new("fine").is_error());
    }

    #[test]
    fn test_serde_roundtrip_recomputes_hash() {
        let msg = Message::new("hi").with_metadata_entry("role", json!("user"));
        let json_str = serde_json::to_string(&msg).unwrap();
        assert!(json_str.contains("\"hash_key\""));

        let parsed: Message = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed, msg);

        // A forged hash on input is ignored.
        let forged: Message =
            serde_json::from_str(r#"{"text":"hi","metadata":{"role":"user"},"hash_key":"bogus"}"#)
                .unwrap();
        assert_eq!(forged.hash_key(), msg.hash_key());
    }

    #[test]
    fn test_display_is_text() {
        assert_eq!(Message::new("shown").to_string(), "shown");
    }
}
