//! Translation between stored documents and `Note` records.
//!
//! # Responsibility
//! - Render a note as the exact field map written to the store.
//! - Parse stored documents strictly (one-shot reads) or tolerantly
//!   (live snapshots).
//!
//! # Invariants
//! - Field names are `id|title|content|importance|timestamp`, case-sensitive.
//! - Strict parsing rejects a document on the first missing or mistyped field.
//! - Tolerant parsing never fails; every bad field falls back to its default.

use crate::model::note::{Importance, Note, NoteId, DEFAULT_CONTENT, DEFAULT_TITLE};
use crate::store::{Document, Fields};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const FIELD_ID: &str = "id";
pub const FIELD_TITLE: &str = "title";
pub const FIELD_CONTENT: &str = "content";
pub const FIELD_IMPORTANCE: &str = "importance";
pub const FIELD_TIMESTAMP: &str = "timestamp";

/// Strict document parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteParseError {
    MissingField(&'static str),
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    UnknownImportance(String),
}

impl Display for NoteParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing field `{field}`"),
            Self::WrongType { field, expected } => {
                write!(f, "field `{field}` is not {expected}")
            }
            Self::UnknownImportance(value) => write!(f, "unknown importance `{value}`"),
        }
    }
}

impl Error for NoteParseError {}

/// Renders the full field map for one note.
pub fn note_to_fields(note: &Note) -> Fields {
    let mut fields = Fields::new();
    fields.insert(FIELD_ID.to_string(), Value::from(note.id));
    fields.insert(FIELD_TITLE.to_string(), Value::from(note.title.as_str()));
    fields.insert(FIELD_CONTENT.to_string(), Value::from(note.content.as_str()));
    fields.insert(
        FIELD_IMPORTANCE.to_string(),
        Value::from(note.importance.as_str()),
    );
    fields.insert(FIELD_TIMESTAMP.to_string(), Value::from(note.timestamp));
    fields
}

/// Parses one document, rejecting it on any missing or mistyped field.
pub fn parse_note_strict(document: &Document) -> Result<Note, NoteParseError> {
    let fields = &document.fields;
    let id = require_i64(fields, FIELD_ID)?;
    let title = require_str(fields, FIELD_TITLE)?.to_string();
    let content = require_str(fields, FIELD_CONTENT)?.to_string();
    let importance_text = require_str(fields, FIELD_IMPORTANCE)?;
    let importance = importance_text
        .parse::<Importance>()
        .map_err(|_| NoteParseError::UnknownImportance(importance_text.to_string()))?;
    let timestamp = require_i64(fields, FIELD_TIMESTAMP)?;

    Ok(Note {
        id,
        title,
        content,
        importance,
        timestamp,
    })
}

/// Parses one document, substituting defaults for bad fields.
///
/// Defaults: id `0`, title/content placeholders, importance `MEDIUM`
/// (also for unrecognised text), timestamp `fallback_timestamp`.
pub fn parse_note_lenient(document: &Document, fallback_timestamp: i64) -> Note {
    let fields = &document.fields;
    let id: NoteId = fields.get(FIELD_ID).and_then(Value::as_i64).unwrap_or(0);
    let title = fields
        .get(FIELD_TITLE)
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_TITLE)
        .to_string();
    let content = fields
        .get(FIELD_CONTENT)
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_CONTENT)
        .to_string();
    let importance = fields
        .get(FIELD_IMPORTANCE)
        .and_then(Value::as_str)
        .and_then(|value| value.parse::<Importance>().ok())
        .unwrap_or_default();
    let timestamp = fields
        .get(FIELD_TIMESTAMP)
        .and_then(Value::as_i64)
        .unwrap_or(fallback_timestamp);

    Note {
        id,
        title,
        content,
        importance,
        timestamp,
    }
}

fn require_i64(fields: &Fields, field: &'static str) -> Result<i64, NoteParseError> {
    fields
        .get(field)
        .ok_or(NoteParseError::MissingField(field))?
        .as_i64()
        .ok_or(NoteParseError::WrongType {
            field,
            expected: "an integer",
        })
}

fn require_str<'a>(fields: &'a Fields, field: &'static str) -> Result<&'a str, NoteParseError> {
    fields
        .get(field)
        .ok_or(NoteParseError::MissingField(field))?
        .as_str()
        .ok_or(NoteParseError::WrongType {
            field,
            expected: "a string",
        })
}

#[cfg(test)]
mod tests {
    use super::{note_to_fields, parse_note_lenient, parse_note_strict, NoteParseError};
    use crate::model::note::{Importance, Note, DEFAULT_CONTENT, DEFAULT_TITLE};
    use crate::store::Document;
    use serde_json::json;

    fn document(key: &str, value: serde_json::Value) -> Document {
        match value {
            serde_json::Value::Object(fields) => Document::new(key, fields),
            other => panic!("test document must be an object, got {other}"),
        }
    }

    #[test]
    fn fields_use_wire_names_and_text_importance() {
        let note = Note {
            id: 7,
            title: "Car Maintenance".to_string(),
            content: "Oil change".to_string(),
            importance: Importance::High,
            timestamp: 1_731_320_100_000,
        };
        let fields = note_to_fields(&note);
        assert_eq!(
            serde_json::Value::Object(fields),
            json!({
                "id": 7,
                "title": "Car Maintenance",
                "content": "Oil change",
                "importance": "HIGH",
                "timestamp": 1_731_320_100_000_i64,
            })
        );
    }

    #[test]
    fn strict_parse_rejects_missing_and_mistyped_fields() {
        let missing = document("1", json!({"id": 1, "title": "t", "importance": "LOW", "timestamp": 5}));
        assert_eq!(
            parse_note_strict(&missing).unwrap_err(),
            NoteParseError::MissingField("content")
        );

        let float_id = document(
            "1",
            json!({"id": 1.5, "title": "t", "content": "c", "importance": "LOW", "timestamp": 5}),
        );
        assert!(matches!(
            parse_note_strict(&float_id).unwrap_err(),
            NoteParseError::WrongType { field: "id", .. }
        ));

        let bad_importance = document(
            "1",
            json!({"id": 1, "title": "t", "content": "c", "importance": "someday", "timestamp": 5}),
        );
        assert_eq!(
            parse_note_strict(&bad_importance).unwrap_err(),
            NoteParseError::UnknownImportance("someday".to_string())
        );
    }

    #[test]
    fn lenient_parse_substitutes_defaults() {
        let sparse = document("3", json!({"title": 12, "importance": "nope"}));
        let note = parse_note_lenient(&sparse, 99);
        assert_eq!(note.id, 0);
        assert_eq!(note.title, DEFAULT_TITLE);
        assert_eq!(note.content, DEFAULT_CONTENT);
        assert_eq!(note.importance, Importance::Medium);
        assert_eq!(note.timestamp, 99);
    }

    #[test]
    fn lenient_parse_keeps_valid_fields() {
        let full = document(
            "2",
            json!({"id": 2, "title": "t", "content": "c", "importance": "URGENT", "timestamp": 100}),
        );
        let note = parse_note_lenient(&full, 0);
        assert_eq!(note, parse_note_strict(&full).unwrap());
    }
}
