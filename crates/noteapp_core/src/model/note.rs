//! Note domain model.
//!
//! # Responsibility
//! - Define the note record shared by the repository, the store codec and
//!   front ends.
//! - Own the field defaults applied when a stored document is incomplete.
//!
//! # Invariants
//! - `id` is assigned by the repository, never by the store.
//! - `timestamp` is epoch milliseconds of the last full write.
//! - `Importance` travels over the wire as its upper-case name.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Repository-assigned note identifier.
pub type NoteId = i64;

/// Title used when a stored document carries none.
pub const DEFAULT_TITLE: &str = "Untitled Note";
/// Content used when a stored document carries none.
pub const DEFAULT_CONTENT: &str = "No content available";

/// Note priority, ordered from least to most pressing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Importance {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Importance {
    /// All variants in ascending order.
    pub const ALL: [Importance; 4] = [
        Importance::Low,
        Importance::Medium,
        Importance::High,
        Importance::Urgent,
    ];

    /// Wire/display name (`LOW|MEDIUM|HIGH|URGENT`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Urgent => "URGENT",
        }
    }
}

impl Display for Importance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected importance text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownImportance(pub String);

impl Display for UnknownImportance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown importance `{}`; expected LOW|MEDIUM|HIGH|URGENT",
            self.0
        )
    }
}

impl Error for UnknownImportance {}

impl FromStr for Importance {
    type Err = UnknownImportance;

    /// Exact, case-sensitive match against the wire names.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|importance| importance.as_str() == value)
            .ok_or_else(|| UnknownImportance(value.to_string()))
    }
}

/// Immutable note value record.
///
/// Field names match the stored document fields one to one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub importance: Importance,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
}

impl Note {
    /// Builds a note stamped with the current time.
    pub fn new(
        id: NoteId,
        title: impl Into<String>,
        content: impl Into<String>,
        importance: Importance,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            content: content.into(),
            importance,
            timestamp: now_millis(),
        }
    }

    /// Document key under which this note is stored.
    pub fn document_key(&self) -> String {
        document_key(self.id)
    }
}

impl Default for Note {
    fn default() -> Self {
        Self::new(0, DEFAULT_TITLE, DEFAULT_CONTENT, Importance::default())
    }
}

/// Renders a note id as its decimal document key.
pub fn document_key(id: NoteId) -> String {
    id.to_string()
}

/// Current wall-clock time in epoch milliseconds.
///
/// Clocks set before the epoch read as `0`.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
