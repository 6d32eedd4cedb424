use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of a navigation entry.
///
/// Generated once when the entry is created and never reused, so two
/// entries with the same key are the same logical position in history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryKey(String);

impl EntryKey {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntryKey {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for EntryKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Structured location of an entry, before the path codec turns it into a URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segments {
    pub path: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub query: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub basename: String,
}

impl Segments {
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = hash.into();
        self
    }

    pub fn with_basename(mut self, basename: impl Into<String>) -> Self {
        self.basename = basename.into();
        self
    }
}

/// Application-owned state attached to an entry. Round-tripped verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryState(pub serde_json::Value);

impl EntryState {
    pub fn is_empty(&self) -> bool {
        self.0.is_null()
    }
}

impl From<serde_json::Value> for EntryState {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// One logical position in the navigation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub key: EntryKey,
    pub segments: Segments,
    #[serde(default)]
    pub state: EntryState,
    /// Position inside the owning stack; rewritten by every stack mutation.
    #[serde(default)]
    pub index: usize,
}

impl Entry {
    /// Fresh entry with a newly generated key.
    pub fn new(segments: Segments, state: EntryState) -> Self {
        Self {
            key: EntryKey::generate(),
            segments,
            state,
            index: 0,
        }
    }

    pub fn with_key(key: EntryKey, segments: Segments, state: EntryState) -> Self {
        Self {
            key,
            segments,
            state,
            index: 0,
        }
    }

    pub fn at_path(path: impl Into<String>) -> Self {
        Self::new(Segments::path(path), EntryState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_unique() {
        let a = Entry::at_path("/a");
        let b = Entry::at_path("/a");
        assert_ne!(a.key, b.key);
        assert_eq!(a.segments, b.segments);
    }

    #[test]
    fn state_survives_cbor_verbatim() {
        let state = EntryState(serde_json::json!({ "scroll": 120, "tab": "details" }));
        let entry = Entry::new(Segments::path("/orders/7").with_query("page", "2"), state.clone());
        let bytes = waypoint_cbor::to_canonical_cbor(&entry).unwrap();
        let back: Entry = waypoint_cbor::from_cbor(&bytes).unwrap();
        assert_eq!(back.state, state);
        assert_eq!(back.segments.query.get("page").map(String::as_str), Some("2"));
    }
}
