//! The `Record` trait and the index value types stored alongside each record.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Current Unix time in milliseconds.
///
/// Centralized here so every timestamp in the system (record creation,
/// updates, snapshots) goes through the same clock.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A value that can be stored in a secondary index and compared by `Filter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum IndexValue {
    String(String),
    Int(i64),
    Bool(bool),
}

impl IndexValue {
    /// Render the value as the text stored in the SQLite index column.
    pub fn as_sql_text(&self) -> String {
        match self {
            IndexValue::String(s) => s.clone(),
            IndexValue::Int(i) => i.to_string(),
            IndexValue::Bool(b) => b.to_string(),
        }
    }
}

impl std::fmt::Display for IndexValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_sql_text())
    }
}

/// A type that can be persisted in a `Store`.
///
/// Implementors are plain serde-serializable structs; `Store` handles the
/// JSON encoding, the SQLite-backed index, and the JSONL append log.
pub trait Record: Serialize + for<'de> Deserialize<'de> + Clone + Send + Sync + 'static {
    /// Unique, stable identifier for this record.
    fn id(&self) -> &str;

    /// Last-modified timestamp, in Unix milliseconds. Used to resolve
    /// concurrent writes (last-write-wins by `updated_at`) during `rebuild_indexes`.
    fn updated_at(&self) -> i64;

    /// Name of the on-disk collection (SQLite table / JSONL file stem) this
    /// record type lives in. Distinct record types must return distinct names.
    fn collection_name() -> &'static str;

    /// Fields to mirror into the secondary index for `Store::list` filtering.
    /// Only fields returned here are queryable; everything else lives only
    /// in the record's JSON blob.
    fn indexed_fields(&self) -> HashMap<String, IndexValue>;
}
