//! Run state document layout.
//!
//! The run state is a flat JSON object. The scheduler reads and writes the
//! keys below; anything else a caller saves is carried along untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A flat key-value snapshot of the run state.
pub type Document = Map<String, Value>;

/// Number of prior snapshots kept in `history`.
pub const HISTORY_CAPACITY: usize = 10;

pub mod keys {
    pub const COMPLETED_TEAMS: &str = "completed_teams";
    pub const FAILED_TEAMS: &str = "failed_teams";
    pub const TEAM_ERRORS: &str = "team_errors";
    pub const LAST_ERROR: &str = "last_error";
    pub const FAILED_TEAM: &str = "failed_team";
    pub const CHECKPOINT_NAME: &str = "checkpoint_name";
    pub const ROLLBACK_PHASE: &str = "rollback_phase";
    pub const CURRENT_PHASE: &str = "current_phase";
    pub const RUN_ID: &str = "run_id";
    pub const TIMESTAMP: &str = "timestamp";
    pub const VERSION: &str = "version";
}

/// On-disk layout: `{ "current": {...}, "history": [...] }`, replaced
/// wholesale on every write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(default)]
    pub current: Document,
    #[serde(default)]
    pub history: Vec<Document>,
}

/// Progress summary read from the current document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Progress {
    pub completed_teams: Vec<String>,
    pub failed_teams: Vec<String>,
    pub current_phase: Option<u32>,
    pub last_update: Option<String>,
}

/// Read a list of ids. Non-string entries are skipped.
pub fn string_list(document: &Document, key: &str) -> Vec<String> {
    document
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

pub fn string_value(document: &Document, key: &str) -> Option<String> {
    document.get(key).and_then(Value::as_str).map(str::to_string)
}

pub fn phase_value(document: &Document, key: &str) -> Option<u32> {
    document
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
}

pub fn list_value<I, S>(ids: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Value::Array(ids.into_iter().map(|s| Value::String(s.into())).collect())
}
