use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Generates the opaque ids projects, tasks and sessions are keyed by. Uniqueness is all that
/// matters, callers never parse these.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string().to_uppercase()
}

/// A top-level unit of tracked work. Projects are never deleted, archiving only hides them
/// from active-selection lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    pub archived: bool,
}

/// A named sub-unit of a project accumulating tracked duration. `total_ms` is mutated only by
/// session completion or an explicit adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub total_ms: u64,
}

/// What ended a timer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    Manual,
    Auto,
}

/// Record of one completed timer run. Immutable once written, except for
/// `manual_adjusted_ms` which accumulates corrections attributed to this session afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub project_id: String,
    pub task_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub end_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub reason: StopReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_adjusted_ms: Option<i64>,
}

/// The in-progress timer. At most one exists system wide, persisted inside [CurrentState] so
/// it survives restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTimer {
    pub project_id: String,
    pub task_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    /// Duration already accumulated toward this run before its most recent start.
    pub carried_ms: u64,
}

/// The single mutable record of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<ActiveTimer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_selected_project_id: Option<String>,
}

/// Full view of all four records, for the UI layer to render from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub projects: Vec<Project>,
    pub tasks: Vec<Task>,
    pub sessions: Vec<Session>,
    pub state: CurrentState,
}
