use thiserror::Error;

/// Failures the engine reports to callers. The set is closed: every expected variant maps to
/// a stable snake_case code on the wire, and none of them is fatal to the process.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("a timer is already running")]
    AlreadyRunning,
    #[error("no timer is running")]
    NotRunning,
    #[error("project does not exist")]
    ProjectNotFound,
    #[error("task does not exist")]
    TaskNotFound,
    #[error("unknown action")]
    UnknownAction,
    /// Anything unexpected (storage faults, malformed payloads). Surfaced stringified instead
    /// of crashing the request channel.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// The code callers see in an `{ok:false, error}` response.
    pub fn code(&self) -> String {
        match self {
            EngineError::AlreadyRunning => "already_running".into(),
            EngineError::NotRunning => "not_running".into(),
            EngineError::ProjectNotFound => "project_not_found".into(),
            EngineError::TaskNotFound => "task_not_found".into(),
            EngineError::UnknownAction => "unknown_action".into(),
            EngineError::Internal(e) => e.to_string(),
        }
    }
}
