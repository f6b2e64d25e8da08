use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use crate::daemon::storage::{entities::StopReason, kv_store::KeyValueStore};

use super::{
    error::EngineError,
    timer_engine::{TimerEngine, TotalQuery},
};

/// One decoded protocol action. The wire form is `{action, payload}` where `action` is one of
/// the colon-separated names below.
#[derive(Debug)]
pub enum Request {
    ProjectCreate { name: String },
    TaskCreate { project_id: String, name: String },
    ProjectRename { project_id: String, new_name: String },
    ProjectArchive { project_id: String, archived: bool },
    TimerStart { project_id: String, task_id: String },
    TimerStop,
    TimerReset,
    TaskAdjust { task_id: String, delta_ms: i64 },
    TotalGet(TotalQuery),
    SnapshotGet,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamePayload {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskCreatePayload {
    project_id: String,
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectRenamePayload {
    project_id: String,
    new_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectArchivePayload {
    project_id: String,
    #[serde(default = "default_archived")]
    archived: bool,
}

fn default_archived() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimerStartPayload {
    project_id: String,
    task_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskAdjustPayload {
    task_id: String,
    delta_ms: i64,
}

impl Request {
    /// Decodes an `{action, payload}` message. An unrecognized action is part of the closed
    /// error set; a malformed payload surfaces through the catch-all path.
    pub fn parse(message: &Value) -> Result<Self, EngineError> {
        let action = message
            .get("action")
            .and_then(Value::as_str)
            .ok_or(EngineError::UnknownAction)?;
        let payload = message
            .get("payload")
            .cloned()
            .unwrap_or_else(|| json!({}));

        fn decode<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T, EngineError> {
            serde_json::from_value(payload).map_err(|e| EngineError::Internal(e.into()))
        }

        Ok(match action {
            "project:create" => {
                let p: NamePayload = decode(payload)?;
                Request::ProjectCreate { name: p.name }
            }
            "task:create" => {
                let p: TaskCreatePayload = decode(payload)?;
                Request::TaskCreate {
                    project_id: p.project_id,
                    name: p.name,
                }
            }
            "project:rename" => {
                let p: ProjectRenamePayload = decode(payload)?;
                Request::ProjectRename {
                    project_id: p.project_id,
                    new_name: p.new_name,
                }
            }
            "project:archive" => {
                let p: ProjectArchivePayload = decode(payload)?;
                Request::ProjectArchive {
                    project_id: p.project_id,
                    archived: p.archived,
                }
            }
            "timer:start" => {
                let p: TimerStartPayload = decode(payload)?;
                Request::TimerStart {
                    project_id: p.project_id,
                    task_id: p.task_id,
                }
            }
            "timer:stop" => Request::TimerStop,
            "timer:reset" => Request::TimerReset,
            "task:adjust" => {
                let p: TaskAdjustPayload = decode(payload)?;
                Request::TaskAdjust {
                    task_id: p.task_id,
                    delta_ms: p.delta_ms,
                }
            }
            "total:get" => Request::TotalGet(decode(payload)?),
            "get:snapshot" => Request::SnapshotGet,
            _ => return Err(EngineError::UnknownAction),
        })
    }
}

/// Runs one message to completion. This entry point never fails: whatever goes wrong inside
/// becomes an `{ok:false, error}` response, the request channel stays alive.
pub async fn handle_message<S: KeyValueStore>(
    engine: &mut TimerEngine<S>,
    message: &Value,
) -> Value {
    let request = match Request::parse(message) {
        Ok(request) => request,
        Err(e) => return failure(&e),
    };
    match dispatch(engine, request).await {
        Ok(response) => response,
        Err(e) => {
            if let EngineError::Internal(fault) = &e {
                error!("Request failed unexpectedly {fault:?}");
            }
            failure(&e)
        }
    }
}

/// Maps one decoded request onto the engine operation behind it.
pub async fn dispatch<S: KeyValueStore>(
    engine: &mut TimerEngine<S>,
    request: Request,
) -> Result<Value, EngineError> {
    Ok(match request {
        Request::ProjectCreate { name } => {
            json!({"ok": true, "project": engine.create_project(&name).await?})
        }
        Request::TaskCreate { project_id, name } => {
            json!({"ok": true, "task": engine.create_task(&project_id, &name).await?})
        }
        Request::ProjectRename {
            project_id,
            new_name,
        } => {
            engine.rename_project(&project_id, &new_name).await?;
            json!({"ok": true})
        }
        Request::ProjectArchive {
            project_id,
            archived,
        } => {
            engine.archive_project(&project_id, archived).await?;
            json!({"ok": true})
        }
        Request::TimerStart {
            project_id,
            task_id,
        } => {
            engine.start_timer(&project_id, &task_id).await?;
            json!({"ok": true})
        }
        Request::TimerStop => {
            let outcome = engine.stop_timer(StopReason::Manual).await?;
            if outcome.skipped {
                json!({"ok": true, "elapsedMs": 0, "skipped": true})
            } else {
                json!({"ok": true, "elapsedMs": outcome.elapsed_ms})
            }
        }
        Request::TimerReset => {
            engine.reset_timer().await?;
            json!({"ok": true})
        }
        Request::TaskAdjust { task_id, delta_ms } => {
            json!({"ok": true, "totalMs": engine.adjust_task_time(&task_id, delta_ms).await?})
        }
        Request::TotalGet(query) => {
            json!({"ok": true, "totalMs": engine.total_ms(&query).await?})
        }
        Request::SnapshotGet => {
            let snapshot = engine.snapshot().await?;
            json!({
                "ok": true,
                "projects": snapshot.projects,
                "tasks": snapshot.tasks,
                "sessions": snapshot.sessions,
                "state": snapshot.state,
            })
        }
    })
}

fn failure(error: &EngineError) -> Value {
    json!({"ok": false, "error": error.code()})
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    use crate::daemon::{
        engine::{
            indicator::LogIndicator,
            timer_engine::{test_support::ManualClock, TimerEngine},
        },
        storage::kv_store::JsonStore,
    };

    use super::handle_message;

    fn test_engine(
        dir: &std::path::Path,
        clock: &ManualClock,
    ) -> Result<TimerEngine<JsonStore>> {
        let store = JsonStore::new(dir.to_owned())?;
        Ok(TimerEngine::new(
            store,
            Box::new(clock.clone()),
            Box::new(LogIndicator),
        ))
    }

    #[tokio::test]
    async fn unknown_actions_are_rejected() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::at_test_start();
        let mut engine = test_engine(dir.path(), &clock)?;

        let response =
            handle_message(&mut engine, &json!({"action": "timer:explode"})).await;
        assert_eq!(response, json!({"ok": false, "error": "unknown_action"}));

        let response = handle_message(&mut engine, &json!({"payload": {}})).await;
        assert_eq!(response, json!({"ok": false, "error": "unknown_action"}));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_payloads_never_escape_as_panics() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::at_test_start();
        let mut engine = test_engine(dir.path(), &clock)?;

        let response = handle_message(
            &mut engine,
            &json!({"action": "project:create", "payload": {"nom": "typo"}}),
        )
        .await;
        assert_eq!(response["ok"], false);
        assert!(response["error"].is_string());
        Ok(())
    }

    #[tokio::test]
    async fn full_action_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::at_test_start();
        let mut engine = test_engine(dir.path(), &clock)?;

        let created = handle_message(
            &mut engine,
            &json!({"action": "project:create", "payload": {"name": "X"}}),
        )
        .await;
        assert_eq!(created["ok"], true);
        let project_id = created["project"]["id"].as_str().unwrap().to_string();

        let task = handle_message(
            &mut engine,
            &json!({"action": "task:create", "payload": {"projectId": &project_id, "name": "extra"}}),
        )
        .await;
        assert_eq!(task["ok"], true);
        let task_id = task["task"]["id"].as_str().unwrap().to_string();

        let started = handle_message(
            &mut engine,
            &json!({"action": "timer:start", "payload": {"projectId": &project_id, "taskId": &task_id}}),
        )
        .await;
        assert_eq!(started, json!({"ok": true}));

        clock.advance_ms(5000);
        // Stop carries no payload at all, like a real caller.
        let stopped = handle_message(&mut engine, &json!({"action": "timer:stop"})).await;
        assert_eq!(stopped, json!({"ok": true, "elapsedMs": 5000}));

        let total = handle_message(
            &mut engine,
            &json!({"action": "total:get", "payload": {"taskId": &task_id}}),
        )
        .await;
        assert_eq!(total, json!({"ok": true, "totalMs": 5000}));

        let adjusted = handle_message(
            &mut engine,
            &json!({"action": "task:adjust", "payload": {"taskId": &task_id, "deltaMs": -1000}}),
        )
        .await;
        assert_eq!(adjusted, json!({"ok": true, "totalMs": 4000}));

        let renamed = handle_message(
            &mut engine,
            &json!({"action": "project:rename", "payload": {"projectId": &project_id, "newName": "Y"}}),
        )
        .await;
        assert_eq!(renamed, json!({"ok": true}));

        let archived = handle_message(
            &mut engine,
            &json!({"action": "project:archive", "payload": {"projectId": &project_id, "archived": true}}),
        )
        .await;
        assert_eq!(archived, json!({"ok": true}));

        let snapshot = handle_message(&mut engine, &json!({"action": "get:snapshot"})).await;
        assert_eq!(snapshot["ok"], true);
        assert_eq!(snapshot["projects"][0]["name"], "Y");
        assert_eq!(snapshot["projects"][0]["archived"], true);
        assert_eq!(snapshot["sessions"].as_array().unwrap().len(), 1);
        assert_eq!(snapshot["state"], json!({"lastSelectedProjectId": project_id}));
        Ok(())
    }

    #[tokio::test]
    async fn short_stop_reports_skipped() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::at_test_start();
        let mut engine = test_engine(dir.path(), &clock)?;

        let created = handle_message(
            &mut engine,
            &json!({"action": "project:create", "payload": {"name": "X"}}),
        )
        .await;
        let project_id = created["project"]["id"].as_str().unwrap();

        let snapshot = handle_message(&mut engine, &json!({"action": "get:snapshot"})).await;
        let task_id = snapshot["tasks"][0]["id"].as_str().unwrap();

        handle_message(
            &mut engine,
            &json!({"action": "timer:start", "payload": {"projectId": project_id, "taskId": task_id}}),
        )
        .await;
        clock.advance_ms(500);
        let stopped = handle_message(&mut engine, &json!({"action": "timer:stop"})).await;
        assert_eq!(
            stopped,
            json!({"ok": true, "elapsedMs": 0, "skipped": true})
        );
        Ok(())
    }

    #[tokio::test]
    async fn engine_failures_become_error_codes() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::at_test_start();
        let mut engine = test_engine(dir.path(), &clock)?;

        let stopped = handle_message(&mut engine, &json!({"action": "timer:stop"})).await;
        assert_eq!(stopped, json!({"ok": false, "error": "not_running"}));

        let renamed = handle_message(
            &mut engine,
            &json!({"action": "project:rename", "payload": {"projectId": "nope", "newName": "x"}}),
        )
        .await;
        assert_eq!(renamed, json!({"ok": false, "error": "project_not_found"}));
        Ok(())
    }

    #[tokio::test]
    async fn archive_defaults_to_true_like_callers_expect() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::at_test_start();
        let mut engine = test_engine(dir.path(), &clock)?;

        let created = handle_message(
            &mut engine,
            &json!({"action": "project:create", "payload": {"name": "X"}}),
        )
        .await;
        let project_id = created["project"]["id"].as_str().unwrap();

        let archived = handle_message(
            &mut engine,
            &json!({"action": "project:archive", "payload": {"projectId": project_id}}),
        )
        .await;
        assert_eq!(archived, json!({"ok": true}));

        let snapshot = handle_message(&mut engine, &json!({"action": "get:snapshot"})).await;
        assert_eq!(snapshot["projects"][0]["archived"], true);
        Ok(())
    }
}
