use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    daemon::storage::{
        entities::{
            new_id, ActiveTimer, CurrentState, Project, Session, Snapshot, StopReason, Task,
        },
        kv_store::{KeyValueStore, StoreKey},
    },
    utils::{clock::Clock, time::clamp_ms},
};

use super::{error::EngineError, indicator::StatusIndicator};

/// Tasks every new project starts with.
pub const DEFAULT_TASK_NAMES: [&str; 4] = ["Typing&BOX", "Char ID", "AG", "Double Check"];

/// Runs shorter than this are treated as accidental taps and discarded without a trace.
pub const MIN_SESSION_MS: u64 = 2000;

/// What [TimerEngine::stop_timer] produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOutcome {
    pub elapsed_ms: u64,
    /// True when the run was below [MIN_SESSION_MS] and nothing was recorded.
    pub skipped: bool,
}

/// Selects which total to compute. An empty query resolves to zero.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TotalQuery {
    pub task_id: Option<String>,
    pub project_id: Option<String>,
}

/// Owns the active-timer lifecycle, project/task bookkeeping and total computation on top of
/// a [KeyValueStore].
///
/// The mutable state record is cached once per process and written through on every mutation.
/// Collections are always read fresh, another process may have changed them in the meantime.
pub struct TimerEngine<S: KeyValueStore> {
    store: S,
    state_cache: Option<CurrentState>,
    clock: Box<dyn Clock>,
    indicator: Box<dyn StatusIndicator>,
}

impl<S: KeyValueStore> TimerEngine<S> {
    pub fn new(store: S, clock: Box<dyn Clock>, indicator: Box<dyn StatusIndicator>) -> Self {
        Self {
            store,
            state_cache: None,
            clock,
            indicator,
        }
    }

    async fn load_state(&mut self) -> Result<CurrentState, EngineError> {
        match &self.state_cache {
            Some(state) => Ok(state.clone()),
            None => {
                let state: CurrentState =
                    self.store.get(StoreKey::State).await?.unwrap_or_default();
                self.state_cache = Some(state.clone());
                Ok(state)
            }
        }
    }

    async fn save_state(&mut self, state: CurrentState) -> Result<(), EngineError> {
        self.store.set(StoreKey::State, &state).await?;
        self.state_cache = Some(state);
        Ok(())
    }

    async fn collection<T: DeserializeOwned + Send>(
        &self,
        key: StoreKey,
    ) -> Result<Vec<T>, EngineError> {
        Ok(self.store.get(key).await?.unwrap_or_default())
    }

    /// Starts the single active timer. The target project and task must exist: a timer must
    /// never reference entities the store does not know.
    pub async fn start_timer(
        &mut self,
        project_id: &str,
        task_id: &str,
    ) -> Result<(), EngineError> {
        let mut state = self.load_state().await?;
        if state.active.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let projects: Vec<Project> = self.collection(StoreKey::Projects).await?;
        if !projects.iter().any(|p| p.id == project_id) {
            return Err(EngineError::ProjectNotFound);
        }
        let tasks: Vec<Task> = self.collection(StoreKey::Tasks).await?;
        if !tasks.iter().any(|t| t.id == task_id) {
            return Err(EngineError::TaskNotFound);
        }

        state.active = Some(ActiveTimer {
            project_id: project_id.to_string(),
            task_id: task_id.to_string(),
            started_at: self.clock.time(),
            carried_ms: 0,
        });
        state.last_selected_project_id = Some(project_id.to_string());
        self.save_state(state).await?;
        self.indicator.set_running(true);
        Ok(())
    }

    /// Stops the active timer. A run below [MIN_SESSION_MS] is discarded entirely: no session,
    /// no total change, the timer is simply cleared.
    pub async fn stop_timer(&mut self, reason: StopReason) -> Result<StopOutcome, EngineError> {
        let mut state = self.load_state().await?;
        let Some(active) = state.active.take() else {
            return Err(EngineError::NotRunning);
        };

        let now = self.clock.time();
        let wall_ms = (now - active.started_at).num_milliseconds();
        let elapsed_ms = clamp_ms(active.carried_ms as i64 + wall_ms);

        if elapsed_ms < MIN_SESSION_MS {
            debug!("Discarding {elapsed_ms}ms run as an accidental tap");
            self.save_state(state).await?;
            self.indicator.set_running(false);
            return Ok(StopOutcome {
                elapsed_ms: 0,
                skipped: true,
            });
        }

        self.store
            .append(
                StoreKey::Sessions,
                Session {
                    id: new_id(),
                    project_id: active.project_id.clone(),
                    task_id: active.task_id.clone(),
                    start_at: active.started_at,
                    end_at: now,
                    elapsed_ms,
                    reason,
                    manual_adjusted_ms: None,
                },
            )
            .await?;

        self.store
            .update(StoreKey::Tasks, |tasks: &mut Vec<Task>| {
                if let Some(task) = tasks.iter_mut().find(|t| t.id == active.task_id) {
                    task.total_ms = task.total_ms.saturating_add(elapsed_ms);
                }
            })
            .await?;

        self.save_state(state).await?;
        self.indicator.set_running(false);
        Ok(StopOutcome {
            elapsed_ms,
            skipped: false,
        })
    }

    /// Abandons the elapsed time of the current run without recording anything. The timer
    /// keeps running from a fresh start point.
    pub async fn reset_timer(&mut self) -> Result<(), EngineError> {
        let mut state = self.load_state().await?;
        let Some(active) = state.active.as_mut() else {
            return Err(EngineError::NotRunning);
        };
        active.carried_ms = 0;
        active.started_at = self.clock.time();
        self.save_state(state).await?;
        Ok(())
    }

    /// Creates a project together with its default task set. The tasks are a side effect,
    /// only the project is returned.
    pub async fn create_project(&mut self, name: &str) -> Result<Project, EngineError> {
        let project = Project {
            id: new_id(),
            name: name.to_string(),
            created_at: self.clock.time(),
            archived: false,
        };
        self.store
            .append(StoreKey::Projects, project.clone())
            .await?;
        for task_name in DEFAULT_TASK_NAMES {
            self.create_task(&project.id, task_name).await?;
        }
        Ok(project)
    }

    /// Duplicate (project, name) pairs are allowed, names are labels rather than keys.
    pub async fn create_task(&mut self, project_id: &str, name: &str) -> Result<Task, EngineError> {
        let task = Task {
            id: new_id(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            total_ms: 0,
        };
        self.store.append(StoreKey::Tasks, task.clone()).await?;
        Ok(task)
    }

    pub async fn rename_project(
        &mut self,
        project_id: &str,
        new_name: &str,
    ) -> Result<(), EngineError> {
        self.mutate_project(project_id, |p| p.name = new_name.to_string())
            .await
    }

    /// Archived projects drop out of active-selection lists but are never deleted, so task
    /// and session references can't dangle.
    pub async fn archive_project(
        &mut self,
        project_id: &str,
        archived: bool,
    ) -> Result<(), EngineError> {
        self.mutate_project(project_id, |p| p.archived = archived)
            .await
    }

    async fn mutate_project(
        &mut self,
        project_id: &str,
        apply: impl FnOnce(&mut Project) + Send,
    ) -> Result<(), EngineError> {
        let found = self
            .store
            .update(StoreKey::Projects, |projects: &mut Vec<Project>| {
                match projects.iter_mut().find(|p| p.id == project_id) {
                    Some(project) => {
                        apply(project);
                        true
                    }
                    None => false,
                }
            })
            .await?;
        if found {
            Ok(())
        } else {
            Err(EngineError::ProjectNotFound)
        }
    }

    /// Applies a signed correction to a task total, floored at zero. When the task has
    /// recorded sessions the correction is also noted on the chronologically latest one
    /// (greatest end time) as an audit trail.
    pub async fn adjust_task_time(
        &mut self,
        task_id: &str,
        delta_ms: i64,
    ) -> Result<u64, EngineError> {
        let new_total = self
            .store
            .update(StoreKey::Tasks, |tasks: &mut Vec<Task>| {
                tasks.iter_mut().find(|t| t.id == task_id).map(|task| {
                    task.total_ms = clamp_ms(task.total_ms as i64 + delta_ms);
                    task.total_ms
                })
            })
            .await?;
        let Some(new_total) = new_total else {
            return Err(EngineError::TaskNotFound);
        };

        self.store
            .update(StoreKey::Sessions, |sessions: &mut Vec<Session>| {
                let latest = sessions
                    .iter_mut()
                    .filter(|s| s.task_id == task_id)
                    .max_by_key(|s| s.end_at);
                if let Some(session) = latest {
                    session.manual_adjusted_ms =
                        Some(session.manual_adjusted_ms.unwrap_or(0) + delta_ms);
                }
            })
            .await?;

        Ok(new_total)
    }

    /// Pure read. A task id wins over a project id; an empty query is zero.
    pub async fn total_ms(&self, query: &TotalQuery) -> Result<u64, EngineError> {
        let tasks: Vec<Task> = self.collection(StoreKey::Tasks).await?;
        if let Some(task_id) = &query.task_id {
            return Ok(tasks
                .iter()
                .find(|t| &t.id == task_id)
                .map(|t| t.total_ms)
                .unwrap_or(0));
        }
        if let Some(project_id) = &query.project_id {
            return Ok(tasks
                .iter()
                .filter(|t| &t.project_id == project_id)
                .map(|t| t.total_ms)
                .sum());
        }
        Ok(0)
    }

    /// Full read of all four records. No mutation, the UI renders from this.
    pub async fn snapshot(&mut self) -> Result<Snapshot, EngineError> {
        let projects = self.collection(StoreKey::Projects).await?;
        let tasks = self.collection(StoreKey::Tasks).await?;
        let sessions = self.collection(StoreKey::Sessions).await?;
        let state = self.load_state().await?;
        Ok(Snapshot {
            projects,
            tasks,
            sessions,
            state,
        })
    }

    /// Reloads the persisted state and re-signals the indicator. Runs on startup so the badge
    /// matches whatever survived the restart; mutates nothing.
    pub async fn refresh_indicator(&mut self) -> Result<(), EngineError> {
        let state = self.load_state().await?;
        self.indicator.set_running(state.active.is_some());
        Ok(())
    }

    /// Writes the cached state back out. Runs when the process is about to suspend.
    pub async fn persist_state(&mut self) -> Result<(), EngineError> {
        let state = self.load_state().await?;
        self.save_state(state).await
    }

    /// First-run convenience so the selection UI never faces an empty store.
    pub async fn ensure_seed_project(&mut self) -> Result<(), EngineError> {
        let projects: Vec<Project> = self.collection(StoreKey::Projects).await?;
        if projects.is_empty() {
            self.create_project("test_1").await?;
        }
        Ok(())
    }
}
