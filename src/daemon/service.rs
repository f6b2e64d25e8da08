use anyhow::Result;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::daemon::{
    engine::{error::EngineError, protocol, timer_engine::TimerEngine},
    storage::{entities::StopReason, kv_store::KeyValueStore},
};

/// Work items for the engine loop.
pub enum Command {
    /// The host reported an idle or locked transition.
    AutoStop,
    /// A protocol message, answered through the oneshot.
    Message {
        body: Value,
        reply: oneshot::Sender<Value>,
    },
}

/// Drains the command channel one item at a time. Strictly sequential processing is what
/// makes the running/not-running checks race free inside a process; the shared store covers
/// the rest.
pub struct EngineService<S: KeyValueStore> {
    receiver: mpsc::Receiver<Command>,
    engine: TimerEngine<S>,
}

impl<S: KeyValueStore> EngineService<S> {
    pub fn new(receiver: mpsc::Receiver<Command>, engine: TimerEngine<S>) -> Self {
        Self { receiver, engine }
    }

    /// Runs until every sender is gone, then persists the current state.
    pub async fn run(mut self) -> Result<()> {
        while let Some(command) = self.receiver.recv().await {
            match command {
                Command::AutoStop => match self.engine.stop_timer(StopReason::Auto).await {
                    Ok(outcome) if !outcome.skipped => {
                        info!("Auto stopped a running timer after {}ms", outcome.elapsed_ms)
                    }
                    Ok(_) => debug!("Auto stop discarded a sub-threshold run"),
                    // Nothing was running, nothing to stop.
                    Err(EngineError::NotRunning) => {}
                    Err(e) => error!("Failed to auto stop {e:?}"),
                },
                Command::Message { body, reply } => {
                    let response = protocol::handle_message(&mut self.engine, &body).await;
                    // The requester may be gone by now, that only cancels the reply.
                    let _ = reply.send(response);
                }
            }
        }
        self.finalize().await
    }

    async fn finalize(&mut self) -> Result<()> {
        self.engine.persist_state().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use serde_json::json;
    use tempfile::tempdir;
    use tokio::sync::{mpsc, oneshot};

    use crate::daemon::{
        engine::{
            indicator::LogIndicator,
            timer_engine::{test_support::ManualClock, TimerEngine},
        },
        storage::{
            entities::{Session, StopReason},
            kv_store::{JsonStore, KeyValueStore, StoreKey},
        },
    };

    use super::{Command, EngineService};

    fn engine_over(
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
    async fn auto_stop_records_an_auto_session() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::at_test_start();

        let mut setup = engine_over(dir.path(), &clock)?;
        let project = setup.create_project("X").await?;
        let task_id = setup.snapshot().await?.tasks[0].id.clone();
        setup.start_timer(&project.id, &task_id).await?;
        drop(setup);

        clock.advance_ms(90_000);

        let (sender, receiver) = mpsc::channel::<Command>(10);
        let service = EngineService::new(receiver, engine_over(dir.path(), &clock)?);
        sender.send(Command::AutoStop).await?;
        // A second auto stop with nothing running must be a no-op, not an error.
        sender.send(Command::AutoStop).await?;
        drop(sender);
        service.run().await?;

        let store = JsonStore::new(dir.path().to_owned())?;
        let sessions: Vec<Session> = store.get(StoreKey::Sessions).await?.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].reason, StopReason::Auto);
        assert_eq!(sessions[0].elapsed_ms, 90_000);
        Ok(())
    }

    #[tokio::test]
    async fn messages_are_answered_through_the_reply_channel() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::at_test_start();

        let (sender, receiver) = mpsc::channel::<Command>(10);
        let service = EngineService::new(receiver, engine_over(dir.path(), &clock)?);

        let (reply, response) = oneshot::channel();
        sender
            .send(Command::Message {
                body: json!({"action": "project:create", "payload": {"name": "inbox"}}),
                reply,
            })
            .await?;
        drop(sender);

        let (run_result, response) = tokio::join!(service.run(), response);
        run_result?;
        let response = response?;
        assert_eq!(response["ok"], true);
        assert_eq!(response["project"]["name"], "inbox");
        Ok(())
    }
}
