use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use engine::{
    indicator::{LogIndicator, StatusIndicator},
    timer_engine::TimerEngine,
};
use idle::{evaluator::IdleEvaluator, monitor::IdleMonitor};
use service::{Command, EngineService};
use storage::kv_store::JsonStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::{
    host_api::{GenericIdleProbe, IdleProbe},
    utils::clock::{Clock, DefaultClock},
};

pub mod args;
pub mod engine;
pub mod idle;
pub mod service;
pub mod shutdown;
pub mod stdio;
pub mod storage;

/// How long the user must be inactive before a running timer is auto stopped.
const IDLE_THRESHOLD_SECONDS: u64 = 60;
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf) -> Result<()> {
    std::env::set_current_dir("/")?;

    let probe = GenericIdleProbe::new()?;
    run_daemon(dir, probe, DefaultClock, Box::new(LogIndicator)).await
}

/// Wiring separated from [start_daemon] so tests can inject the probe, the clock and the
/// indicator.
async fn run_daemon(
    dir: PathBuf,
    probe: impl IdleProbe,
    clock: impl Clock + Clone,
    indicator: Box<dyn StatusIndicator>,
) -> Result<()> {
    let mut engine = create_engine(&dir, Box::new(clock.clone()), indicator)?;

    // Startup hooks: reflect whatever state survived the restart and make sure the selection
    // UI never faces an empty store.
    engine.refresh_indicator().await?;
    engine.ensure_seed_project().await?;

    let (sender, receiver) = mpsc::channel::<Command>(10);
    let shutdown_token = CancellationToken::new();

    let monitor = create_monitor(sender.clone(), probe, &shutdown_token, clock);
    let service = EngineService::new(receiver, engine);

    let (_, stdio_result, monitor_result, service_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        stdio::serve_stdio(sender, shutdown_token.clone()),
        monitor.run(),
        service.run(),
    );

    if let Err(stdio_result) = stdio_result {
        error!("Protocol server got an error {:?}", stdio_result);
    }

    if let Err(monitor_result) = monitor_result {
        error!("Idle monitor got an error {:?}", monitor_result);
    }

    if let Err(service_result) = service_result {
        error!("Engine service got an error {:?}", service_result);
    }

    Ok(())
}

pub fn create_engine(
    dir: &std::path::Path,
    clock: Box<dyn Clock>,
    indicator: Box<dyn StatusIndicator>,
) -> Result<TimerEngine<JsonStore>> {
    let store = JsonStore::new(dir.join("records"))?;
    Ok(TimerEngine::new(store, clock, indicator))
}

fn create_monitor(
    sender: mpsc::Sender<Command>,
    probe: impl IdleProbe,
    shutdown_token: &CancellationToken,
    clock: impl Clock,
) -> IdleMonitor {
    IdleMonitor::new(
        sender,
        Box::new(probe),
        shutdown_token.clone(),
        IdleEvaluator::from_seconds(IDLE_THRESHOLD_SECONDS),
        IDLE_POLL_INTERVAL,
        Box::new(clock),
    )
}

#[cfg(test)]
mod daemon_tests {
    use std::time::Duration;

    use anyhow::Result;
    use tempfile::tempdir;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{
        daemon::{
            create_engine, create_monitor,
            engine::{indicator::LogIndicator, timer_engine::test_support::ManualClock},
            service::{Command, EngineService},
            storage::{
                entities::{Session, StopReason},
                kv_store::{JsonStore, KeyValueStore, StoreKey},
            },
        },
        host_api::MockIdleProbe,
        utils::logging::TEST_LOGGING,
    };

    /// Very simple smoke test to check that a walkaway converts a running timer into an auto
    /// session end to end.
    #[tokio::test(start_paused = true)]
    async fn walkaway_auto_stops_the_running_timer() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let clock = ManualClock::at_test_start();

        let mut setup = create_engine(
            dir.path(),
            Box::new(clock.clone()),
            Box::new(LogIndicator),
        )?;
        setup.ensure_seed_project().await?;
        let snapshot = setup.snapshot().await?;
        let project_id = snapshot.projects[0].id.clone();
        let task_id = snapshot.tasks[0].id.clone();
        setup.start_timer(&project_id, &task_id).await?;
        drop(setup);

        let mut probe = MockIdleProbe::new();
        let probe_clock = clock.clone();
        let mut samples = [0u64, 0, 0, 120_000].into_iter();
        probe.expect_idle_ms().returning(move || {
            // Wall time moves with every poll, like a real second-by-second loop.
            probe_clock.advance_ms(1000);
            Ok(samples.next().unwrap_or(120_000))
        });

        let shutdown_token = CancellationToken::new();
        let (sender, receiver) = mpsc::channel::<Command>(10);

        let monitor = create_monitor(sender, probe, &shutdown_token, clock.clone());
        let service = EngineService::new(
            receiver,
            create_engine(dir.path(), Box::new(clock.clone()), Box::new(LogIndicator))?,
        );

        let (_, monitor_result, service_result) = tokio::join!(
            async {
                tokio::time::sleep(Duration::from_millis(6500)).await;
                shutdown_token.cancel()
            },
            monitor.run(),
            service.run(),
        );
        monitor_result?;
        service_result?;

        let store = JsonStore::new(dir.path().join("records"))?;
        let sessions: Vec<Session> = store.get(StoreKey::Sessions).await?.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].reason, StopReason::Auto);
        assert!(sessions[0].elapsed_ms >= 2000);

        let state: crate::daemon::storage::entities::CurrentState =
            store.get(StoreKey::State).await?.unwrap();
        assert!(state.active.is_none());
        Ok(())
    }
}
