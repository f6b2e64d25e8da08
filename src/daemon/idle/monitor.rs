use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::{daemon::service::Command, host_api::IdleProbe, utils::clock::Clock};

use super::evaluator::IdleEvaluator;

/// Watches the host idle probe and reports the moment the user walks away or the host locks.
/// This feeds the only implicit state transition in the system: auto-stopping a running
/// timer.
pub struct IdleMonitor {
    next: mpsc::Sender<Command>,
    producer: Box<dyn IdleProbe>,
    shutdown: CancellationToken,
    evaluator: IdleEvaluator,
    poll_frequency: Duration,
    time_provider: Box<dyn Clock>,
    was_idle: bool,
}

impl IdleMonitor {
    pub fn new(
        next: mpsc::Sender<Command>,
        producer: Box<dyn IdleProbe>,
        shutdown: CancellationToken,
        evaluator: IdleEvaluator,
        poll_frequency: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            producer,
            shutdown,
            evaluator,
            poll_frequency,
            time_provider,
            was_idle: false,
        }
    }

    /// Executes the monitor event loop.
    pub async fn run(mut self) -> Result<()> {
        let mut poll_point = self.time_provider.instant();
        loop {
            poll_point += self.poll_frequency;

            match self.producer.idle_ms() {
                Ok(idle_ms) => {
                    let idle = self.evaluator.is_idle(idle_ms);
                    // Only the transition matters, one auto stop per walkaway.
                    if idle && !self.was_idle {
                        debug!("Host went idle after {idle_ms}ms, requesting auto stop");
                        self.next
                            .send(Command::AutoStop)
                            .await
                            .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
                    }
                    self.was_idle = idle;
                }
                Err(e) => {
                    error!("Encountered an error during idle polling {:?}", e)
                }
            }

            tokio::select! {
                // Cancelation means we stop execution of the event loop. Which means we also
                // drop our sender clone and let the engine service drain.
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(poll_point) => ()
            }
        }
    }
}
