use tracing::info;

/// Collaborator that mirrors whether a timer is currently running, the icon/badge surface of
/// the host. Signals are fire-and-forget: tracking must never fail because a badge did.
#[cfg_attr(test, mockall::automock)]
pub trait StatusIndicator: Send + 'static {
    fn set_running(&self, running: bool);
}

/// Default indicator that only logs transitions. Actual badge rendering belongs to the UI
/// layer observing snapshots.
pub struct LogIndicator;

impl StatusIndicator for LogIndicator {
    fn set_running(&self, running: bool) {
        if running {
            info!("Timer is running");
        } else {
            info!("Timer is stopped");
        }
    }
}
