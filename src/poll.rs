//! Waiting for a freshly installed command to appear on PATH.

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{InstallError, InstallResult};
use crate::platform::CommandRunner;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Bounded, cancellable PATH poller.
#[derive(Debug, Clone)]
pub struct AvailabilityPoller {
    interval: Duration,
    cancel: CancellationToken,
}

impl AvailabilityPoller {
    pub fn new(cancel: CancellationToken) -> Self {
        Self::with_interval(DEFAULT_POLL_INTERVAL, cancel)
    }

    pub fn with_interval(interval: Duration, cancel: CancellationToken) -> Self {
        Self { interval, cancel }
    }

    /// Try to resolve `command` up to `max_attempts` times, one interval
    /// apart. Fails with `NotFound` once attempts run out and with
    /// `Cancelled` as soon as the token fires.
    pub async fn poll_until_available(
        &self,
        runner: &dyn CommandRunner,
        command: &str,
        max_attempts: u32,
    ) -> InstallResult<PathBuf> {
        for attempt in 1..=max_attempts {
            if self.cancel.is_cancelled() {
                return Err(InstallError::cancelled(format!("waiting for {}", command)));
            }

            if let Some(path) = runner.locate(command) {
                tracing::debug!("{} available at {} after {} attempt(s)", command, path.display(), attempt);
                return Ok(path);
            }

            if attempt < max_attempts {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        return Err(InstallError::cancelled(format!("waiting for {}", command)));
                    }
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
        }

        tracing::warn!("{} still not on PATH after {} attempts", command, max_attempts);
        Err(InstallError::not_found(command))
    }
}
