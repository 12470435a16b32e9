//! Progress events and sinks.
//!
//! Installers report every state transition as an [`InstallProgress`]. The
//! [`ProgressReporter`] delivers them to a caller-supplied
//! [`ProgressSink`], keeps `installing` percentages monotonic per step, and
//! mirrors every event into the tracing log.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Status of a single step
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    #[default]
    Pending,
    Installing,
    Completed,
    Error,
    Skipped,
}

impl std::fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallStatus::Pending => write!(f, "pending"),
            InstallStatus::Installing => write!(f, "installing"),
            InstallStatus::Completed => write!(f, "completed"),
            InstallStatus::Error => write!(f, "error"),
            InstallStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// One progress event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstallProgress {
    pub step: String,
    pub status: InstallStatus,
    pub message: String,
    /// 0.0 ..= 100.0
    pub percentage: f64,
}

impl InstallProgress {
    pub fn new(
        step: impl Into<String>,
        status: InstallStatus,
        message: impl Into<String>,
        percentage: f64,
    ) -> Self {
        Self {
            step: step.into(),
            status,
            message: message.into(),
            percentage: percentage.clamp(0.0, 100.0),
        }
    }
}

/// Receiver of progress events.
///
/// Implementations may be invoked from any task, concurrently, and may emit
/// further events from inside `on_progress`.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, progress: &InstallProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(&InstallProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &InstallProgress) {
        self(progress)
    }
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&self, _progress: &InstallProgress) {}
}

/// Forwards events into an unbounded channel, e.g. for a UI task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<InstallProgress>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<InstallProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, progress: &InstallProgress) {
        // A closed receiver means nobody is listening any more.
        let _ = self.tx.send(progress.clone());
    }
}

/// Latest known state of a step
#[derive(Debug, Clone, Serialize)]
pub struct StepSnapshot {
    pub step: String,
    pub status: InstallStatus,
    pub message: String,
    pub percentage: f64,
    pub updated_at: DateTime<Utc>,
}

/// Aggregating view: last event wins per step, steps kept in first-seen order.
#[derive(Debug, Default)]
pub struct ProgressBoard {
    steps: Mutex<Vec<StepSnapshot>>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<StepSnapshot> {
        self.steps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn get(&self, step: &str) -> Option<StepSnapshot> {
        self.steps
            .lock()
            .ok()
            .and_then(|s| s.iter().find(|t| t.step == step).cloned())
    }
}

impl ProgressSink for ProgressBoard {
    fn on_progress(&self, progress: &InstallProgress) {
        let Ok(mut steps) = self.steps.lock() else {
            return;
        };
        let snapshot = StepSnapshot {
            step: progress.step.clone(),
            status: progress.status,
            message: progress.message.clone(),
            percentage: progress.percentage,
            updated_at: Utc::now(),
        };
        match steps.iter_mut().find(|t| t.step == progress.step) {
            Some(existing) => *existing = snapshot,
            None => steps.push(snapshot),
        }
    }
}

/// Sub-range of a step's percentage scale, used to map download progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressBand {
    pub start: f64,
    pub end: f64,
}

impl ProgressBand {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Map a fraction in `[0, 1]` onto the band
    pub fn at(&self, fraction: f64) -> f64 {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.start + (self.end - self.start) * fraction
    }
}

struct ReporterInner {
    sink: Arc<dyn ProgressSink>,
    /// Highest `installing` percentage seen per step
    high_water: Mutex<HashMap<String, f64>>,
}

/// Thread-safe handle used by installers to emit progress.
#[derive(Clone)]
pub struct ProgressReporter {
    inner: Arc<ReporterInner>,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter").finish_non_exhaustive()
    }
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            inner: Arc::new(ReporterInner {
                sink,
                high_water: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn silent() -> Self {
        Self::new(Arc::new(NullSink))
    }

    /// Deliver one event.
    ///
    /// The sink runs after the high-water lock is released, so it may emit
    /// through a clone of this reporter.
    pub fn emit(&self, step: &str, status: InstallStatus, message: impl Into<String>, percentage: f64) {
        let mut progress = InstallProgress::new(step, status, message, percentage);

        {
            let mut high_water = match self.inner.high_water.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };

            if status == InstallStatus::Installing {
                let floor = high_water.entry(step.to_string()).or_insert(0.0);
                if progress.percentage < *floor {
                    progress.percentage = *floor;
                }
                *floor = progress.percentage;
            } else {
                high_water.remove(step);
            }
        }

        tracing::debug!(
            step = %progress.step,
            status = %progress.status,
            percentage = progress.percentage,
            "{}",
            progress.message
        );

        self.inner.sink.on_progress(&progress);
    }

    pub fn installing(&self, step: &str, message: impl Into<String>, percentage: f64) {
        self.emit(step, InstallStatus::Installing, message, percentage);
    }

    pub fn completed(&self, step: &str, message: impl Into<String>) {
        self.emit(step, InstallStatus::Completed, message, 100.0);
    }

    pub fn error(&self, step: &str, message: impl Into<String>) {
        self.emit(step, InstallStatus::Error, message, 0.0);
    }

    pub fn skipped(&self, step: &str, message: impl Into<String>) {
        self.emit(step, InstallStatus::Skipped, message, 0.0);
    }

    /// Forget the high-water mark so a fresh run of `step` can start at 0.
    pub fn reset(&self, step: &str) {
        if let Ok(mut high_water) = self.inner.high_water.lock() {
            high_water.remove(step);
        }
    }
}
