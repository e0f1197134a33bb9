//! Progress reporting for pipeline runs
//!
//! Every pipeline receives a [`Progress`] handle and reports what it is doing
//! as text lines. Lines travel over a bounded channel to whoever started the
//! run and are mirrored to `tracing` at the matching level.

use std::fmt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Capacity used by [`Progress::channel`] callers that have no preference.
pub const DEFAULT_PROGRESS_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARNING",
            Level::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// One reported line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressLine {
    pub level: Level,
    pub message: String,
}

impl fmt::Display for ProgressLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            Level::Debug | Level::Info => f.write_str(&self.message),
            level => write!(f, "{level}: {}", self.message),
        }
    }
}

/// Handle a run reports through. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Progress {
    sender: Option<mpsc::Sender<ProgressLine>>,
    verbose: bool,
}

impl Progress {
    /// Create a handle and the receiving end of its channel. Debug lines are
    /// only forwarded when `verbose` is set.
    pub fn channel(capacity: usize, verbose: bool) -> (Self, mpsc::Receiver<ProgressLine>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Some(sender),
                verbose,
            },
            receiver,
        )
    }

    /// A handle that only logs.
    pub fn silent() -> Self {
        Self {
            sender: None,
            verbose: false,
        }
    }

    pub async fn debug(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("{message}");
        if self.verbose {
            self.send(Level::Debug, message).await;
        }
    }

    pub async fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        self.send(Level::Info, message).await;
    }

    pub async fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.send(Level::Warn, message).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("{message}");
        self.send(Level::Error, message).await;
    }

    async fn send(&self, level: Level, message: String) {
        if let Some(sender) = &self.sender {
            // A caller that stopped listening does not stop the run.
            let _ = sender.send(ProgressLine { level, message }).await;
        }
    }
}
