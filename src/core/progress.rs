//! Progress and log reporting.
//!
//! Estimators report coarse-grained progress (bandwidth search evaluations,
//! backfitting iterations) through the `log` facade and, when one is attached,
//! through a caller-supplied [`ProgressSink`].

use std::fmt;
use std::sync::Arc;

/// Severity of a progress message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Receives progress messages from a running fit.
pub trait ProgressSink: Send + Sync {
    /// A message attributed to the operation that produced it.
    fn message(&self, message: &str, level: LogLevel, operation: &str);

    /// A progress tick: `current` out of `total` steps are done.
    fn progress(&self, current: usize, total: usize);
}

/// A sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn message(&self, _message: &str, _level: LogLevel, _operation: &str) {}

    fn progress(&self, _current: usize, _total: usize) {}
}

/// Forwards messages to the `log` facade and an optional sink.
#[derive(Clone, Default)]
pub(crate) struct Reporter {
    sink: Option<Arc<dyn ProgressSink>>,
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("sink", &self.sink.as_ref().map(|_| "ProgressSink"))
            .finish()
    }
}

impl Reporter {
    pub(crate) fn new(sink: Option<Arc<dyn ProgressSink>>) -> Self {
        Self { sink }
    }

    pub(crate) fn message(&self, level: LogLevel, operation: &str, message: &str) {
        match level {
            LogLevel::Debug => log::debug!("{operation}: {message}"),
            LogLevel::Info => log::info!("{operation}: {message}"),
            LogLevel::Warning => log::warn!("{operation}: {message}"),
            LogLevel::Error => log::error!("{operation}: {message}"),
        }
        if let Some(sink) = &self.sink {
            sink.message(message, level, operation);
        }
    }

    pub(crate) fn debug(&self, operation: &str, message: &str) {
        self.message(LogLevel::Debug, operation, message);
    }

    pub(crate) fn info(&self, operation: &str, message: &str) {
        self.message(LogLevel::Info, operation, message);
    }

    pub(crate) fn warn(&self, operation: &str, message: &str) {
        self.message(LogLevel::Warning, operation, message);
    }

    pub(crate) fn progress(&self, current: usize, total: usize) {
        if let Some(sink) = &self.sink {
            sink.progress(current, total);
        }
    }
}
