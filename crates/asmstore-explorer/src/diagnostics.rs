//! Leveled diagnostics reported while building a store set.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

/// Severity of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Receives every non-fatal condition the explorer encounters.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

impl<F> LogSink for F
where
    F: Fn(LogLevel, &str) + Send + Sync,
{
    fn log(&self, level: LogLevel, message: &str) {
        self(level, message)
    }
}

/// Default sink: forwards to `tracing` at the matching level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warning => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
    }
}

/// Sink that keeps every message for later inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<(LogLevel, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    // Every push is a single call, so a poisoned list is still consistent.
    fn lock(&self) -> MutexGuard<'_, Vec<(LogLevel, String)>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of all messages logged so far, in order.
    pub fn messages(&self) -> Vec<(LogLevel, String)> {
        self.lock().clone()
    }

    /// Number of messages at exactly `level`.
    pub fn count(&self, level: LogLevel) -> usize {
        self.lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .count()
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, message: &str) {
        self.lock().push((level, message.to_string()));
    }
}

/// Forwards to a sink and latches warning/error flags.
pub(crate) struct Diagnostics {
    sink: Arc<dyn LogSink>,
    warnings: usize,
    errors: usize,
}

impl Diagnostics {
    pub(crate) fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            warnings: 0,
            errors: 0,
        }
    }

    pub(crate) fn log(&mut self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Warning => self.warnings += 1,
            LogLevel::Error => self.errors += 1,
            LogLevel::Debug | LogLevel::Info => {}
        }
        self.sink.log(level, message);
    }

    pub(crate) fn debug(&mut self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message.as_ref());
    }

    pub(crate) fn info(&mut self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message.as_ref());
    }

    pub(crate) fn warn(&mut self, message: impl AsRef<str>) {
        self.log(LogLevel::Warning, message.as_ref());
    }

    pub(crate) fn error(&mut self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message.as_ref());
    }

    pub(crate) fn warning_count(&self) -> usize {
        self.warnings
    }

    pub(crate) fn error_count(&self) -> usize {
        self.errors
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("warnings", &self.warnings)
            .field("errors", &self.errors)
            .finish()
    }
}
