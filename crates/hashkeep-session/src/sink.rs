//! Operator-facing reporting of best-effort failures.
//!
//! Store errors on paths that must not fail the caller (renewal, field I/O,
//! sweeping, notification delivery) are handed to an [`ErrorSink`] instead
//! of being returned.

use parking_lot::Mutex;
use tracing::warn;

use crate::error::Error;

/// Receives errors that are swallowed on best-effort paths.
pub trait ErrorSink: Send + Sync {
    /// Report `error`, which occurred while doing `context`.
    fn report(&self, context: &str, error: &Error);
}

/// Sink that emits a `tracing` warning per report.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, context: &str, error: &Error) {
        warn!(context = %context, error = %error, "session store operation failed");
    }
}

/// A single captured report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// What was being done.
    pub context: String,
    /// Rendered error message.
    pub message: String,
}

/// Sink that keeps reports in memory for later inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<Report>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    /// Number of reports received.
    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    /// Check if nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }

    /// Discard captured reports.
    pub fn clear(&self) {
        self.reports.lock().clear();
    }
}

impl ErrorSink for MemorySink {
    fn report(&self, context: &str, error: &Error) {
        self.reports.lock().push(Report {
            context: context.to_string(),
            message: error.to_string(),
        });
    }
}
