//! Progress sinks
//!
//! User-facing progress lines (scan status, "Enriching prompt...") go through a
//! `LogSink`, separate from tracing. Callers that want silence pass `NullSink`.

use tracing::trace;

/// Receives human-readable progress lines
pub trait LogSink: Send + Sync {
    fn record(&self, message: &str);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn record(&self, _message: &str) {}
}

/// Writes indented progress lines to stderr (stdout carries the result)
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrSink;

impl LogSink for StderrSink {
    fn record(&self, message: &str) {
        trace!(%message, "StderrSink::record: called");
        eprintln!("   {}", message);
    }
}

impl<F> LogSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn record(&self, message: &str) {
        self(message)
    }
}
