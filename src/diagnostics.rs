//! Diagnostics sink for raw mechanism status codes.
//!
//! Status codes never cross the public error boundary. Components hand them to
//! a [`Diagnostics`] implementation instead, which only observes: nothing it
//! does feeds back into control flow.

use std::sync::{Arc, Mutex};

use crate::status::Status;

/// Receives rendered status reports from the core components.
pub trait Diagnostics: Send + Sync {
    /// Report `status` from `operation` of `component`.
    ///
    /// `message` is the rendered status, including the mechanism's minor code
    /// text when available.
    fn report(&self, component: &'static str, operation: &'static str, status: Status, message: &str);
}

/// Default sink: one `tracing` warning per report.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn report(&self, component: &'static str, operation: &'static str, status: Status, message: &str) {
        tracing::warn!(
            component,
            operation,
            major = status.major(),
            minor = status.minor(),
            "{message}"
        );
    }
}

/// One captured report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Reporting component
    pub component: &'static str,
    /// Operation that failed
    pub operation: &'static str,
    /// Raw status
    pub status: Status,
    /// Rendered status
    pub message: String,
}

/// Sink that keeps every report in memory, for tests and tooling.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    reports: Mutex<Vec<Report>>,
}

impl RecordingDiagnostics {
    /// Create an empty recorder
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of the reports so far
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn report(&self, component: &'static str, operation: &'static str, status: Status, message: &str) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(Report {
                component,
                operation,
                status,
                message: message.to_string(),
            });
        }
    }
}

/// Shared default sink.
pub(crate) fn default_sink() -> Arc<dyn Diagnostics> {
    Arc::new(TracingDiagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::RoutineError;

    #[test]
    fn test_recording_keeps_order() {
        let sink = RecordingDiagnostics::new();
        sink.report("credential", "acquire", Status::routine(RoutineError::NoCred, 1), "first");
        sink.report("channel", "receive_message", Status::routine(RoutineError::BadMic, 2), "second");

        let reports = sink.reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].component, "credential");
        assert_eq!(reports[1].message, "second");
        assert_eq!(reports[1].status.minor(), 2);
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        TracingDiagnostics.report("negotiation", "step", Status::COMPLETE, "ok");
    }
}
