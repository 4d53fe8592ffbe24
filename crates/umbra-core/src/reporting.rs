//! Error reporting
//!
//! Outbound contract to the host's error/logging collaborator. Reporting never
//! blocks the caller and never fails the operation that produced the error.

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::{SecurityError, Severity};

/// One reported failure
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub error: SecurityError,
    pub severity: Severity,
    /// Component that observed the failure (e.g. `provider`)
    pub component: &'static str,
}

impl ErrorReport {
    /// Report at the kind's default severity
    pub fn new(error: SecurityError, component: &'static str) -> Self {
        Self {
            severity: error.severity(),
            error,
            component,
        }
    }
}

/// Receives error reports
pub trait ErrorSink: Send + Sync {
    /// Must return promptly; implementations hand off rather than wait
    fn report(&self, report: ErrorReport);
}

/// Logs reports through `tracing` (the default sink)
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, report: ErrorReport) {
        let ErrorReport {
            error,
            severity,
            component,
        } = report;
        let code = error.code();
        let kind = error.kind();
        let reason = error.reason();
        match severity {
            Severity::Info => {
                info!(component, code, %kind, reason, "Security operation failed")
            }
            Severity::Warning => {
                warn!(component, code, %kind, reason, "Security operation failed")
            }
            Severity::Error | Severity::Critical => {
                error!(component, code, %kind, reason, %severity, "Security operation failed")
            }
        }
    }
}

/// Forwards reports over an unbounded channel
///
/// A closed receiver drops reports silently.
#[derive(Debug, Clone)]
pub struct ChannelErrorSink {
    tx: mpsc::UnboundedSender<ErrorReport>,
}

impl ChannelErrorSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ErrorReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ErrorSink for ChannelErrorSink {
    fn report(&self, report: ErrorReport) {
        let _ = self.tx.send(report);
    }
}
