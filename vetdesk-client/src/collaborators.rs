//! Collaborators the pipeline reports to
//!
//! Each is injected once at bootstrap; the defaults here only log.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use vetdesk_core::VetdeskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// A user-visible message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub severity: Severity,
}

impl Notification {
    pub fn new(severity: Severity, title: &str, message: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            message: message.into(),
            severity,
        }
    }

    pub fn session_expired() -> Self {
        Self::new(
            Severity::Warning,
            "Session expired",
            "Your session has expired. Please sign in again.",
        )
    }

    pub fn rate_limited(retry_after_ms: Option<u64>) -> Self {
        let message = match retry_after_ms {
            Some(ms) => format!(
                "Too many requests. Try again in {} seconds.",
                ms.div_ceil(1000)
            ),
            None => "Too many requests. Please wait a moment.".to_string(),
        };
        Self::new(Severity::Warning, "Slow down", message)
    }

    pub fn permission_denied() -> Self {
        Self::new(
            Severity::Error,
            "Access denied",
            "You do not have permission to perform this action.",
        )
    }

    pub fn connection_lost() -> Self {
        Self::new(
            Severity::Warning,
            "Connection lost",
            "The server cannot be reached. Requests will be retried.",
        )
    }

    pub fn reconnected() -> Self {
        Self::new(Severity::Success, "Reconnected", "Connection to the server restored.")
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

pub trait HealthObserver: Send + Sync {
    fn report_success(&self);
    fn report_failure(&self, error: &VetdeskError);
}

pub trait Navigator: Send + Sync {
    fn redirect(&self, path: &str);
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        let Notification {
            title,
            message,
            severity,
        } = notification;

        match severity {
            Severity::Info | Severity::Success => info!(%title, %message, "Notification"),
            Severity::Warning => warn!(%title, %message, "Notification"),
            Severity::Error => error!(%title, %message, "Notification"),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct NoopHealthObserver;

impl HealthObserver for NoopHealthObserver {
    fn report_success(&self) {}

    fn report_failure(&self, _error: &VetdeskError) {}
}

/// Logs redirects instead of performing them
#[derive(Debug, Default, Clone)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn redirect(&self, path: &str) {
        info!(path, "Redirect requested");
    }
}
