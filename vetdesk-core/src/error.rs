//! Unified error handling system
//!
//! Provides the failure taxonomy shared by the request pipeline, the session
//! store and the route guard, plus structured context for debugging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type VetdeskResult<T> = Result<T, VetdeskError>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: std::collections::HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: std::collections::HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Failure classes a request or session operation can end in.
///
/// Every failed request maps to exactly one of the first six kinds; the last
/// two only arise from session handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unauthorized,
    ServerTransient,
    NetworkTransient,
    Timeout,
    RateLimited,
    ClientError,
    RefreshFailure,
    MalformedSession,
}

impl FailureKind {
    /// Whether a request failing with this kind may be redispatched after a backoff
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FailureKind::ServerTransient | FailureKind::NetworkTransient | FailureKind::Timeout
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Unauthorized => write!(f, "unauthorized"),
            FailureKind::ServerTransient => write!(f, "server_transient"),
            FailureKind::NetworkTransient => write!(f, "network_transient"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RateLimited => write!(f, "rate_limited"),
            FailureKind::ClientError => write!(f, "client_error"),
            FailureKind::RefreshFailure => write!(f, "refresh_failure"),
            FailureKind::MalformedSession => write!(f, "malformed_session"),
        }
    }
}

/// Main error type for the console
#[derive(Error, Debug)]
pub enum VetdeskError {
    #[error("Unauthorized: {message}")]
    Unauthorized {
        message: String,
        context: ErrorContext,
    },

    #[error("Server error ({status}): {message}")]
    ServerTransient {
        status: u16,
        message: String,
        context: ErrorContext,
    },

    #[error("Network error: {message}")]
    NetworkTransient {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Operation timeout: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        retry_after_ms: Option<u64>,
        context: ErrorContext,
    },

    #[error("Request rejected ({status}): {message}")]
    ClientError {
        status: u16,
        message: String,
        context: ErrorContext,
    },

    #[error("Session refresh failed: {message}")]
    RefreshFailure {
        message: String,
        context: ErrorContext,
    },

    #[error("Malformed session record: {message}")]
    MalformedSession {
        message: String,
        context: ErrorContext,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

impl VetdeskError {
    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            VetdeskError::Unauthorized { context, .. } => Some(context),
            VetdeskError::ServerTransient { context, .. } => Some(context),
            VetdeskError::NetworkTransient { context, .. } => Some(context),
            VetdeskError::Timeout { context, .. } => Some(context),
            VetdeskError::RateLimited { context, .. } => Some(context),
            VetdeskError::ClientError { context, .. } => Some(context),
            VetdeskError::RefreshFailure { context, .. } => Some(context),
            VetdeskError::MalformedSession { context, .. } => Some(context),
            VetdeskError::Storage { context, .. } => Some(context),
            VetdeskError::Config { context, .. } => Some(context),
            VetdeskError::Internal { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Failure class of this error, if it belongs to the request/session taxonomy
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            VetdeskError::Unauthorized { .. } => Some(FailureKind::Unauthorized),
            VetdeskError::ServerTransient { .. } => Some(FailureKind::ServerTransient),
            VetdeskError::NetworkTransient { .. } => Some(FailureKind::NetworkTransient),
            VetdeskError::Timeout { .. } => Some(FailureKind::Timeout),
            VetdeskError::RateLimited { .. } => Some(FailureKind::RateLimited),
            VetdeskError::ClientError { .. } => Some(FailureKind::ClientError),
            VetdeskError::RefreshFailure { .. } => Some(FailureKind::RefreshFailure),
            VetdeskError::MalformedSession { .. } => Some(FailureKind::MalformedSession),
            _ => None,
        }
    }

    /// Check if error is recoverable by retrying the same request
    pub fn is_transient(&self) -> bool {
        self.kind().is_some_and(|kind| kind.is_transient())
    }

    /// HTTP status carried by the error, when a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            VetdeskError::Unauthorized { .. } => Some(401),
            VetdeskError::RateLimited { .. } => Some(429),
            VetdeskError::ServerTransient { status, .. } => Some(*status),
            VetdeskError::ClientError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// A 403 rejection from the backend
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, VetdeskError::ClientError { status: 403, .. })
    }

    /// Server-provided wait hint for rate limited requests
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            VetdeskError::RateLimited { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            VetdeskError::Internal { .. } | VetdeskError::Storage { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Internal error occurred"
                );
            }
            VetdeskError::Config { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Configuration error"
                );
            }
            VetdeskError::ServerTransient { .. }
            | VetdeskError::NetworkTransient { .. }
            | VetdeskError::Timeout { .. } => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Transient request failure (may be recoverable)"
                );
            }
            VetdeskError::RateLimited { .. }
            | VetdeskError::ClientError { .. }
            | VetdeskError::Unauthorized { .. } => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    status = ?self.status(),
                    error = %self,
                    "Request rejected by backend"
                );
            }
            VetdeskError::MalformedSession { .. } => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Ignoring unreadable session record"
                );
            }
            _ => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Error occurred"
                );
            }
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! storage_error {
    ($msg:expr, $component:expr) => {
        $crate::VetdeskError::Storage {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::VetdeskError::Storage {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check that the session directory exists and is writable"),
        }
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::VetdeskError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file")
                .with_suggestion("Run 'vetdesk config --init' to create default config"),
        }
    };
}
