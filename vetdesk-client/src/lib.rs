//! Vetdesk Client - the authenticated request pipeline
//!
//! Every backend call goes through [`RequestPipeline`], which attaches the
//! stored token, classifies failures, shares a single token refresh among all
//! requests rejected with 401, and retries transient failures with backoff.

pub mod auth_api;
pub mod classify;
pub mod collaborators;
pub mod health;
pub mod pipeline;
pub mod refresh;
pub mod transport;

pub use auth_api::AuthApi;
pub use classify::{classify_response, classify_transport, parse_retry_after};
pub use collaborators::{
    HealthObserver, Navigator, NoopHealthObserver, Notification, Notifier, Severity,
    TracingNavigator, TracingNotifier,
};
pub use health::{spawn_reconnection_notifier, HealthMonitor};
pub use pipeline::{PipelineSettings, RequestPipeline, RetryContext};
pub use refresh::{RefreshCoordinator, RefreshTicket};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport, TransportError};
