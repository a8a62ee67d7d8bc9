//! Request Pipeline
//!
//! Wraps every outbound call: attaches the stored access token, classifies
//! failures, recovers from 401s through a single shared refresh, backs off and
//! redispatches transient failures, and reports each outcome to the health
//! observer.

use crate::classify::{classify_response, classify_transport};
use crate::collaborators::{
    HealthObserver, Navigator, NoopHealthObserver, Notification, Notifier, TracingNavigator,
    TracingNotifier,
};
use crate::refresh::{RefreshCoordinator, RefreshTicket};
use crate::transport::{ApiRequest, ApiResponse, Method, Transport};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, info_span, warn, Instrument};
use vetdesk_auth::{Session, SessionStore};
use vetdesk_core::{
    with_timeout, ConsoleConfig, ErrorContext, FailureKind, RetryPolicy, VetdeskError,
    VetdeskResult,
};

pub const REFRESH_PATH: &str = "/auth/refresh";

/// Pipeline tunables, usually derived from [`ConsoleConfig`]
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub retry: RetryPolicy,
    pub refresh_timeout_ms: u64,
    pub graceful_logout_delay: Duration,
    pub login_path: String,
    pub refresh_path: String,
}

impl PipelineSettings {
    pub fn from_config(config: &ConsoleConfig) -> Self {
        Self {
            retry: config.retry.clone(),
            refresh_timeout_ms: config.api.refresh_timeout_ms,
            graceful_logout_delay: Duration::from_millis(config.session.graceful_logout_delay_ms),
            login_path: config.routes.login_path.clone(),
            refresh_path: REFRESH_PATH.to_string(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&ConsoleConfig::default())
    }
}

/// Per-dispatch bookkeeping, carried across redispatches of one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryContext {
    /// Transient retries performed so far
    pub attempt: u32,
    pub max_attempts: u32,
    pub no_retry: bool,
    /// Whether the request was already redispatched after a 401
    pub auth_retried: bool,
}

impl RetryContext {
    pub fn for_request(request: &ApiRequest, policy: &RetryPolicy) -> Self {
        Self {
            attempt: 0,
            max_attempts: policy.retry_limit(),
            no_retry: request.no_retry,
            auth_retried: false,
        }
    }

    /// Whether a transient failure may be redispatched
    pub fn can_retry(&self) -> bool {
        !self.no_retry && self.attempt < self.max_attempts
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(rename = "accessToken", alias = "access_token")]
    access_token: String,
    #[serde(rename = "refreshToken", alias = "refresh_token", default)]
    refresh_token: Option<String>,
}

pub struct RequestPipeline {
    transport: Arc<dyn Transport>,
    store: Arc<SessionStore>,
    notifier: Arc<dyn Notifier>,
    health: Arc<dyn HealthObserver>,
    navigator: Arc<dyn Navigator>,
    settings: PipelineSettings,
    refresh: RefreshCoordinator,
    consecutive_failures: AtomicU32,
    pending_logout: Mutex<Option<JoinHandle<()>>>,
}

impl RequestPipeline {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<SessionStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            transport,
            store,
            notifier: Arc::new(TracingNotifier),
            health: Arc::new(NoopHealthObserver),
            navigator: Arc::new(TracingNavigator),
            settings,
            refresh: RefreshCoordinator::new(),
            consecutive_failures: AtomicU32::new(0),
            pending_logout: Mutex::new(None),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_health_observer(mut self, health: Arc<dyn HealthObserver>) -> Self {
        self.health = health;
        self
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Failed dispatches since the last success
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Send `request` and settle it: a 2xx response or the classified error
    pub async fn execute(&self, request: ApiRequest) -> VetdeskResult<ApiResponse> {
        let span = info_span!("api_request", method = %request.method, path = %request.path);
        self.run(request).instrument(span).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> VetdeskResult<T> {
        self.execute(ApiRequest::get(path)).await?.json()
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> VetdeskResult<T> {
        let request = ApiRequest::new(Method::POST, path).with_json(body)?;
        self.execute(request).await?.json()
    }

    pub async fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> VetdeskResult<T> {
        let request = ApiRequest::new(Method::PUT, path).with_json(body)?;
        self.execute(request).await?.json()
    }

    pub async fn delete(&self, path: &str) -> VetdeskResult<()> {
        self.execute(ApiRequest::delete(path)).await?;
        Ok(())
    }

    /// Wait for a started graceful logout to finish its redirect
    pub async fn wait_for_logout(&self) {
        let handle = self.pending_logout.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Graceful logout task failed");
            }
        }
    }

    async fn run(&self, mut request: ApiRequest) -> VetdeskResult<ApiResponse> {
        let operation = format!("{} {}", request.method, request.path);
        let mut retry = RetryContext::for_request(&request, &self.settings.retry);
        let mut refreshed_token: Option<String> = None;

        loop {
            request.bearer_token = if request.skip_auth {
                None
            } else {
                refreshed_token
                    .take()
                    .or_else(|| self.store.get().map(|session| session.access_token))
            };

            let error = match self.dispatch(&request, &operation).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            match error.kind() {
                Some(FailureKind::Unauthorized) if !request.skip_auth && !retry.auth_retried => {
                    retry.auth_retried = true;
                    let token = self
                        .recover_session(request.bearer_token.as_deref(), error)
                        .await?;
                    refreshed_token = Some(token);
                }
                Some(kind) if kind.is_transient() && retry.can_retry() => {
                    retry.attempt += 1;
                    let delay = self.settings.retry.delay_for(retry.attempt);
                    warn!(
                        attempt = retry.attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure, retrying"
                    );
                    sleep(delay).await;
                }
                _ => {
                    self.surface(&error);
                    return Err(error);
                }
            }
        }
    }

    async fn dispatch(&self, request: &ApiRequest, operation: &str) -> VetdeskResult<ApiResponse> {
        let result = match self.transport.send(request).await {
            Ok(response) => match classify_response(&response, operation) {
                None => Ok(response),
                Some(error) => Err(error),
            },
            Err(error) => Err(classify_transport(error, operation)),
        };

        match &result {
            Ok(response) => {
                debug!(status = response.status, "Request succeeded");
                self.consecutive_failures.store(0, Ordering::SeqCst);
                self.health.report_success();
            }
            Err(error) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(kind = ?error.kind(), failures, "Request failed");
                self.health.report_failure(error);
            }
        }

        result
    }

    /// Obtain a usable token after `failed_token` was rejected with 401.
    ///
    /// Only the refresh leader talks to the refresh endpoint; everyone else
    /// waits for its outcome.
    async fn recover_session(
        &self,
        failed_token: Option<&str>,
        unauthorized: VetdeskError,
    ) -> VetdeskResult<String> {
        match self.refresh.join() {
            RefreshTicket::Leader(leader) => {
                let Some(current) = self.store.get() else {
                    debug!("No session to refresh");
                    leader.settle(Err("No session".to_string()));
                    return Err(unauthorized);
                };

                if failed_token != Some(current.access_token.as_str()) {
                    debug!("Token changed since dispatch, retrying with the stored one");
                    leader.settle(Ok(current.access_token.clone()));
                    return Ok(current.access_token);
                }

                match self.refresh_session(&current).await {
                    Ok(session) => {
                        let released = leader.settle(Ok(session.access_token.clone()));
                        info!(released, "Session refreshed");
                        Ok(session.access_token)
                    }
                    Err(error) => {
                        let released = leader.settle(Err(error.to_string()));
                        warn!(released, error = %error, "Session refresh failed");
                        self.begin_graceful_logout();
                        Err(error)
                    }
                }
            }
            RefreshTicket::Follower(receiver) => match receiver.await {
                Ok(Ok(token)) => Ok(token),
                Ok(Err(message)) => Err(refresh_failure(message)),
                Err(_) => Err(refresh_failure("Session refresh was abandoned")),
            },
        }
    }

    async fn refresh_session(&self, current: &Session) -> VetdeskResult<Session> {
        let Some(refresh_token) = current.refresh_token.clone() else {
            return Err(refresh_failure("No refresh token stored"));
        };

        let request = ApiRequest::post(
            self.settings.refresh_path.as_str(),
            serde_json::json!({ "refreshToken": refresh_token }),
        )
        .without_auth()
        .no_retry();

        let response = with_timeout(
            self.transport.send(&request),
            self.settings.refresh_timeout_ms,
            "refresh_session",
        )
        .await
        .map_err(|e| refresh_failure(e.to_string()))?
        .map_err(|e| refresh_failure(e.to_string()))?;

        if let Some(error) = classify_response(&response, "refresh_session") {
            return Err(refresh_failure(error.to_string()));
        }

        let tokens: RefreshResponse = response
            .json()
            .map_err(|e| refresh_failure(format!("Malformed refresh response: {}", e)))?;
        if tokens.access_token.is_empty() {
            return Err(refresh_failure("Refresh response carried no access token"));
        }

        self.store
            .replace_tokens(tokens.access_token, tokens.refresh_token)
            .map_err(|e| match e.kind() {
                Some(FailureKind::RefreshFailure) => e,
                _ => refresh_failure(format!("Could not store refreshed session: {}", e)),
            })
    }

    /// Clear the session now, tell the user, redirect to login after the delay
    fn begin_graceful_logout(&self) {
        if let Err(e) = self.store.clear() {
            e.log();
        }
        self.notifier.notify(Notification::session_expired());

        let navigator = Arc::clone(&self.navigator);
        let login_path = self.settings.login_path.clone();
        let delay = self.settings.graceful_logout_delay;
        info!(delay_ms = delay.as_millis() as u64, "Graceful logout started");

        let handle = tokio::spawn(async move {
            sleep(delay).await;
            navigator.redirect(&login_path);
        });
        *self.pending_logout.lock() = Some(handle);
    }

    /// Side effects of a request rejected for good
    fn surface(&self, error: &VetdeskError) {
        error.log();

        if let Some(FailureKind::RateLimited) = error.kind() {
            self.notifier
                .notify(Notification::rate_limited(error.retry_after_ms()));
        } else if error.is_permission_denied() {
            self.notifier.notify(Notification::permission_denied());
        }
    }
}

fn refresh_failure(message: impl Into<String>) -> VetdeskError {
    VetdeskError::RefreshFailure {
        message: message.into(),
        context: ErrorContext::new("request_pipeline")
            .with_operation("refresh_session")
            .with_suggestion("Sign in again"),
    }
}
