//! Test doubles for driving the pipeline without a backend

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use vetdesk_auth::session::SESSION_KEY;
use vetdesk_auth::{Identity, KeyValueStore, MemoryKeyValueStore, Session, SessionStore};
use vetdesk_client::{
    ApiRequest, ApiResponse, Navigator, Notification, Notifier, PipelineSettings,
    RequestPipeline, Transport, TransportError,
};
use vetdesk_core::{storage_error, EventBus, RetryPolicy, VetdeskResult};

pub const REFRESH: &str = "/auth/refresh";

/// One request as the transport saw it
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
    pub at: Instant,
}

type Responder = Box<dyn Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync>;

/// Transport answering from a closure, recording every call
pub struct ScriptedTransport {
    responder: Responder,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new(
        responder: impl Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            delays: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Hold responses for `path` back by `delay`
    pub fn with_delay(mut self, path: &str, delay: Duration) -> Self {
        self.delays.insert(path.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.path == path)
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.calls.lock().push(RecordedCall {
            path: request.path.clone(),
            bearer: request.bearer_token.clone(),
            body: request.body.clone(),
            at: Instant::now(),
        });

        if let Some(delay) = self.delays.get(&request.path) {
            tokio::time::sleep(*delay).await;
        }

        (self.responder)(request)
    }
}

/// Storage that counts how often the session record is removed, and can be
/// told to reject writes
#[derive(Default)]
pub struct CountingStorage {
    inner: MemoryKeyValueStore,
    session_removals: AtomicUsize,
    reject_writes: AtomicBool,
}

impl CountingStorage {
    pub fn session_removals(&self) -> usize {
        self.session_removals.load(Ordering::SeqCst)
    }

    pub fn reject_writes(&self) {
        self.reject_writes.store(true, Ordering::SeqCst);
    }
}

impl KeyValueStore for CountingStorage {
    fn get(&self, key: &str) -> VetdeskResult<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> VetdeskResult<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(storage_error!("Disk full", "counting_storage"));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> VetdeskResult<()> {
        if key == SESSION_KEY {
            self.session_removals.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.remove(key)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn titles(&self) -> Vec<String> {
        self.notifications
            .lock()
            .iter()
            .map(|notification| notification.title.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().push(notification);
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    redirects: Mutex<Vec<(String, Instant)>>,
}

impl RecordingNavigator {
    pub fn redirects(&self) -> Vec<(String, Instant)> {
        self.redirects.lock().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, path: &str) {
        self.redirects.lock().push((path.to_string(), Instant::now()));
    }
}

pub fn json_response(status: u16, body: serde_json::Value) -> ApiResponse {
    ApiResponse::new(status, body.to_string())
}

pub fn signed_in_session(token: &str) -> Session {
    Session::new(
        token.to_string(),
        Some("refresh-1".to_string()),
        Identity::new(7_i64, Some("Dr. Vega".to_string()), Some("practitioner".to_string())),
    )
}

/// Pipeline under test plus the doubles wired into it
pub struct Harness {
    pub pipeline: Arc<RequestPipeline>,
    pub transport: Arc<ScriptedTransport>,
    pub storage: Arc<CountingStorage>,
    pub store: Arc<SessionStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub navigator: Arc<RecordingNavigator>,
}

pub fn settings(base_delay_ms: u64) -> PipelineSettings {
    PipelineSettings {
        retry: RetryPolicy {
            base_delay_ms,
            ..Default::default()
        },
        refresh_timeout_ms: 5_000,
        graceful_logout_delay: Duration::from_millis(2_000),
        login_path: "/login".to_string(),
        refresh_path: REFRESH.to_string(),
    }
}

pub fn harness(transport: ScriptedTransport, session: Option<Session>) -> Harness {
    harness_with(transport, session, settings(100))
}

pub fn harness_with(
    transport: ScriptedTransport,
    session: Option<Session>,
    settings: PipelineSettings,
) -> Harness {
    let transport = Arc::new(transport);
    let storage = Arc::new(CountingStorage::default());
    let store = Arc::new(SessionStore::new(storage.clone(), EventBus::default()));
    if let Some(session) = session {
        store.set(session).unwrap();
    }

    let notifier = Arc::new(RecordingNotifier::default());
    let navigator = Arc::new(RecordingNavigator::default());

    let pipeline = Arc::new(
        RequestPipeline::new(transport.clone(), store.clone(), settings)
            .with_notifier(notifier.clone())
            .with_navigator(navigator.clone()),
    );

    Harness {
        pipeline,
        transport,
        storage,
        store,
        notifier,
        navigator,
    }
}
