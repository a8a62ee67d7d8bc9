//! Console bootstrap: builds every collaborator once and wires them together

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vetdesk_auth::{FileKeyValueStore, GuardPaths, RouteGuard, RouteTable, SessionStore};
use vetdesk_client::{
    spawn_reconnection_notifier, AuthApi, HealthMonitor, HttpTransport, Navigator, Notification,
    Notifier, PipelineSettings, RequestPipeline, Severity,
};
use vetdesk_core::{ConsoleConfig, EventBus, VetdeskResult};

/// Prints notifications for the user and mirrors them into the log
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, notification: Notification) {
        let icon = match notification.severity {
            Severity::Info => "ℹ️ ",
            Severity::Success => "✅",
            Severity::Warning => "⚠️ ",
            Severity::Error => "❌",
        };
        eprintln!("{} {}: {}", icon, notification.title, notification.message);

        match notification.severity {
            Severity::Error => error!(title = %notification.title, "User notified"),
            Severity::Warning => warn!(title = %notification.title, "User notified"),
            _ => info!(title = %notification.title, "User notified"),
        }
    }
}

/// A terminal has no views; redirects are reported instead
pub struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn redirect(&self, path: &str) {
        println!("↪️  Redirecting to {}", path);
        debug!(path, "Redirect");
    }
}

pub struct Console {
    pub config: ConsoleConfig,
    pub store: Arc<SessionStore>,
    pub pipeline: Arc<RequestPipeline>,
    pub guard: RouteGuard,
    pub auth: AuthApi,
    reconnection: JoinHandle<()>,
}

impl Console {
    /// Construct the session store, pipeline and guard from `config`.
    /// Must run inside the tokio runtime.
    pub fn bootstrap(config: ConsoleConfig) -> VetdeskResult<Self> {
        let events = EventBus::default();

        let storage = Arc::new(FileKeyValueStore::new(
            config.session.resolved_storage_dir(),
        )?);
        let store = Arc::new(SessionStore::init(storage, events.clone())?);

        let notifier: Arc<dyn Notifier> = Arc::new(TerminalNotifier);
        let health = Arc::new(HealthMonitor::new(
            events.clone(),
            config.session.offline_failure_threshold,
        ));
        let reconnection = spawn_reconnection_notifier(&events, notifier.clone());

        let transport = Arc::new(HttpTransport::new(&config.api)?);
        let pipeline = Arc::new(
            RequestPipeline::new(
                transport,
                store.clone(),
                PipelineSettings::from_config(&config),
            )
            .with_notifier(notifier)
            .with_health_observer(health)
            .with_navigator(Arc::new(TerminalNavigator)),
        );

        let guard = RouteGuard::new(
            store.clone(),
            RouteTable::from_config(&config.routes)?,
            GuardPaths::from(&config.routes),
        );
        let auth = AuthApi::new(pipeline.clone());

        info!(base_url = %config.api.base_url, "Console ready");

        Ok(Self {
            config,
            store,
            pipeline,
            guard,
            auth,
            reconnection,
        })
    }

    /// Let a started graceful logout finish, then stop background tasks
    pub async fn shutdown(self) {
        self.pipeline.wait_for_logout().await;
        self.reconnection.abort();
        debug!("Console shut down");
    }
}
