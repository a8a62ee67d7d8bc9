//! Connectivity tracking
//!
//! [`HealthMonitor`] counts consecutive failures where no response arrived.
//! Crossing the threshold publishes `ConnectivityChanged { online: false }`;
//! the next response of any status publishes `online: true`.

use crate::collaborators::{HealthObserver, Notification, Notifier};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vetdesk_core::{ConsoleEvent, EventBus, FailureKind, VetdeskError};

pub struct HealthMonitor {
    events: EventBus,
    threshold: u32,
    consecutive_failures: AtomicU32,
    online: AtomicBool,
}

impl HealthMonitor {
    pub fn new(events: EventBus, threshold: u32) -> Self {
        Self {
            events,
            threshold: threshold.max(1),
            consecutive_failures: AtomicU32::new(0),
            online: AtomicBool::new(true),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    fn mark_reachable(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        if !self.online.swap(true, Ordering::SeqCst) {
            info!("Backend reachable again");
            self.events
                .publish(ConsoleEvent::ConnectivityChanged { online: true });
        }
    }
}

impl HealthObserver for HealthMonitor {
    fn report_success(&self) {
        self.mark_reachable();
    }

    fn report_failure(&self, error: &VetdeskError) {
        match error.kind() {
            Some(FailureKind::NetworkTransient | FailureKind::Timeout) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(failures, threshold = self.threshold, "Connectivity failure");

                if failures >= self.threshold && self.online.swap(false, Ordering::SeqCst) {
                    warn!(failures, "Backend unreachable, going offline");
                    self.events
                        .publish(ConsoleEvent::ConnectivityChanged { online: false });
                }
            }
            // A status code means the backend answered
            Some(_) if error.status().is_some() => self.mark_reachable(),
            _ => {}
        }
    }
}

/// Turn connectivity events into notifications until the bus closes
pub fn spawn_reconnection_notifier(events: &EventBus, notifier: Arc<dyn Notifier>) -> JoinHandle<()> {
    let mut receiver = events.subscribe();

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(ConsoleEvent::ConnectivityChanged { online: false }) => {
                    notifier.notify(Notification::connection_lost())
                }
                Ok(ConsoleEvent::ConnectivityChanged { online: true }) => {
                    notifier.notify(Notification::reconnected())
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Reconnection notifier lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
