//! Single-flight refresh coordination
//!
//! State machine `Idle -> Refreshing -> Idle`. The first caller to join while
//! idle becomes the leader and performs the refresh; everyone joining while
//! refreshing is parked in a FIFO queue. Settling returns to `Idle` and takes
//! the queue in one critical section, then releases waiters in arrival order.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// New access token, or the reason the refresh failed
pub type RefreshOutcome = Result<String, String>;

type Waiter = oneshot::Sender<RefreshOutcome>;

#[derive(Debug)]
enum RefreshState {
    Idle,
    Refreshing { waiters: VecDeque<Waiter> },
}

#[derive(Debug)]
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

/// Role handed out by [`RefreshCoordinator::join`]
pub enum RefreshTicket<'a> {
    /// Perform the refresh and settle it
    Leader(RefreshLeader<'a>),
    /// Wait for the leader's outcome
    Follower(oneshot::Receiver<RefreshOutcome>),
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RefreshState::Idle),
        }
    }

    pub fn join(&self) -> RefreshTicket<'_> {
        let mut state = self.state.lock();

        match &mut *state {
            RefreshState::Idle => {
                *state = RefreshState::Refreshing {
                    waiters: VecDeque::new(),
                };
                debug!("Refresh started");
                RefreshTicket::Leader(RefreshLeader {
                    coordinator: self,
                    settled: false,
                })
            }
            RefreshState::Refreshing { waiters } => {
                let (sender, receiver) = oneshot::channel();
                waiters.push_back(sender);
                debug!(parked = waiters.len(), "Request parked behind refresh");
                RefreshTicket::Follower(receiver)
            }
        }
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.state.lock(), RefreshState::Refreshing { .. })
    }

    fn settle(&self, outcome: RefreshOutcome) -> usize {
        let waiters = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, RefreshState::Idle) {
                RefreshState::Refreshing { waiters } => waiters,
                RefreshState::Idle => VecDeque::new(),
            }
        };

        let released = waiters.len();
        for waiter in waiters {
            // A dropped receiver belongs to a caller that went away
            let _ = waiter.send(outcome.clone());
        }

        debug!(released, success = outcome.is_ok(), "Refresh settled");
        released
    }
}

/// Leadership of the in-flight refresh. Dropping it unsettled fails the
/// parked requests so the coordinator never stays stuck in `Refreshing`.
pub struct RefreshLeader<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl RefreshLeader<'_> {
    /// Return to `Idle` and release parked requests; returns how many were waiting
    pub fn settle(mut self, outcome: RefreshOutcome) -> usize {
        self.settled = true;
        self.coordinator.settle(outcome)
    }
}

impl Drop for RefreshLeader<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Refresh abandoned before completion");
            self.coordinator
                .settle(Err("Session refresh was abandoned".to_string()));
        }
    }
}
