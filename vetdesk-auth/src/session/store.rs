//! Session Store - sole holder of credentials and identity
//!
//! Readers never see a parse error: a missing, corrupted or incomplete record
//! reads as "no session". Writes go through one lock so the persisted record
//! and the in-memory mirror change together.

use super::{
    KeyValueStore, Session, LEGACY_KEYS, LEGACY_REFRESH_TOKEN_KEY, LEGACY_TOKEN_KEY,
    LEGACY_USER_KEY, SESSION_KEY,
};
use crate::identity::Identity;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vetdesk_core::{
    ConsoleEvent, ErrorContext, EventBus, SessionChange, VetdeskError, VetdeskResult,
};

/// Result of a [`SessionStore::migrate`] run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// A unified record already exists; nothing was touched
    AlreadyUnified,
    /// No legacy keys were found
    NothingToMigrate,
    /// Legacy keys were folded into a unified record and removed
    Migrated,
    /// Legacy keys lacked a token or user id; they were removed without a record
    DiscardedIncomplete,
}

pub struct SessionStore {
    storage: Arc<dyn KeyValueStore>,
    mirror: RwLock<Option<Session>>,
    events: EventBus,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStore>, events: EventBus) -> Self {
        Self {
            storage,
            mirror: RwLock::new(None),
            events,
        }
    }

    /// Construct the store at process start and run the one-time migration
    pub fn init(storage: Arc<dyn KeyValueStore>, events: EventBus) -> VetdeskResult<Self> {
        let store = Self::new(storage, events);

        let outcome = store.migrate()?;
        let session = store.get();
        info!(
            migration = ?outcome,
            authenticated = session.is_some(),
            "Session store initialized"
        );

        Ok(store)
    }

    /// Current session, read from storage.
    ///
    /// Never fails. Malformed or incomplete records yield `None`. If the
    /// backend itself cannot be read, the last value this store wrote is
    /// returned.
    pub fn get(&self) -> Option<Session> {
        let mut mirror = self.mirror.write();

        match self.load_persisted() {
            Ok(session) => {
                *mirror = session.clone();
                session
            }
            Err(e) => {
                e.log();
                mirror.clone()
            }
        }
    }

    /// Replace the session (explicit login)
    pub fn set(&self, session: Session) -> VetdeskResult<()> {
        let user_id = session.user_id().unwrap_or_default();
        self.write(session)?;
        self.publish(SessionChange::SignedIn { user_id });
        Ok(())
    }

    /// Install refreshed credentials, keeping the identity
    pub fn replace_tokens(
        &self,
        access_token: String,
        refresh_token: Option<String>,
    ) -> VetdeskResult<Session> {
        let current = self.get().ok_or_else(|| VetdeskError::RefreshFailure {
            message: "Session was cleared while refreshing".to_string(),
            context: ErrorContext::new("session_store").with_operation("replace_tokens"),
        })?;

        let refresh_token = refresh_token.or(current.refresh_token);
        let session = Session::new(access_token, refresh_token, current.identity);
        self.write(session.clone())?;
        self.publish(SessionChange::Refreshed);
        Ok(session)
    }

    /// Explicit profile update: swap the identity, keep tokens and login time.
    ///
    /// Returns `Ok(false)` when there is no session to update.
    pub fn update_identity(&self, identity: Identity) -> VetdeskResult<bool> {
        let Some(mut session) = self.get() else {
            debug!("Profile update ignored, no session");
            return Ok(false);
        };

        session.identity = identity;
        self.write(session)?;
        self.publish(SessionChange::ProfileUpdated);
        Ok(true)
    }

    /// Remove the session; clearing an empty store succeeds
    pub fn clear(&self) -> VetdeskResult<()> {
        {
            let mut mirror = self.mirror.write();
            self.storage.remove(SESSION_KEY)?;
            *mirror = None;
        }

        debug!("Session cleared");
        self.publish(SessionChange::Cleared);
        Ok(())
    }

    /// End of the session lifecycle (logout)
    pub fn teardown(&self) -> VetdeskResult<()> {
        info!("Tearing down session");
        self.clear()
    }

    /// Fold the legacy multi-key layout into the unified record, once.
    pub fn migrate(&self) -> VetdeskResult<MigrationOutcome> {
        let mut mirror = self.mirror.write();

        if self.storage.get(SESSION_KEY)?.is_some() {
            return Ok(MigrationOutcome::AlreadyUnified);
        }

        let token = legacy_value(self.storage.get(LEGACY_TOKEN_KEY)?);
        let refresh_token = legacy_value(self.storage.get(LEGACY_REFRESH_TOKEN_KEY)?);
        let user = legacy_value(self.storage.get(LEGACY_USER_KEY)?);

        if token.is_none() && refresh_token.is_none() && user.is_none() {
            return Ok(MigrationOutcome::NothingToMigrate);
        }

        let identity = user.and_then(|raw| match serde_json::from_str::<Identity>(&raw) {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!(error = %e, "Legacy user payload is not valid JSON");
                None
            }
        });

        let candidate = token
            .zip(identity)
            .map(|(token, identity)| Session::new(token, refresh_token, identity))
            .filter(Session::is_authenticated);

        let outcome = match candidate {
            Some(session) => {
                let raw = serde_json::to_string(&session)?;
                self.storage.set(SESSION_KEY, &raw)?;
                *mirror = Some(session);
                MigrationOutcome::Migrated
            }
            None => {
                warn!("Legacy session is incomplete, discarding it");
                MigrationOutcome::DiscardedIncomplete
            }
        };

        for key in LEGACY_KEYS {
            self.storage.remove(key)?;
        }

        info!(outcome = ?outcome, "Legacy session layout migrated");
        Ok(outcome)
    }

    fn write(&self, session: Session) -> VetdeskResult<()> {
        if !session.is_authenticated() {
            return Err(VetdeskError::MalformedSession {
                message: "Refusing to store a session without access token or user id"
                    .to_string(),
                context: ErrorContext::new("session_store").with_operation("write"),
            });
        }

        let raw = serde_json::to_string(&session)?;

        let mut mirror = self.mirror.write();
        self.storage.set(SESSION_KEY, &raw)?;
        *mirror = Some(session);
        Ok(())
    }

    fn load_persisted(&self) -> VetdeskResult<Option<Session>> {
        let Some(raw) = self.storage.get(SESSION_KEY)? else {
            return Ok(None);
        };

        match parse_session(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                e.log();
                Ok(None)
            }
        }
    }

    fn publish(&self, change: SessionChange) {
        self.events.publish(ConsoleEvent::SessionChanged(change));
    }
}

fn parse_session(raw: &str) -> VetdeskResult<Session> {
    let session: Session =
        serde_json::from_str(raw).map_err(|e| VetdeskError::MalformedSession {
            message: format!("Stored session is not a valid record: {}", e),
            context: ErrorContext::new("session_store").with_operation("parse"),
        })?;

    if !session.is_authenticated() {
        return Err(VetdeskError::MalformedSession {
            message: "Stored session has no access token or user id".to_string(),
            context: ErrorContext::new("session_store").with_operation("parse"),
        });
    }

    Ok(session)
}

/// Normalise a legacy value: JSON-quoted strings are unquoted, and the
/// literal placeholders browsers leave behind count as absent.
fn legacy_value(raw: Option<String>) -> Option<String> {
    let raw = raw?;
    let trimmed = raw.trim();

    let value = if trimmed.starts_with('"') {
        serde_json::from_str::<String>(trimmed).ok()?
    } else {
        trimmed.to_string()
    };

    match value.as_str() {
        "" | "null" | "undefined" => None,
        _ => Some(value),
    }
}
