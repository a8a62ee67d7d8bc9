//! Session Management
//!
//! The persisted session record, its storage backends and the store that
//! owns it.

pub mod storage;
pub mod store;

use crate::identity::{Identity, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use storage::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use store::{MigrationOutcome, SessionStore};

/// Key of the unified session record
pub const SESSION_KEY: &str = "vetdesk.session";

/// Keys of the pre-unification layout, consumed once by [`SessionStore::migrate`]
pub const LEGACY_TOKEN_KEY: &str = "auth_token";
pub const LEGACY_REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const LEGACY_USER_KEY: &str = "user_data";
pub const LEGACY_KEYS: [&str; 3] = [LEGACY_TOKEN_KEY, LEGACY_REFRESH_TOKEN_KEY, LEGACY_USER_KEY];

/// Authenticated session, persisted as
/// `{ "token", "refreshToken", "user", "loginTime" }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "token")]
    pub access_token: String,
    #[serde(rename = "refreshToken", default)]
    pub refresh_token: Option<String>,
    #[serde(rename = "user")]
    pub identity: Identity,
    /// Milliseconds since the Unix epoch
    #[serde(rename = "loginTime", default)]
    pub issued_at: i64,
}

impl Session {
    pub fn new(access_token: String, refresh_token: Option<String>, identity: Identity) -> Self {
        Self {
            access_token,
            refresh_token,
            identity,
            issued_at: Utc::now().timestamp_millis(),
        }
    }

    /// Non-empty access token and an identity id
    pub fn is_authenticated(&self) -> bool {
        !self.access_token.trim().is_empty() && self.identity.has_id()
    }

    pub fn role(&self) -> Role {
        self.identity.resolved_role()
    }

    pub fn user_id(&self) -> Option<String> {
        self.identity.user_id()
    }

    pub fn issued_at_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.issued_at)
    }
}
