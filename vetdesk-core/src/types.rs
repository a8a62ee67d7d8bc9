//! Configuration data types

use crate::async_utils::RetryPolicy;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};

/// Top-level console configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub api: ApiConfig,
    pub retry: RetryPolicy,
    pub session: SessionConfig,
    pub routes: RoutesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the REST backend, e.g. `https://api.example.com/v1`
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_seconds: u64,
    /// Upper bound on a single refresh call in milliseconds
    pub refresh_timeout_ms: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory holding the persisted session record
    pub storage_dir: String,
    /// Pause between the "session expired" notice and the login redirect
    pub graceful_logout_delay_ms: u64,
    /// Consecutive connectivity failures before the console is considered offline
    pub offline_failure_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
    pub login_path: String,
    pub dashboard_path: String,
    pub admin_path: String,
    pub access_denied_path: String,
    /// Additional route declarations layered over the built-in table
    pub entries: Vec<RouteEntry>,
}

/// A route declaration as written in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub path: String,
    #[serde(default)]
    pub public: bool,
    /// Required role names; absent means any authenticated session
    #[serde(default)]
    pub roles: Option<Vec<String>>,
}
