//! Configuration management

use crate::error::{ErrorContext, VetdeskError, VetdeskResult};
use crate::types::{ApiConfig, ConsoleConfig, RoutesConfig, SessionConfig};

use std::path::{Path, PathBuf};

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            timeout_seconds: 30,
            refresh_timeout_ms: 10_000,
            user_agent: format!("vetdesk/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_dir: "~/.vetdesk/session".to_string(),
            graceful_logout_delay_ms: 2000,
            offline_failure_threshold: 3,
        }
    }
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            dashboard_path: "/dashboard".to_string(),
            admin_path: "/admin".to_string(),
            access_denied_path: "/access-denied".to_string(),
            entries: Vec::new(),
        }
    }
}

impl SessionConfig {
    /// Storage directory with a leading `~` expanded to the home directory
    pub fn resolved_storage_dir(&self) -> PathBuf {
        match self.storage_dir.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(&self.storage_dir)),
            None => PathBuf::from(&self.storage_dir),
        }
    }
}

impl ConsoleConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> VetdeskResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| VetdeskError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> VetdeskResult<Self> {
        let config: ConsoleConfig = toml::from_str(content).map_err(|e| VetdeskError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> VetdeskResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| VetdeskError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| VetdeskError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Default locations searched when no explicit config path is given
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|d| d.join("vetdesk").join("config.toml")),
            dirs::home_dir().map(|d| d.join(".vetdesk").join("config.toml")),
            Some(PathBuf::from("vetdesk.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Validate configuration
    pub fn validate(&self) -> VetdeskResult<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(invalid("api.base_url must not be empty", "Set api.base_url"));
        }

        if url::Url::parse(&self.api.base_url).is_err() {
            return Err(invalid(
                "api.base_url is not a valid URL",
                "Use an absolute URL such as https://api.example.com",
            ));
        }

        if self.api.timeout_seconds == 0 || self.api.refresh_timeout_ms == 0 {
            return Err(invalid(
                "API timeouts must be greater than 0",
                "Set api.timeout_seconds and api.refresh_timeout_ms to positive values",
            ));
        }

        if self.retry.base_delay_ms == 0 {
            return Err(invalid(
                "retry.base_delay_ms must be greater than 0",
                "Set retry.base_delay_ms to a positive value",
            ));
        }

        if self.retry.max_delay_ms < self.retry.longest_bounded_delay_ms() {
            return Err(invalid(
                "retry.max_delay_ms is shorter than the backoff it caps",
                &format!(
                    "Set retry.max_delay_ms to at least {} (4 × retry.base_delay_ms)",
                    self.retry.longest_bounded_delay_ms()
                ),
            ));
        }

        let routes = &self.routes;
        let mut paths = vec![
            routes.login_path.as_str(),
            routes.dashboard_path.as_str(),
            routes.admin_path.as_str(),
            routes.access_denied_path.as_str(),
        ];
        paths.extend(routes.entries.iter().map(|entry| entry.path.as_str()));

        if let Some(bad) = paths.iter().find(|path| !path.starts_with('/')) {
            return Err(invalid(
                &format!("Route path '{}' must start with '/'", bad),
                "Use absolute route paths",
            ));
        }

        Ok(())
    }
}

fn invalid(message: &str, suggestion: &str) -> VetdeskError {
    VetdeskError::Config {
        message: message.to_string(),
        source: None,
        context: ErrorContext::new("config")
            .with_operation("validate")
            .with_suggestion(suggestion),
    }
}
