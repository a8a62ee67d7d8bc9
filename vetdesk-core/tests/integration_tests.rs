//! Integration tests for vetdesk-core infrastructure

use std::time::Duration;
use vetdesk_core::{
    config_error, storage_error, with_timeout, ConsoleConfig, ErrorContext, FailureKind,
    LogFormat, VetdeskError,
};

#[test]
fn test_error_classification() {
    let transient = VetdeskError::ServerTransient {
        status: 503,
        message: "Service unavailable".to_string(),
        context: ErrorContext::new("test"),
    };
    assert_eq!(transient.kind(), Some(FailureKind::ServerTransient));
    assert!(transient.is_transient());
    assert_eq!(transient.status(), Some(503));

    let forbidden = VetdeskError::ClientError {
        status: 403,
        message: "Forbidden".to_string(),
        context: ErrorContext::new("test"),
    };
    assert!(!forbidden.is_transient());
    assert!(forbidden.is_permission_denied());

    let limited = VetdeskError::RateLimited {
        message: "Slow down".to_string(),
        retry_after_ms: Some(5000),
        context: ErrorContext::new("test"),
    };
    assert!(!limited.is_transient());
    assert_eq!(limited.retry_after_ms(), Some(5000));

    let storage = storage_error!("disk full", "test_component");
    assert_eq!(storage.kind(), None);
    assert_eq!(
        storage.context().map(|c| c.component.as_str()),
        Some("test_component")
    );

    let config = config_error!("Invalid config", "test");
    assert!(!config.is_transient());
    assert!(config
        .context()
        .is_some_and(|c| !c.recovery_suggestions.is_empty()));

    // Logging must never panic, even without a subscriber
    storage.log();
    transient.log();
}

#[tokio::test(start_paused = true)]
async fn test_timeout_wrapper() {
    let fast = with_timeout(async { 42 }, 100, "fast_operation").await;
    assert_eq!(fast.unwrap(), 42);

    let slow = with_timeout(tokio::time::sleep(Duration::from_secs(5)), 100, "slow_operation").await;
    match slow {
        Err(VetdeskError::Timeout {
            operation,
            duration_ms,
            ..
        }) => {
            assert_eq!(operation, "slow_operation");
            assert_eq!(duration_ms, 100);
        }
        other => panic!("Expected timeout error, got {:?}", other),
    }
}

#[test]
fn test_config_from_toml() {
    let config = ConsoleConfig::from_toml_str(
        r#"
        [api]
        base_url = "https://clinic.example.com/api"

        [retry]
        base_delay_ms = 200

        [logging]
        format = "json"

        [[routes.entries]]
        path = "/accounting"
        roles = ["admin", "practitioner"]
        "#,
    )
    .unwrap();

    assert_eq!(config.api.base_url, "https://clinic.example.com/api");
    assert_eq!(config.api.timeout_seconds, 30);
    assert_eq!(config.retry.base_delay_ms, 200);
    assert_eq!(config.retry.max_retries, 3);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.routes.login_path, "/login");
    assert_eq!(config.routes.entries.len(), 1);
    assert_eq!(
        config.routes.entries[0].roles,
        Some(vec!["admin".to_string(), "practitioner".to_string()])
    );
}

#[test]
fn test_config_validation_rejects_bad_values() {
    let mut config = ConsoleConfig::default();
    assert!(config.validate().is_ok());

    config.api.base_url = "not a url".to_string();
    assert!(config.validate().is_err());

    let mut config = ConsoleConfig::default();
    config.routes.dashboard_path = "dashboard".to_string();
    assert!(config.validate().is_err());

    let mut config = ConsoleConfig::default();
    config.retry.base_delay_ms = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_rejects_cap_below_backoff() {
    for max_delay_ms in [0, 1500, 3999] {
        let toml = format!("[retry]\nbase_delay_ms = 1000\nmax_delay_ms = {}", max_delay_ms);
        let error = ConsoleConfig::from_toml_str(&toml).unwrap_err();
        assert!(matches!(error, VetdeskError::Config { .. }));
    }

    let config =
        ConsoleConfig::from_toml_str("[retry]\nbase_delay_ms = 1000\nmax_delay_ms = 4000").unwrap();
    let delays: Vec<Duration> = (1..=3).map(|attempt| config.retry.delay_for(attempt)).collect();
    assert!(delays.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn test_config_file_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = ConsoleConfig::default();
    config.session.graceful_logout_delay_ms = 750;
    config.save_to_file(&path).unwrap();

    let loaded = ConsoleConfig::from_file(&path).unwrap();
    assert_eq!(loaded.session.graceful_logout_delay_ms, 750);
    assert_eq!(loaded.retry, config.retry);
}
