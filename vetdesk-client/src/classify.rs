//! Failure classification
//!
//! Maps every failed dispatch to exactly one [`FailureKind`]:
//!
//! | outcome                 | kind               |
//! |-------------------------|--------------------|
//! | 401                     | `Unauthorized`     |
//! | 429                     | `RateLimited`      |
//! | 5xx                     | `ServerTransient`  |
//! | other non-2xx           | `ClientError`      |
//! | no response             | `NetworkTransient` |
//! | timed out               | `Timeout`          |
//!
//! [`FailureKind`]: vetdesk_core::FailureKind

use crate::transport::{ApiResponse, TransportError};
use vetdesk_core::{ErrorContext, VetdeskError};

const MAX_BODY_IN_MESSAGE: usize = 200;

/// Error for a response, `None` when the status is 2xx
pub fn classify_response(response: &ApiResponse, operation: &str) -> Option<VetdeskError> {
    if response.is_success() {
        return None;
    }

    let status = response.status;
    let message = response_message(response);
    let context = ErrorContext::new("request_pipeline")
        .with_operation(operation)
        .with_metadata("status", &status.to_string());

    let error = match status {
        401 => VetdeskError::Unauthorized {
            message,
            context: context.with_suggestion("Sign in again"),
        },
        429 => VetdeskError::RateLimited {
            message,
            retry_after_ms: parse_retry_after(response.header("retry-after")),
            context: context.with_suggestion("Wait before sending more requests"),
        },
        500..=599 => VetdeskError::ServerTransient {
            status,
            message,
            context: context.with_suggestion("Check the backend status"),
        },
        _ => VetdeskError::ClientError {
            status,
            message,
            context: match status {
                403 => context.with_suggestion("Check the permissions of your role"),
                404 => context.with_suggestion("The resource does not exist"),
                _ => context,
            },
        },
    };

    Some(error)
}

/// Error for a dispatch that produced no response
pub fn classify_transport(error: TransportError, operation: &str) -> VetdeskError {
    match error {
        TransportError::Timeout(duration) => VetdeskError::Timeout {
            operation: operation.to_string(),
            duration_ms: duration.as_millis() as u64,
            context: ErrorContext::new("request_pipeline")
                .with_operation(operation)
                .with_suggestion("Check network connectivity"),
        },
        TransportError::Network { message, source } => VetdeskError::NetworkTransient {
            message,
            source,
            context: ErrorContext::new("request_pipeline")
                .with_operation(operation)
                .with_suggestion("Check network connectivity and the backend URL"),
        },
    }
}

/// `Retry-After` as delta-seconds, in milliseconds
pub fn parse_retry_after(value: Option<&str>) -> Option<u64> {
    value?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|seconds| seconds.saturating_mul(1000))
}

/// Human-readable reason: the backend's `message`/`detail`/`error` field,
/// else a short body, else the canonical status text.
fn response_message(response: &ApiResponse) -> String {
    if let Ok(body) = serde_json::from_str::<serde_json::Value>(&response.body) {
        let field = ["message", "detail", "error"]
            .iter()
            .find_map(|key| body.get(key).and_then(|value| value.as_str()));
        if let Some(message) = field {
            return message.to_string();
        }
    }

    let body = response.body.trim();
    if !body.is_empty() && body.len() <= MAX_BODY_IN_MESSAGE {
        return body.to_string();
    }

    reqwest::StatusCode::from_u16(response.status)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("Unknown error")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vetdesk_core::FailureKind;

    fn kind_of(status: u16) -> Option<FailureKind> {
        classify_response(&ApiResponse::new(status, ""), "test").map(|e| e.kind().unwrap())
    }

    #[test]
    fn test_status_classification_is_total() {
        assert_eq!(kind_of(200), None);
        assert_eq!(kind_of(204), None);
        assert_eq!(kind_of(401), Some(FailureKind::Unauthorized));
        assert_eq!(kind_of(429), Some(FailureKind::RateLimited));
        assert_eq!(kind_of(500), Some(FailureKind::ServerTransient));
        assert_eq!(kind_of(503), Some(FailureKind::ServerTransient));
        assert_eq!(kind_of(400), Some(FailureKind::ClientError));
        assert_eq!(kind_of(403), Some(FailureKind::ClientError));
        assert_eq!(kind_of(404), Some(FailureKind::ClientError));
        assert_eq!(kind_of(302), Some(FailureKind::ClientError));

        for status in 100..600 {
            let classified = kind_of(status);
            assert_eq!(classified.is_none(), (200..300).contains(&status));
        }
    }

    #[test]
    fn test_transport_failures() {
        let timeout = classify_transport(TransportError::Timeout(Duration::from_secs(30)), "get");
        assert_eq!(timeout.kind(), Some(FailureKind::Timeout));

        let network = classify_transport(TransportError::network("connection refused"), "get");
        assert_eq!(network.kind(), Some(FailureKind::NetworkTransient));
        assert!(network.is_transient());
    }

    #[test]
    fn test_retry_after_is_parsed() {
        let response = ApiResponse::new(429, "").with_header("Retry-After", "7");
        let error = classify_response(&response, "test").unwrap();
        assert_eq!(error.retry_after_ms(), Some(7000));

        assert_eq!(parse_retry_after(Some("soon")), None);
        assert_eq!(parse_retry_after(None), None);
    }

    #[test]
    fn test_message_prefers_backend_detail() {
        let response = ApiResponse::new(400, r#"{"detail": "Species is required"}"#);
        let error = classify_response(&response, "test").unwrap();
        assert!(error.to_string().contains("Species is required"));

        let error = classify_response(&ApiResponse::new(404, ""), "test").unwrap();
        assert!(error.to_string().contains("Not Found"));
    }
}
