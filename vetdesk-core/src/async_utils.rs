//! Async utilities and patterns
//!
//! Provides the backoff policy used for transient request failures and a
//! timeout wrapper for operations that must not hang the pipeline.

use crate::error::{ErrorContext, VetdeskError, VetdeskResult};
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Duration};
use tracing::debug;

/// Hard ceiling on transient retries per original dispatch
pub const MAX_TRANSIENT_RETRIES: u32 = 3;

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first dispatch
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_TRANSIENT_RETRIES,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Effective retry bound, never above [`MAX_TRANSIENT_RETRIES`]
    pub fn retry_limit(&self) -> u32 {
        self.max_retries.min(MAX_TRANSIENT_RETRIES)
    }

    /// Longest delay the bounded retries can ask for: `base × 2^(MAX-1)`
    pub fn longest_bounded_delay_ms(&self) -> u64 {
        self.base_delay_ms
            .saturating_mul(1u64 << (MAX_TRANSIENT_RETRIES - 1))
    }

    /// Delay before retry number `attempt` (1-based): `base × 2^(attempt-1)`.
    ///
    /// `max_delay_ms` never cuts into the first [`MAX_TRANSIENT_RETRIES`]
    /// delays, so those always strictly increase.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let cap = self.max_delay_ms.max(self.longest_bounded_delay_ms());
        let delay = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(cap);

        let actual_delay = if self.jitter {
            // ±10% keeps consecutive doublings strictly increasing
            let jitter_factor = 0.1;
            let jitter = (fastrand::f64() - 0.5) * 2.0 * jitter_factor;
            ((delay as f64) * (1.0 + jitter)) as u64
        } else {
            delay
        };

        debug!(attempt, delay_ms = actual_delay, "Computed retry backoff");
        Duration::from_millis(actual_delay)
    }
}

/// Timeout wrapper for async operations
pub async fn with_timeout<F, T>(future: F, timeout_ms: u64, operation_name: &str) -> VetdeskResult<T>
where
    F: std::future::Future<Output = T>,
{
    match timeout(Duration::from_millis(timeout_ms), future).await {
        Ok(result) => Ok(result),
        Err(_) => Err(VetdeskError::Timeout {
            operation: operation_name.to_string(),
            duration_ms: timeout_ms,
            context: ErrorContext::new("async_utils")
                .with_operation("timeout")
                .with_metadata("timeout_ms", &timeout_ms.to_string())
                .with_suggestion("Check network connectivity")
                .with_suggestion("Verify the backend is reachable"),
        }),
    }
}
