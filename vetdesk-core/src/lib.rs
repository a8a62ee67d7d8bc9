//! Vetdesk Core - shared infrastructure for the console client
//!
//! Errors and the failure taxonomy, retry/backoff policy, logging,
//! configuration and the typed event bus used by the auth and client crates.

pub mod async_utils;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod types;

pub use async_utils::*;
pub use error::*;
pub use events::*;
pub use logging::*;
pub use types::*;

// Re-export commonly used external types
pub use tokio;
pub use tracing;
