//! Error taxonomy for describers
//!
//! Describers return `anyhow::Result` like the rest of the crate. The variants
//! here are what callers can `downcast_ref` to when they need to tell a
//! provider rejection apart from a broken sink or a cancelled run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DescribeError {
    /// Provider answered with a non-2xx status
    #[error("API request failed: {status}")]
    Api { status: u16, message: String },

    /// Network failure before a status was received
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Payload did not match the expected shape
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Downstream sink refused a resource
    #[error("sink rejected resource {id}: {source}")]
    Sink {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("describe operation cancelled")]
    Cancelled,

    #[error("describe operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A producer or mapping task panicked
    #[error("describer task failed: {0}")]
    Task(String),
}

impl DescribeError {
    /// HTTP status for provider errors, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            DescribeError::Api { status, .. } => Some(*status),
            DescribeError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
