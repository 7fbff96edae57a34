//! Error types for the execution core.
//!
//! Two failure modes are deliberately NOT errors: a standard-tier task
//! dropped under saturation (its handle simply never resolves) and a
//! scoring lock that could not be acquired within its wait window
//! (`score` returns `Ok(None)`).

use crate::task::Tier;

/// Result alias used throughout the crate.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by the execution core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Privileged pool saturated; the submission was rejected synchronously.
    /// Retryable.
    #[error("capacity rejected: {tier} pool is saturated")]
    CapacityRejected { tier: Tier },

    /// The dispatcher has been shut down and no longer accepts work.
    #[error("dispatcher is shut down")]
    Shutdown,

    /// The upstream generation service failed.
    #[error("upstream generation failure: {message}")]
    Upstream { message: String },

    /// A push-sink write failed mid-stream; fatal to the task.
    #[error("push delivery failure: {message}")]
    Delivery { message: String },

    /// The generation response contained no well-formed `{...}` span.
    #[error("malformed generation payload: {detail}")]
    MalformedPayload { detail: String },

    /// Scoring collaborator data (question set) could not be fetched.
    #[error("scoring data access failure: {message}")]
    ScoringData { message: String },

    /// Invalid or unreadable configuration.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
        }
    }

    pub fn malformed_payload(detail: impl Into<String>) -> Self {
        Self::MalformedPayload {
            detail: detail.into(),
        }
    }

    pub fn scoring_data(message: impl Into<String>) -> Self {
        Self::ScoringData {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether the caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CapacityRejected { .. })
    }
}
