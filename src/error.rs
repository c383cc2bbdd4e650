use std::time::Duration;

use thiserror::Error;

use crate::models::AssetId;

/// Engine-level failures.
///
/// Collaborators report their own errors through [`crate::Result`]; these
/// variants describe how the engine classified them.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A single feed pull or order placement exceeded its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Bounded retries used up; the cycle carries on without acting
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        last_error: String,
    },

    /// Programming-level fault; aborts the owning tracker only
    #[error("invariant violated for {asset}: {reason}")]
    InvariantViolation { asset: AssetId, reason: String },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl EngineError {
    pub fn invariant(asset: impl Into<AssetId>, reason: impl Into<String>) -> Self {
        EngineError::InvariantViolation {
            asset: asset.into(),
            reason: reason.into(),
        }
    }

    /// Transient failures are local to one cycle; everything else is not
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Timeout { .. } | EngineError::RetriesExhausted { .. }
        )
    }
}
