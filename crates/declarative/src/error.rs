//! Error types for plan validation and actuation

use crate::types::ActionId;
use std::time::Duration;

/// Problems that make a plan unsafe to execute
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("duplicate action id: {0}")]
    DuplicateId(ActionId),

    #[error("mutating action {0} has no guard")]
    MissingGuard(ActionId),

    #[error("dependency cycle through action {0}")]
    Cycle(ActionId),
}

/// Failures reported by an actuator while performing an operation
#[derive(Debug, thiserror::Error)]
pub enum ActuationError {
    /// The operation ran and failed; worth retrying
    #[error("{0}")]
    Failed(String),

    /// The operation exceeded its timeout
    #[error("timed out after {}s: {what}", .after.as_secs())]
    TimedOut { what: String, after: Duration },

    /// The actuator cannot perform this operation on this host
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl ActuationError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Whether another attempt might succeed
    ///
    /// Timeouts are fatal for the action; only plain failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl From<std::io::Error> for ActuationError {
    fn from(err: std::io::Error) -> Self {
        Self::Failed(err.to_string())
    }
}

impl From<anyhow::Error> for ActuationError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(format!("{:#}", err))
    }
}
