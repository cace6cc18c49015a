//! Actuator and callback traits
//!
//! These traits allow the declarative crate to be used without
//! depending on a specific host, terminal UI, or prompt library.

use crate::error::ActuationError;
use crate::types::{ActionId, ApplyResult, Check, Operation};
use anyhow::Result;
use std::time::Duration;

/// Executor of operations and evaluator of checks against a host
///
/// Implementations must be safe to call from several threads at once;
/// the executor never hands two actions with the same target to an
/// actuator concurrently.
pub trait Actuator: Send + Sync {
    /// Evaluate a check without changing anything
    ///
    /// Return an error when the check cannot be decided (missing manifest,
    /// failing query tool). Callers treat that as "not satisfied".
    fn evaluate(&self, check: &Check) -> Result<bool>;

    /// Perform one operation, bounded by `timeout` when given
    fn perform(&self, operation: &Operation, timeout: Option<Duration>)
    -> Result<(), ActuationError>;
}

/// Progress callback for execution operations
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback: Send {
    /// Called when starting a wave of mutually independent actions
    fn on_wave_start(&mut self, index: usize, count: usize);

    /// Called when starting to apply a single action
    fn on_action_start(&mut self, id: &ActionId, description: &str);

    /// Called when an action completes
    fn on_action_complete(&mut self, id: &ActionId, result: &ApplyResult);

    /// Called when a wave completes
    fn on_wave_complete(&mut self);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_wave_start(&mut self, _index: usize, _count: usize) {}
    fn on_action_start(&mut self, _id: &ActionId, _description: &str) {}
    fn on_action_complete(&mut self, _id: &ActionId, _result: &ApplyResult) {}
    fn on_wave_complete(&mut self) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}
