//! # Declarative
//!
//! A framework for executing plans of guarded, idempotent actions.
//!
//! This crate provides the core abstractions for describing the steps that
//! converge a host to a desired state, ordering them, and running each one
//! only when its precondition says the host is not there yet.
//!
//! ## Core Concepts
//!
//! - **PlannedAction**: One operation (fetch, extract, package, exec, ...)
//!   with a guard, dependencies, a timeout and a retry policy
//! - **Guard**: A [`Check`] plus a polarity (`unless` / `only if`) deciding
//!   whether the action is already satisfied
//! - **ExecutionPlan**: A DAG of actions, validated and split into waves
//! - **Executor**: Applies waves, serializing actions on the same target
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     ActionKind, Check, ExecuteOptions, ExecutionPlan, Guard, Operation,
//!     PlannedAction, execute_simple,
//! };
//!
//! let mut plan = ExecutionPlan::new();
//! plan.add(
//!     PlannedAction::new(
//!         "package:stage",
//!         ActionKind::Download,
//!         "Download logstash package",
//!         Operation::Fetch {
//!             source: "https://example.com/logstash-8.5.0-amd64.deb".into(),
//!             dest: "/tmp/logstash-8.5.0-amd64.deb".into(),
//!         },
//!     )
//!     .with_guard(Guard::unless(Check::PathExists {
//!         path: "/tmp/logstash-8.5.0-amd64.deb".into(),
//!     })),
//! );
//!
//! let summary = execute_simple(&plan, &ExecuteOptions::default(), &host_actuator)?;
//! ```
//!
//! ## Provider Traits
//!
//! - [`Actuator`]: Performs operations and evaluates checks on a host
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod planner;
pub mod retry;
pub mod types;

// Re-export main types at crate root
pub use context::{
    Actuator, AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback,
};
pub use diff::{
    ActionDiff, ActionStatus, DiffSummary, compute_diffs, evaluate_guard, group_by_kind,
};
pub use error::{ActuationError, PlanError};
pub use executor::{execute, execute_simple};
pub use planner::ExecutionPlan;
pub use retry::with_retry;
pub use types::{
    ActionId, ActionKind, ApplyResult, Check, CommandOutput, CommandSpec, ExecuteOptions,
    ExecuteSummary, Guard, GuardPolarity, Operation, PackageEnsure, PlannedAction, Provider,
    RetryPolicy,
};
