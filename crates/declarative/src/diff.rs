//! Guard evaluation and pending-change reporting

use crate::context::Actuator;
use crate::planner::ExecutionPlan;
use crate::types::{ActionId, ActionKind, Guard, PlannedAction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether an action would run right now
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ActionStatus {
    /// Guard says the desired state already holds
    Satisfied,
    /// The action would run
    Pending,
    /// The guard could not be evaluated; the action would run
    Undetermined { error: String },
}

impl ActionStatus {
    pub fn would_run(&self) -> bool {
        !matches!(self, Self::Satisfied)
    }
}

/// Evaluate an action's guard
///
/// Unguarded actions always run. Evaluation errors are logged and count as
/// "not satisfied", so the mutation is attempted rather than silently skipped.
pub fn evaluate_guard(actuator: &dyn Actuator, guard: Option<&Guard>) -> ActionStatus {
    let Some(guard) = guard else {
        return ActionStatus::Pending;
    };

    match actuator.evaluate(&guard.check) {
        Ok(holds) if guard.skips(Some(holds)) => ActionStatus::Satisfied,
        Ok(_) => ActionStatus::Pending,
        Err(e) => {
            log::warn!("could not evaluate guard '{}': {:#}", guard.describe(), e);
            ActionStatus::Undetermined {
                error: format!("{:#}", e),
            }
        }
    }
}

/// Status of one planned action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDiff {
    pub id: ActionId,
    pub kind: ActionKind,
    pub description: String,
    /// Rendered guard, if any
    pub guard: Option<String>,
    #[serde(flatten)]
    pub status: ActionStatus,
}

impl ActionDiff {
    pub fn from_action(action: &PlannedAction, actuator: &dyn Actuator) -> Self {
        Self {
            id: action.id.clone(),
            kind: action.kind,
            description: action.description.clone(),
            guard: action.guard.as_ref().map(Guard::describe),
            status: evaluate_guard(actuator, action.guard.as_ref()),
        }
    }
}

/// Evaluate every guard in the plan without mutating anything
///
/// Actions are reported in dependency order.
pub fn compute_diffs(plan: &ExecutionPlan, actuator: &dyn Actuator) -> Vec<ActionDiff> {
    let ordered: Vec<&PlannedAction> = match plan.waves() {
        Ok(waves) => waves.into_iter().flatten().collect(),
        Err(_) => plan.iter().collect(),
    };
    ordered
        .into_iter()
        .map(|a| ActionDiff::from_action(a, actuator))
        .collect()
}

/// Diff summary statistics
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    /// Actions that would run
    pub pending: usize,
    /// Actions whose guard is satisfied
    pub satisfied: usize,
    /// Actions whose guard could not be evaluated
    pub undetermined: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs(diffs: &[ActionDiff]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            match diff.status {
                ActionStatus::Satisfied => summary.satisfied += 1,
                ActionStatus::Pending => summary.pending += 1,
                ActionStatus::Undetermined { .. } => summary.undetermined += 1,
            }
        }
        summary
    }

    /// Number of actions that would run
    pub fn total_changes(&self) -> usize {
        self.pending + self.undetermined
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total_changes() > 0
    }
}

/// Group diffs by action kind
pub fn group_by_kind(diffs: &[ActionDiff]) -> BTreeMap<&'static str, Vec<&ActionDiff>> {
    let mut groups: BTreeMap<&'static str, Vec<&ActionDiff>> = BTreeMap::new();
    for diff in diffs {
        groups.entry(diff.kind.as_str()).or_default().push(diff);
    }
    groups
}
