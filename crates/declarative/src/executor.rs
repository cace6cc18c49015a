//! Execution engine - applies guarded actions wave by wave with retry

use crate::context::{Actuator, ConfirmCallback, ProgressCallback};
use crate::diff::{ActionStatus, DiffSummary, compute_diffs, evaluate_guard};
use crate::planner::ExecutionPlan;
use crate::retry::with_retry;
use crate::types::{ActionId, ApplyResult, ExecuteOptions, ExecuteSummary, PlannedAction};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::HashMap;

/// Execute a plan with the given options and callbacks
///
/// # Arguments
/// * `plan` - The execution plan to run
/// * `opts` - Execution options (dry_run, jobs)
/// * `actuator` - Host executor for operations and checks
/// * `progress` - Progress callback
/// * `confirm` - Confirmation callback
///
/// # Returns
/// Summary of execution results. Failed actions are recorded in the
/// summary, not returned as errors; only an invalid plan is an error.
pub fn execute<P, C>(
    plan: &ExecutionPlan,
    opts: &ExecuteOptions,
    actuator: &dyn Actuator,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ExecuteSummary>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    plan.validate().context("Refusing to execute invalid plan")?;

    for external in plan.external_requirements() {
        log::info!("assuming external requirement {} is satisfied", external);
    }

    let diffs = compute_diffs(plan, actuator);
    let diff_summary = DiffSummary::from_diffs(&diffs);
    let mut summary = ExecuteSummary::default();

    if !diff_summary.has_changes() {
        for diff in &diffs {
            summary.add_result(&diff.id, &ApplyResult::NoChange);
        }
        return Ok(summary);
    }

    if opts.dry_run {
        for diff in &diffs {
            let result = match diff.status {
                ActionStatus::Satisfied => ApplyResult::NoChange,
                _ => ApplyResult::Skipped {
                    reason: "Dry run".to_string(),
                },
            };
            summary.add_result(&diff.id, &result);
        }
        return Ok(summary);
    }

    // Confirm before proceeding
    if !confirm.confirm(&format!(
        "Apply {} pending action(s)?",
        diff_summary.total_changes()
    ))? {
        for diff in &diffs {
            summary.add_result(
                &diff.id,
                &ApplyResult::Skipped {
                    reason: "Declined".to_string(),
                },
            );
        }
        return Ok(summary);
    }

    let waves = plan.waves()?;
    let mut outcomes: HashMap<ActionId, ApplyResult> = HashMap::new();

    for (index, wave) in waves.iter().enumerate() {
        progress.on_wave_start(index, wave.len());

        let mut runnable = Vec::with_capacity(wave.len());
        for action in wave {
            match blocked_by(action, &outcomes) {
                Some(dep) => {
                    let result = ApplyResult::Skipped {
                        reason: format!("dependency {} did not succeed", dep),
                    };
                    progress.on_action_start(&action.id, &action.description);
                    progress.on_action_complete(&action.id, &result);
                    outcomes.insert(action.id.clone(), result);
                }
                None => runnable.push(*action),
            }
        }

        for (id, result) in execute_wave(&runnable, opts.jobs, actuator, progress)? {
            outcomes.insert(id, result);
        }

        progress.on_wave_complete();
    }

    // Report in plan order
    for action in plan.iter() {
        if let Some(result) = outcomes.get(&action.id) {
            summary.add_result(&action.id, result);
        }
    }

    Ok(summary)
}

/// First in-plan dependency that failed or was skipped
fn blocked_by<'a>(
    action: &'a PlannedAction,
    outcomes: &HashMap<ActionId, ApplyResult>,
) -> Option<&'a ActionId> {
    action.depends_on.iter().find(|dep| {
        matches!(
            outcomes.get(*dep),
            Some(ApplyResult::Failed { .. } | ApplyResult::Skipped { .. })
        )
    })
}

/// Group actions by target so same-target actions stay sequential
fn group_by_target<'a>(actions: &[&'a PlannedAction]) -> Vec<Vec<&'a PlannedAction>> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&'a PlannedAction>> = HashMap::new();
    for action in actions {
        let target = action.operation.target();
        if !groups.contains_key(&target) {
            order.push(target.clone());
        }
        groups.entry(target).or_default().push(action);
    }
    order
        .into_iter()
        .filter_map(|t| groups.remove(&t))
        .collect()
}

/// Execute one wave of independent actions
fn execute_wave<P: ProgressCallback>(
    actions: &[&PlannedAction],
    jobs: usize,
    actuator: &dyn Actuator,
    progress: &mut P,
) -> Result<Vec<(ActionId, ApplyResult)>> {
    let groups = group_by_target(actions);

    if jobs <= 1 || groups.len() <= 1 {
        // Sequential execution
        let mut results = Vec::with_capacity(actions.len());
        for action in groups.into_iter().flatten() {
            progress.on_action_start(&action.id, &action.description);
            let result = apply_action(action, actuator);
            progress.on_action_complete(&action.id, &result);
            results.push((action.id.clone(), result));
        }
        return Ok(results);
    }

    // Parallel execution across targets. The progress callback is not
    // thread-safe, so results are reported after the wave finishes.
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .context("Failed to create thread pool")?;

    let results: Vec<(ActionId, ApplyResult)> = pool.install(|| {
        groups
            .par_iter()
            .flat_map_iter(|group| {
                group
                    .iter()
                    .map(|action| (action.id.clone(), apply_action(action, actuator)))
                    .collect::<Vec<_>>()
            })
            .collect()
    });

    for (id, result) in &results {
        progress.on_action_complete(id, result);
    }

    Ok(results)
}

/// Apply a single action: check its guard, then perform with retry
fn apply_action(action: &PlannedAction, actuator: &dyn Actuator) -> ApplyResult {
    if evaluate_guard(actuator, action.guard.as_ref()) == ActionStatus::Satisfied {
        log::debug!("{}: already satisfied", action.id);
        return ApplyResult::NoChange;
    }

    log::info!("{}: {}", action.id, action.operation.summary());

    let outcome = with_retry(
        &action.retry,
        |attempt, error| {
            log::warn!(
                "{}: attempt {}/{} failed: {}. Retrying in {}s...",
                action.id,
                attempt,
                action.retry.attempts,
                error,
                action.retry.delay.as_secs()
            );
        },
        || actuator.perform(&action.operation, action.timeout),
    );

    match outcome {
        Ok(()) => ApplyResult::for_kind(action.kind),
        Err(e) => {
            log::error!("{}: {}", action.id, e);
            ApplyResult::Failed {
                error: e.to_string(),
            }
        }
    }
}

/// Simple execution without progress reporting or confirmation
pub fn execute_simple(
    plan: &ExecutionPlan,
    opts: &ExecuteOptions,
    actuator: &dyn Actuator,
) -> Result<ExecuteSummary> {
    use crate::context::{AutoConfirm, NoProgress};

    execute(plan, opts, actuator, &mut NoProgress, &mut AutoConfirm)
}
