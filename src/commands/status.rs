//! `lsconverge status` - evaluate every guard and show what apply would do

use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{ActionDiff, ActionStatus, DiffSummary, compute_diffs, group_by_kind};

use super::{prepare, report_failures};
use crate::Context;
use crate::cli::StatusArgs;
use crate::host::HostActuator;
use crate::ui;

pub fn run(ctx: &Context, args: StatusArgs) -> Result<()> {
    let prepared = prepare(args.config.as_deref(), args.target.as_deref())?;
    let actuator = HostActuator::new(prepared.config.puppet_root());

    let diffs = compute_diffs(&prepared.outcome.plan, &actuator);
    let summary = DiffSummary::from_diffs(&diffs);

    if !ctx.quiet {
        ui::header("Logstash Status");
    }
    display_diffs(&diffs, ctx.verbose > 0);

    println!();
    if summary.has_changes() {
        ui::info(&format!(
            "{} pending, {} undetermined, {} satisfied",
            summary.pending.to_string().yellow(),
            summary.undetermined.to_string().red(),
            summary.satisfied.to_string().green()
        ));
    } else if !diffs.is_empty() {
        ui::success("Converged");
    }

    if report_failures(&prepared.outcome.failures) {
        bail!(
            "{} resource(s) could not be planned",
            prepared.outcome.failures.len()
        );
    }
    Ok(())
}

fn status_symbol(status: &ActionStatus) -> colored::ColoredString {
    match status {
        ActionStatus::Satisfied => "✓".green(),
        ActionStatus::Pending => "+".yellow(),
        ActionStatus::Undetermined { .. } => "?".red(),
    }
}

fn display_diffs(diffs: &[ActionDiff], verbose: bool) {
    if diffs.is_empty() {
        println!();
        println!("  {} No actions planned", "ℹ".blue());
        return;
    }

    for (kind, group) in group_by_kind(diffs) {
        ui::section(kind);
        for diff in group {
            println!(
                "  {} {:<40} {}",
                status_symbol(&diff.status),
                diff.id.as_str(),
                diff.description.dimmed()
            );
            match &diff.status {
                ActionStatus::Undetermined { error } => ui::dim(&format!("  {}", error)),
                _ if verbose => {
                    if let Some(guard) = &diff.guard {
                        ui::dim(&format!("  {}", guard));
                    }
                }
                _ => {}
            }
        }
    }
}
