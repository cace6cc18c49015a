//! `lsconverge apply` - converge the host

use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{ApplyResult, ExecuteOptions, ExecuteSummary, execute};

use super::{prepare, report_failures};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::host::HostActuator;
use crate::progress::{PromptConfirm, SpinnerProgress};
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let prepared = prepare(args.config.as_deref(), args.target.as_deref())?;
    let plan = &prepared.outcome.plan;

    if !ctx.quiet {
        ui::header(if args.dry_run {
            "Logstash Apply (dry run)"
        } else {
            "Logstash Apply"
        });
        ui::kv(
            "Host",
            &format!("{} ({})", prepared.facts.os_family, prepared.facts.kernel),
        );
        ui::kv("Actions", &plan.len().to_string());
    }

    let opts = ExecuteOptions {
        dry_run: args.dry_run,
        jobs: usize::from(args.jobs.max(1)),
    };
    let actuator = HostActuator::new(prepared.config.puppet_root());
    let mut progress = SpinnerProgress::new(ctx.quiet);
    let mut confirm = PromptConfirm::new(args.yes);

    let started = chrono::Utc::now();
    let summary = execute(plan, &opts, &actuator, &mut progress, &mut confirm)?;
    let elapsed = chrono::Utc::now() - started;

    if args.dry_run {
        print_dry_run(&summary);
    } else {
        print_summary(&summary, &ui::format_elapsed(elapsed));
    }

    let planning_failed = report_failures(&prepared.outcome.failures);
    if !summary.is_success() {
        bail!("{} action(s) failed", summary.failed);
    }
    if planning_failed {
        bail!(
            "{} resource(s) could not be planned",
            prepared.outcome.failures.len()
        );
    }
    Ok(())
}

fn print_dry_run(summary: &ExecuteSummary) {
    let would_run: Vec<_> = summary
        .results
        .iter()
        .filter(|(_, r)| matches!(r, ApplyResult::Skipped { .. }))
        .collect();

    println!();
    if would_run.is_empty() {
        println!("  {} No changes needed", "✓".green());
        return;
    }
    for (id, _) in &would_run {
        println!("  {} {}", "+".yellow(), id);
    }
    println!();
    println!(
        "  {} Dry run - {} action(s) would run, no changes made",
        "ℹ".blue(),
        would_run.len()
    );
}

/// Print final summary
fn print_summary(summary: &ExecuteSummary, elapsed: &str) {
    println!();
    if summary.total_changes() == 0 && summary.is_success() && summary.skipped == 0 {
        println!("  {} Already converged ({})", "✓".green().bold(), elapsed);
        return;
    }

    if summary.is_success() {
        println!(
            "  {} Converged in {}",
            "✓".green().bold(),
            elapsed
        );
    } else {
        println!(
            "  {} Applied with errors in {}",
            "⚠".yellow().bold(),
            elapsed
        );
    }

    if summary.created > 0 {
        println!("    • {} actions created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} actions modified", summary.modified);
    }
    if summary.removed > 0 {
        println!("    • {} actions removed", summary.removed);
    }
    if summary.no_change > 0 {
        println!("    • {} already satisfied", summary.no_change);
    }
    if summary.skipped > 0 {
        println!("    • {} actions skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "actions".red());
        for (id, result) in &summary.results {
            if let ApplyResult::Failed { error } = result {
                ui::dim(&format!("  {}: {}", id, error));
            }
        }
    }
}
