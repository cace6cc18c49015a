//! `lsconverge plan` - print the guarded action plan without touching the host

use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{ActionId, ExecutionPlan, PlannedAction};
use serde::Serialize;
use stashkit::{Facts, ResourceFailure};
use std::collections::BTreeSet;

use super::{prepare, report_failures};
use crate::Context;
use crate::cli::{OutputFormat, PlanArgs};
use crate::ui;

/// Machine-readable plan
#[derive(Serialize)]
struct PlanReport<'a> {
    facts: &'a Facts,
    /// Action ids grouped into waves that may run concurrently
    waves: Vec<Vec<&'a ActionId>>,
    actions: &'a [PlannedAction],
    external_requirements: BTreeSet<ActionId>,
    failures: &'a [ResourceFailure],
}

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let prepared = prepare(args.config.as_deref(), args.target.as_deref())?;
    let plan = &prepared.outcome.plan;
    let failures = &prepared.outcome.failures;

    match args.format {
        OutputFormat::Json => {
            let report = PlanReport {
                facts: &prepared.facts,
                waves: plan
                    .waves()?
                    .into_iter()
                    .map(|wave| wave.into_iter().map(|a| &a.id).collect())
                    .collect(),
                actions: &plan.actions,
                external_requirements: plan.external_requirements(),
                failures,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            if !ctx.quiet {
                ui::header("Logstash Plan");
                if let Some(path) = &prepared.config_path {
                    ui::kv("Config", &path.display().to_string());
                }
                ui::kv(
                    "Host",
                    &format!(
                        "{} ({}, {})",
                        prepared.facts.os_family,
                        prepared.facts.kernel,
                        prepared.facts.provider()
                    ),
                );
                ui::kv("Home", &prepared.settings.home_dir.display().to_string());
            }
            print_plan(plan, ctx.verbose > 0)?;
            report_failures(failures);
        }
    }

    if !failures.is_empty() {
        bail!("{} resource(s) could not be planned", failures.len());
    }
    Ok(())
}

fn print_plan(plan: &ExecutionPlan, verbose: bool) -> Result<()> {
    if plan.is_empty() {
        println!();
        println!("  {} Nothing to plan", "ℹ".blue());
        return Ok(());
    }

    for (index, wave) in plan.waves()?.iter().enumerate() {
        ui::section(&format!("Wave {}", index + 1));
        for action in wave {
            println!(
                "  {} {:<40} {}",
                "•".cyan(),
                action.id.as_str(),
                action.description
            );
            if let Some(guard) = &action.guard {
                ui::dim(&format!("  {}", guard.describe()));
            }
            if verbose {
                ui::dim(&format!("  {}", action.operation.summary()));
                if !action.depends_on.is_empty() {
                    let deps: Vec<&str> = action.depends_on.iter().map(ActionId::as_str).collect();
                    ui::dim(&format!("  after {}", deps.join(", ")));
                }
            }
        }
    }

    let external = plan.external_requirements();
    if !external.is_empty() {
        ui::section("Assumed satisfied");
        for id in external {
            ui::dim(id.as_str());
        }
    }

    Ok(())
}
