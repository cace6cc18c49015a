//! Subcommands. Each loads the site config, detects facts, and plans
//! through [`prepare`] before doing its own thing with the plan.

pub mod apply;
pub mod facts;
pub mod plan;
pub mod status;

use anyhow::{Context as AnyhowContext, Result};
use stashkit::{Facts, PlanOutcome, Planner, ResourceFailure, Settings};
use std::path::{Path, PathBuf};

use crate::config::SiteConfig;
use crate::detect;
use crate::ui;

/// Everything a command needs after planning
pub struct Prepared {
    pub config: SiteConfig,
    pub config_path: Option<PathBuf>,
    pub facts: Facts,
    pub settings: Settings,
    pub outcome: PlanOutcome,
}

/// Load config, detect facts, and plan, restricted to `target` when given
pub fn prepare(config_path: Option<&Path>, target: Option<&str>) -> Result<Prepared> {
    let (config, config_path) = SiteConfig::load(config_path)?;
    let facts = detect::detect(&config.facts)?;
    let settings = config.settings(facts.kernel);

    let mut planner = Planner::new(&settings);
    planner.package(config.package_spec(&facts));
    for (name, spec) in config.plugin_specs() {
        planner.plugin(name, spec);
    }
    let outcome = restrict(planner.finish(), target);

    outcome
        .plan
        .validate()
        .context("Planned actions do not form a valid plan")?;

    Ok(Prepared {
        config,
        config_path,
        facts,
        settings,
        outcome,
    })
}

/// Keep only the actions and failures of `target`
fn restrict(mut outcome: PlanOutcome, target: Option<&str>) -> PlanOutcome {
    let Some(target) = target else {
        return outcome;
    };
    outcome.plan = std::mem::take(&mut outcome.plan).filter_by_target(Some(target));
    outcome
        .failures
        .retain(|f| failure_matches(&f.resource, target));
    outcome
}

/// Same target syntax as actions: `package`, `plugin`, `plugin.<name>`
fn failure_matches(resource: &str, target: &str) -> bool {
    let (kind, name) = match target.split_once('.') {
        Some((kind, name)) => (kind, Some(name)),
        None => (target, None),
    };
    let kind = kind.strip_suffix('s').unwrap_or(kind);
    match name {
        None => resource == kind || resource.starts_with(&format!("{}:", kind)),
        Some(name) => resource == format!("{}:{}", kind, name),
    }
}

/// Print planning failures; true when there were any
pub fn report_failures(failures: &[ResourceFailure]) -> bool {
    if failures.is_empty() {
        return false;
    }
    ui::section("Failed to plan");
    for failure in failures {
        ui::error(&format!("{}: {}", failure.resource, failure.error));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use stashkit::{Ensure, Kernel, OsFamily, PackageSpec, PluginSpec};

    fn outcome() -> PlanOutcome {
        let facts = Facts::for_family(OsFamily::Debian);
        let settings = Settings::for_kernel(Kernel::Linux);
        let mut planner = Planner::new(&settings);
        planner
            .package(PackageSpec::new("logstash", Ensure::Present, None, &facts))
            .plugin(
                "logstash-output-s3",
                PluginSpec::new("logstash-output-s3", "present", None, &[], None),
            )
            .plugin(
                "logstash-input-beats",
                PluginSpec::new("logstash-input-beats", "present", None, &[], None),
            )
            .plugin("broken", PluginSpec::new("broken", "sometimes", None, &[], None));
        planner.finish()
    }

    fn ids(outcome: &PlanOutcome) -> Vec<&str> {
        outcome.plan.iter().map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn test_restrict_to_one_plugin() {
        let outcome = restrict(outcome(), Some("plugin.logstash-output-s3"));
        assert_eq!(
            ids(&outcome),
            vec!["package:logstash", "plugin:logstash-output-s3:install"]
        );
        assert!(outcome.failures.is_empty());
        let external: Vec<String> = outcome
            .plan
            .external_requirements()
            .iter()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(external, vec![stashkit::package::INDEX_REFRESH]);
    }

    #[test]
    fn test_restrict_package_keeps_staging() {
        let facts = Facts::for_family(OsFamily::Debian);
        let settings = Settings::for_kernel(Kernel::Linux);
        let mut planner = Planner::new(&settings);
        planner.package(PackageSpec::new(
            "logstash",
            Ensure::Version("8.5.0".into()),
            Some("https://example.com/logstash-8.5.0-amd64.deb".into()),
            &facts,
        ));
        let outcome = restrict(planner.finish(), Some("package.logstash"));

        assert_eq!(ids(&outcome), vec!["package:stage", "package:logstash"]);
        assert!(
            !outcome
                .plan
                .external_requirements()
                .iter()
                .any(|id| id.as_str() == "package:stage")
        );
    }

    #[test]
    fn test_restrict_windows_plugin_keeps_tool_patch() {
        let facts = Facts::for_family(OsFamily::Windows);
        let settings = Settings::for_kernel(Kernel::Windows);
        let mut planner = Planner::new(&settings);
        planner
            .package(PackageSpec::new(
                "logstash",
                Ensure::Version("8.5.0".into()),
                None,
                &facts,
            ))
            .plugin(
                "logstash-output-s3",
                PluginSpec::new("logstash-output-s3", "present", None, &[], None),
            );
        let outcome = restrict(planner.finish(), Some("plugin.logstash-output-s3"));

        let kept = ids(&outcome);
        assert!(kept.contains(&stashkit::plugin::TOOL_PATCH_ID));
        assert!(kept.contains(&"package:extract"));
        assert!(outcome.plan.external_requirements().is_empty());
        assert!(outcome.plan.validate().is_ok());
    }

    #[test]
    fn test_restrict_keeps_matching_failures() {
        let outcome = restrict(outcome(), Some("plugins"));
        assert_eq!(outcome.plan.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].resource, "plugin:broken");
    }

    #[test]
    fn test_no_target_keeps_everything() {
        let outcome = restrict(outcome(), None);
        assert_eq!(outcome.plan.len(), 3);
        assert_eq!(outcome.failures.len(), 1);
    }

    #[test]
    fn test_failure_matches() {
        assert!(failure_matches("package:logstash", "package"));
        assert!(failure_matches("package", "package"));
        assert!(failure_matches("plugin:x", "plugin.x"));
        assert!(!failure_matches("plugin:xy", "plugin.x"));
        assert!(!failure_matches("plugin:x", "package"));
    }
}
