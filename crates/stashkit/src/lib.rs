//! # Stashkit
//!
//! Plans the guarded actions that install, upgrade, or remove the Logstash
//! package and its plugins on Linux and Windows hosts.
//!
//! Planning is pure: facts and desired state go in, an
//! [`ExecutionPlan`](declarative::ExecutionPlan) comes out. Running the plan
//! against a host is the job of a [`declarative::Actuator`].
//!
//! ## Example
//!
//! ```ignore
//! use stashkit::{Ensure, Facts, OsFamily, PackageSpec, Planner, PluginSpec, Settings};
//!
//! let facts = Facts::for_family(OsFamily::Debian);
//! let settings = Settings::for_kernel(facts.kernel);
//!
//! let mut planner = Planner::new(&settings);
//! planner.package(PackageSpec::new("logstash", Ensure::Present, None, &facts));
//! planner.plugin(
//!     "logstash-output-s3",
//!     PluginSpec::new("logstash-output-s3", "present", None, &[], None),
//! );
//! let outcome = planner.finish();
//! ```

pub mod desired;
pub mod error;
pub mod facts;
pub mod guard;
pub mod package;
pub mod plugin;
pub mod source;
pub mod step;
pub mod version;

#[cfg(test)]
mod testing;

pub use desired::{Ensure, PackageSpec, PluginSpec, Settings};
pub use error::{Error, Result};
pub use facts::{Facts, Kernel, OsFamily};
pub use guard::{annotate, build_guard};
pub use package::{PackagePlan, plan_package};
pub use plugin::plan_plugin;
pub use source::{ClassifiedSource, SourceKind, SourceUse, classify, classify_in};
pub use version::normalize;

use declarative::{ActionId, ExecutionPlan};
use serde::Serialize;

/// A resource whose planning failed, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceFailure {
    /// `package:<name>` or `plugin:<name>`; `package` when the package description itself was invalid
    pub resource: String,
    pub error: String,
}

/// Result of planning every declared resource.
///
/// Failures are per resource: the plan still holds the actions of every
/// resource that planned cleanly.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanOutcome {
    pub plan: ExecutionPlan,
    pub failures: Vec<ResourceFailure>,
}

impl PlanOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
enum PackageState {
    Undeclared,
    Planned { spec: PackageSpec, anchor: ActionId },
    Failed,
}

/// Accumulates package and plugin plans into one [`PlanOutcome`].
///
/// The package is declared first; each plugin then depends on the
/// package's anchor action.
#[derive(Debug)]
pub struct Planner<'a> {
    settings: &'a Settings,
    outcome: PlanOutcome,
    package: PackageState,
}

impl<'a> Planner<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self {
            settings,
            outcome: PlanOutcome::default(),
            package: PackageState::Undeclared,
        }
    }

    /// Plan the package. A construction or planning error is recorded as a failure.
    pub fn package(&mut self, spec: Result<PackageSpec>) -> &mut Self {
        let resource = spec
            .as_ref()
            .map_or_else(|_| "package".to_string(), |s| format!("package:{}", s.name));
        let planned = spec.and_then(|spec| {
            let plan = plan_package(&spec, self.settings)?;
            Ok((spec, plan))
        });

        match planned {
            Ok((spec, plan)) => {
                log::debug!("planned package {} ({} steps)", spec.name, plan.steps.len());
                self.outcome.plan.extend(annotate(plan.steps));
                self.package = PackageState::Planned {
                    spec,
                    anchor: plan.anchor,
                };
            }
            Err(e) => {
                log::warn!("{} plan failed: {}", resource, e);
                self.fail(resource, e.to_string());
                self.package = PackageState::Failed;
            }
        }
        self
    }

    /// Plan one plugin. `name` labels the failure when `spec` itself is an error.
    pub fn plugin(&mut self, name: &str, spec: Result<PluginSpec>) -> &mut Self {
        let resource = format!("plugin:{}", name);
        let planned = match &self.package {
            PackageState::Planned {
                spec: package,
                anchor,
            } => spec
                .and_then(|spec| plan_plugin(&spec, package, self.settings, anchor))
                .map_err(|e| e.to_string()),
            PackageState::Failed => Err("package plan failed".to_string()),
            PackageState::Undeclared => Err("no package declared".to_string()),
        };

        match planned {
            Ok(steps) => {
                log::debug!("planned {} ({} steps)", resource, steps.len());
                self.outcome.plan.extend(annotate(steps));
            }
            Err(error) => {
                log::warn!("{} plan failed: {}", resource, error);
                self.fail(resource, error);
            }
        }
        self
    }

    pub fn finish(self) -> PlanOutcome {
        self.outcome
    }

    fn fail(&mut self, resource: String, error: String) {
        self.outcome.failures.push(ResourceFailure { resource, error });
    }
}
