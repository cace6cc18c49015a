//! Planned steps before guards are attached.

use declarative::{CommandSpec, PackageEnsure, PlannedAction, Provider};
use std::path::PathBuf;

/// What a step is meant to achieve, in terms a guard can observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// The step produces `marker`; it is satisfied once the path exists
    Creates { marker: PathBuf },
    /// A package converges to `ensure`
    Package {
        name: String,
        provider: Provider,
        ensure: PackageEnsure,
    },
    /// A directory tree goes away
    RemoveDir { path: PathBuf },
    /// A plugin is listed in the manifest (at `version`, when pinned)
    PluginInstall {
        name: String,
        version: Option<String>,
        manifest: PathBuf,
        creates: Option<PathBuf>,
    },
    /// A plugin is no longer reported by `list`
    PluginRemove { name: String, list: CommandSpec },
    /// `path` ends up containing `line`
    LinePresent { path: PathBuf, line: String },
}

/// An unguarded action and the intent its guard is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub action: PlannedAction,
    pub intent: Intent,
}

impl Step {
    pub fn new(action: PlannedAction, intent: Intent) -> Self {
        Self { action, intent }
    }
}
