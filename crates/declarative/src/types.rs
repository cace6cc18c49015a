//! Core types for guarded action plans

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

/// Stable identifier of a planned action
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ActionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Category of a planned action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Fetch a file to a local path
    Download,
    /// Extract or copy into a staging/install location
    ExtractStage,
    /// Install a package or plugin
    Install,
    /// Remove a package, plugin, or directory
    Remove,
    /// Edit an existing file in place
    PatchFile,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::ExtractStage => "extract",
            Self::Install => "install",
            Self::Remove => "remove",
            Self::PatchFile => "patch",
        }
    }

    /// Every kind changes host state and therefore needs a guard
    pub fn is_mutating(&self) -> bool {
        true
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Package manager used to converge a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Apt,
    Dpkg,
    Yum,
    Rpm,
    Zypper,
    Pacman,
    Windows,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apt => "apt",
            Self::Dpkg => "dpkg",
            Self::Yum => "yum",
            Self::Rpm => "rpm",
            Self::Zypper => "zypper",
            Self::Pacman => "pacman",
            Self::Windows => "windows",
        }
    }

    /// Whether the provider installs from a local file rather than a repository
    pub fn is_file_based(&self) -> bool {
        matches!(self, Self::Dpkg | Self::Rpm)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "apt" => Ok(Self::Apt),
            "dpkg" => Ok(Self::Dpkg),
            "yum" | "dnf" => Ok(Self::Yum),
            "rpm" => Ok(Self::Rpm),
            "zypper" => Ok(Self::Zypper),
            "pacman" => Ok(Self::Pacman),
            "windows" => Ok(Self::Windows),
            other => Err(format!("unknown package provider '{}'", other)),
        }
    }
}

/// Desired state handed to a package provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "version")]
pub enum PackageEnsure {
    Present,
    Latest,
    Version(String),
    Absent,
    /// Absent, including configuration remnants
    Purged,
}

impl PackageEnsure {
    pub fn is_removal(&self) -> bool {
        matches!(self, Self::Absent | Self::Purged)
    }
}

impl fmt::Display for PackageEnsure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => f.write_str("present"),
            Self::Latest => f.write_str("latest"),
            Self::Version(v) => f.write_str(v),
            Self::Absent => f.write_str("absent"),
            Self::Purged => f.write_str("purged"),
        }
    }
}

/// A structured command: program plus argument vector, never a shell string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Environment overlay, applied in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<(String, String)>,
    /// Account to run the command as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            user: None,
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Render for display only; execution always uses the argv
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// What an actuator does for one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum Operation {
    /// Fetch `source` (URI or path) to a local `dest`
    Fetch { source: String, dest: PathBuf },
    /// Extract an archive into `dest`
    Extract { archive: PathBuf, dest: PathBuf },
    /// Converge a package through a provider
    Package {
        name: String,
        ensure: PackageEnsure,
        provider: Provider,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<PathBuf>,
    },
    /// Delete a directory tree
    RemoveDir { path: PathBuf },
    /// Run a command
    Exec(CommandSpec),
    /// Append a line to an existing file
    AppendLine { path: PathBuf, line: String },
}

impl Operation {
    /// The host object this operation mutates
    ///
    /// Two actions with the same target must never run concurrently.
    pub fn target(&self) -> String {
        match self {
            Self::Fetch { dest, .. } => path_target(dest),
            Self::Extract { dest, .. } => path_target(dest),
            Self::Package { name, .. } => format!("package:{}", name),
            Self::RemoveDir { path } => path_target(path),
            Self::Exec(cmd) => format!("exec:{}", cmd.program),
            Self::AppendLine { path, .. } => path_target(path),
        }
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        match self {
            Self::Fetch { source, dest } => format!("fetch {} -> {}", source, dest.display()),
            Self::Extract { archive, dest } => {
                format!("extract {} -> {}", archive.display(), dest.display())
            }
            Self::Package {
                name,
                ensure,
                provider,
                source,
            } => match source {
                Some(file) => format!(
                    "package {} ensure={} provider={} source={}",
                    name,
                    ensure,
                    provider,
                    file.display()
                ),
                None => format!("package {} ensure={} provider={}", name, ensure, provider),
            },
            Self::RemoveDir { path } => format!("remove directory {}", path.display()),
            Self::Exec(cmd) => cmd.display(),
            Self::AppendLine { path, line } => format!("append '{}' to {}", line, path.display()),
        }
    }
}

fn path_target(path: &Path) -> String {
    format!("path:{}", path.display())
}

/// A boolean observation of host state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "check")]
pub enum Check {
    /// The path exists
    PathExists { path: PathBuf },
    /// Some line of the file matches the regex `pattern`
    ///
    /// A missing file is an evaluation error, not `false`.
    FileContainsLine { path: PathBuf, pattern: String },
    /// The command succeeds and prints `line` as one of its output lines
    CommandListsLine { command: CommandSpec, line: String },
    /// The package is installed (at `version`, when given)
    PackageInstalled {
        name: String,
        provider: Provider,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    /// The package is installed and no newer version is available
    PackageLatest { name: String, provider: Provider },
    /// At least one of the checks holds
    Any { checks: Vec<Check> },
}

impl Check {
    pub fn describe(&self) -> String {
        match self {
            Self::PathExists { path } => format!("{} exists", path.display()),
            Self::FileContainsLine { path, pattern } => {
                format!("{} has a line matching /{}/", path.display(), pattern)
            }
            Self::CommandListsLine { command, line } => {
                format!("`{}` lists {}", command.display(), line)
            }
            Self::PackageInstalled {
                name,
                version: Some(v),
                ..
            } => format!("package {} {} installed", name, v),
            Self::PackageInstalled { name, .. } => format!("package {} installed", name),
            Self::PackageLatest { name, .. } => format!("package {} up to date", name),
            Self::Any { checks } => checks
                .iter()
                .map(Check::describe)
                .collect::<Vec<_>>()
                .join(" or "),
        }
    }
}

/// How a guard's check relates to skipping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardPolarity {
    /// Skip the action when the check holds
    Unless,
    /// Run the action only when the check holds
    OnlyIf,
}

/// Idempotence precondition attached to a mutating action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guard {
    pub polarity: GuardPolarity,
    pub check: Check,
}

impl Guard {
    pub fn unless(check: Check) -> Self {
        Self {
            polarity: GuardPolarity::Unless,
            check,
        }
    }

    pub fn only_if(check: Check) -> Self {
        Self {
            polarity: GuardPolarity::OnlyIf,
            check,
        }
    }

    /// Whether the action should be skipped given the check outcome
    ///
    /// `None` means the check could not be evaluated; the action then runs.
    pub fn skips(&self, outcome: Option<bool>) -> bool {
        match (self.polarity, outcome) {
            (_, None) => false,
            (GuardPolarity::Unless, Some(holds)) => holds,
            (GuardPolarity::OnlyIf, Some(holds)) => !holds,
        }
    }

    pub fn describe(&self) -> String {
        match self.polarity {
            GuardPolarity::Unless => format!("unless {}", self.check.describe()),
            GuardPolarity::OnlyIf => format!("only if {}", self.check.describe()),
        }
    }
}

/// Fixed-count, fixed-delay retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    #[serde(with = "duration_secs")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

/// One unit of work in a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub id: ActionId,
    pub kind: ActionKind,
    pub description: String,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Guard>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<ActionId>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_duration_secs"
    )]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl PlannedAction {
    /// Create an unguarded action with the default retry policy
    pub fn new(
        id: impl Into<ActionId>,
        kind: ActionKind,
        description: impl Into<String>,
        operation: Operation,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            description: description.into(),
            operation,
            guard: None,
            depends_on: BTreeSet::new(),
            timeout: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn depends_on(mut self, id: impl Into<ActionId>) -> Self {
        self.depends_on.insert(id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }
}

/// Result of applying one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// Guard was satisfied; nothing to do
    NoChange,
    /// Something was created or installed
    Created,
    /// Something existing was changed
    Modified,
    /// Something was removed
    Removed,
    /// Apply failed
    Failed { error: String },
    /// Apply was skipped
    Skipped { reason: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// The result a successful mutation of this kind reports
    pub fn for_kind(kind: ActionKind) -> Self {
        match kind {
            ActionKind::Download | ActionKind::ExtractStage | ActionKind::Install => Self::Created,
            ActionKind::PatchFile => Self::Modified,
            ActionKind::Remove => Self::Removed,
        }
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
    /// Per-action results in execution order
    #[serde(default)]
    pub results: Vec<(ActionId, ApplyResult)>,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of actions processed
    pub fn total(&self) -> usize {
        self.created + self.modified + self.removed + self.skipped + self.failed + self.no_change
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, id: &ActionId, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
        self.results.push((id.clone(), result.clone()));
    }

    /// Result recorded for an action, if it ran
    pub fn result_of(&self, id: &ActionId) -> Option<&ApplyResult> {
        self.results.iter().find(|(i, _)| i == id).map(|(_, r)| r)
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Number of parallel jobs within a wave
    pub jobs: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
        }
    }
}

/// Output from an executed command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
        }
    }
}

impl CommandOutput {
    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod opt_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}
