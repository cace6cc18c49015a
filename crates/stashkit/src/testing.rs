//! In-memory host used to run plans end to end.

use crate::desired::{Ensure, PackageSpec, PluginSpec, Settings};
use crate::facts::{Facts, OsFamily};
use crate::{PlanOutcome, Planner};
use declarative::{
    ActionId, ActionStatus, ActuationError, Actuator, Check, CommandSpec, ExecuteOptions,
    Operation, PackageEnsure, Provider, RetryPolicy, compute_diffs, execute_simple,
};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct HostState {
    /// Files by path; directories exist implicitly through their contents
    files: BTreeMap<PathBuf, String>,
    /// Repository and file installed packages with their versions
    packages: BTreeMap<String, String>,
    /// Windows program registrations
    registered: BTreeSet<String>,
}

/// Host whose package managers, plugin tool and filesystem live in memory.
pub(crate) struct SimHost {
    home: PathBuf,
    available: String,
    state: Mutex<HostState>,
    mutations: Mutex<Vec<String>>,
}

impl SimHost {
    pub(crate) fn new(home: impl Into<PathBuf>, available: &str) -> Self {
        Self {
            home: home.into(),
            available: available.to_string(),
            state: Mutex::new(HostState::default()),
            mutations: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_file(self, path: impl Into<PathBuf>, content: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.into(), content.to_string());
        self
    }

    pub(crate) fn with_registration(self, name: &str) -> Self {
        self.state.lock().unwrap().registered.insert(name.to_string());
        self
    }

    pub(crate) fn mutations(&self) -> usize {
        self.mutations.lock().unwrap().len()
    }

    pub(crate) fn file(&self, path: impl AsRef<Path>) -> Option<String> {
        self.state.lock().unwrap().files.get(path.as_ref()).cloned()
    }

    fn exists(state: &HostState, path: &Path) -> bool {
        state.files.keys().any(|file| file.starts_with(path))
    }

    fn run(&self, state: &mut HostState, cmd: &CommandSpec) -> Result<Vec<String>, String> {
        let tool = Path::new(&cmd.program);
        let home = tool
            .parent()
            .and_then(Path::parent)
            .ok_or_else(|| format!("{}: not found", cmd.program))?;
        if !state.files.contains_key(tool) {
            return Err(format!("{}: not found", cmd.program));
        }
        let manifest = home.join("Gemfile");
        let gems = state
            .files
            .get_mut(&manifest)
            .ok_or_else(|| format!("{} missing", manifest.display()))?;

        let args: Vec<&str> = cmd.args.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["list", filter @ ..] => Ok(gems
                .lines()
                .filter_map(gem_of)
                .filter(|name| filter.first().is_none_or(|f| name.starts_with(f)))
                .map(String::from)
                .collect()),
            ["install", rest @ ..] => {
                let (version, target) = match rest {
                    ["--version", version, target] => (Some(*version), *target),
                    [target] => (None, *target),
                    _ => return Err("usage: install [--version V] PLUGIN".to_string()),
                };
                if target.starts_with('/') || target.starts_with("file://") {
                    let local = target.trim_start_matches("file://");
                    if !state.files.contains_key(Path::new(local)) {
                        return Err(format!("{} not found", local));
                    }
                }
                let name = gem_name(target);
                let gems = state
                    .files
                    .get_mut(&manifest)
                    .ok_or_else(|| format!("{} missing", manifest.display()))?;
                let mut lines: Vec<String> = gems
                    .lines()
                    .filter(|line| gem_of(line) != Some(name))
                    .map(String::from)
                    .collect();
                lines.push(match version {
                    Some(v) => format!("gem \"{}\", \"{}\"", name, v),
                    None => format!("gem \"{}\"", name),
                });
                *gems = lines.join("\n") + "\n";
                Ok(Vec::new())
            }
            ["remove", name] => {
                if !gems.lines().any(|line| gem_of(line) == Some(*name)) {
                    return Err(format!("{} is not installed", name));
                }
                let kept: Vec<&str> = gems
                    .lines()
                    .filter(|line| gem_of(line) != Some(*name))
                    .collect();
                *gems = kept.join("\n");
                Ok(Vec::new())
            }
            _ => Err(format!("unknown command: {}", cmd.display())),
        }
    }

    fn check(&self, state: &mut HostState, check: &Check) -> anyhow::Result<bool> {
        match check {
            Check::PathExists { path } => Ok(Self::exists(state, path)),
            Check::FileContainsLine { path, pattern } => {
                let content = state
                    .files
                    .get(path)
                    .ok_or_else(|| anyhow::anyhow!("{} not found", path.display()))?;
                let re = Regex::new(pattern)?;
                Ok(content.lines().any(|line| re.is_match(line)))
            }
            Check::CommandListsLine { command, line } => Ok(self
                .run(state, command)
                .map(|lines| lines.iter().any(|l| l == line))
                .unwrap_or(false)),
            Check::PackageInstalled {
                name,
                provider: Provider::Windows,
                ..
            } => Ok(state.registered.contains(name)),
            Check::PackageInstalled { name, version, .. } => {
                Ok(match (state.packages.get(name), version) {
                    (Some(installed), Some(wanted)) => installed == wanted,
                    (Some(_), None) => true,
                    (None, _) => false,
                })
            }
            Check::PackageLatest { name, .. } => {
                Ok(state.packages.get(name) == Some(&self.available))
            }
            Check::Any { checks } => {
                for check in checks {
                    if self.check(state, check)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    fn apply(&self, state: &mut HostState, operation: &Operation) -> Result<(), String> {
        match operation {
            Operation::Fetch { dest, source } => {
                state.files.insert(dest.clone(), source.clone());
            }
            Operation::Extract { archive, dest } => {
                if !state.files.contains_key(archive) {
                    return Err(format!("{} not found", archive.display()));
                }
                let name = crate::source::basename(&archive.display().to_string())
                    .trim_end_matches(".zip")
                    .to_string();
                let root = dest.join(name);
                state.files.insert(root.join("Gemfile"), String::new());
                state
                    .files
                    .insert(root.join("bin").join("logstash-plugin.bat"), "@echo off\n".into());
            }
            Operation::Package {
                name,
                provider: Provider::Windows,
                ensure,
                ..
            } => {
                if ensure.is_removal() {
                    state.registered.remove(name);
                } else {
                    state.registered.insert(name.clone());
                }
            }
            Operation::Package {
                name,
                ensure,
                source,
                ..
            } => {
                if let Some(file) = source
                    && !state.files.contains_key(file)
                {
                    return Err(format!("{} not found", file.display()));
                }
                let version = match ensure {
                    PackageEnsure::Absent | PackageEnsure::Purged => {
                        state.packages.remove(name);
                        let home = self.home.clone();
                        state.files.retain(|path, _| !path.starts_with(&home));
                        return Ok(());
                    }
                    PackageEnsure::Version(v) => v.clone(),
                    PackageEnsure::Present => state
                        .packages
                        .get(name)
                        .cloned()
                        .unwrap_or_else(|| self.available.clone()),
                    PackageEnsure::Latest => self.available.clone(),
                };
                state.packages.insert(name.clone(), version);
                state.files.entry(self.home.join("Gemfile")).or_default();
                state
                    .files
                    .entry(self.home.join("bin").join("logstash-plugin"))
                    .or_insert_with(|| "#!/bin/sh\n".into());
            }
            Operation::RemoveDir { path } => {
                state.files.retain(|file, _| !file.starts_with(path));
            }
            Operation::Exec(cmd) => {
                self.run(state, cmd)?;
            }
            Operation::AppendLine { path, line } => {
                let content = state
                    .files
                    .get_mut(path)
                    .ok_or_else(|| format!("{} not found", path.display()))?;
                content.push_str(line);
                content.push('\n');
            }
        }
        Ok(())
    }
}

/// Gem name declared by a manifest line.
fn gem_of(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix("gem ")?;
    let quoted = rest.trim_start().strip_prefix(['"', '\''])?;
    quoted.split(['"', '\'']).next()
}

/// Plugin name from an installer argument: a name, a path, or a URI.
fn gem_name(target: &str) -> &str {
    let base = crate::source::basename(target);
    let stem = base
        .strip_suffix(".gem")
        .or_else(|| base.strip_suffix(".zip"))
        .unwrap_or(base);
    match stem.rsplit_once('-') {
        Some((name, version)) if version.starts_with(|c: char| c.is_ascii_digit()) => name,
        _ => stem,
    }
}

impl Actuator for SimHost {
    fn evaluate(&self, check: &Check) -> anyhow::Result<bool> {
        let mut state = self.state.lock().unwrap();
        self.check(&mut state, check)
    }

    fn perform(
        &self,
        operation: &Operation,
        _timeout: Option<Duration>,
    ) -> Result<(), ActuationError> {
        let mut state = self.state.lock().unwrap();
        self.apply(&mut state, operation)
            .map_err(ActuationError::Failed)?;
        self.mutations.lock().unwrap().push(operation.summary());
        Ok(())
    }
}

fn fast_settings(settings: Settings) -> Settings {
    Settings {
        retry: RetryPolicy::new(3, Duration::from_millis(1)),
        ..settings
    }
}

fn plan(
    settings: &Settings,
    facts: &Facts,
    ensure: Ensure,
    url: Option<&str>,
    plugins: &[(&str, &str, Option<&str>)],
) -> PlanOutcome {
    let mut planner = Planner::new(settings);
    planner.package(PackageSpec::new(
        "logstash",
        ensure,
        url.map(String::from),
        facts,
    ));
    for (name, ensure, source) in plugins {
        planner.plugin(
            name,
            PluginSpec::new(name, ensure, source.map(String::from), &[], None),
        );
    }
    planner.finish()
}

fn converge(outcome: &PlanOutcome, host: &SimHost) -> declarative::ExecuteSummary {
    assert!(outcome.is_complete(), "{:?}", outcome.failures);
    execute_simple(&outcome.plan, &ExecuteOptions::default(), host).unwrap()
}

#[test]
fn test_repo_install_converges_then_is_idempotent() {
    let facts = Facts::for_family(OsFamily::Debian);
    let settings = fast_settings(Settings::for_kernel(facts.kernel));
    let outcome = plan(
        &settings,
        &facts,
        Ensure::Version("8.5.0".into()),
        None,
        &[
            ("logstash-output-s3", "present", None),
            ("logstash-input-beats", "6.0.0", None),
        ],
    );
    let host = SimHost::new("/usr/share/logstash", "8.6.0");

    let first = converge(&outcome, &host);
    assert!(first.is_success(), "{:?}", first.results);
    assert_eq!(first.total_changes(), 3);
    assert_eq!(
        host.file("/usr/share/logstash/Gemfile").unwrap(),
        "gem \"logstash-output-s3\"\ngem \"logstash-input-beats\", \"6.0.0\"\n"
    );

    let before = host.mutations();
    let second = converge(&outcome, &host);
    assert_eq!(second.total_changes(), 0);
    assert_eq!(second.no_change, 3);
    assert_eq!(host.mutations(), before);
}

#[test]
fn test_source_install_with_staged_plugin_is_idempotent() {
    let facts = Facts::for_family(OsFamily::RedHat);
    let settings = fast_settings(Settings::for_kernel(facts.kernel));
    let outcome = plan(
        &settings,
        &facts,
        Ensure::Version("6.0.0-rc2".into()),
        Some("https://example.com/logstash-6.0.0-rc2.rpm"),
        &[(
            "logstash-filter-custom",
            "present",
            Some("puppet:///modules/site/logstash-filter-custom-1.0.gem"),
        )],
    );
    let host = SimHost::new("/usr/share/logstash", "6.0.0");

    let first = converge(&outcome, &host);
    assert!(first.is_success(), "{:?}", first.results);
    assert_eq!(first.total_changes(), 4);
    assert_eq!(
        host.state.lock().unwrap().packages.get("logstash"),
        Some(&"6.0.0~rc2".to_string())
    );

    let before = host.mutations();
    assert_eq!(converge(&outcome, &host).total_changes(), 0);
    assert_eq!(host.mutations(), before);
}

#[test]
fn test_plugin_version_guard() {
    let facts = Facts::for_family(OsFamily::Debian);
    let settings = fast_settings(Settings::for_kernel(facts.kernel));
    let outcome = plan(
        &settings,
        &facts,
        Ensure::Present,
        None,
        &[("logstash-output-s3", "1.2.3", None)],
    );
    let install = ActionId::new("plugin:logstash-output-s3:install");
    let status = |host: &SimHost| {
        compute_diffs(&outcome.plan, host)
            .into_iter()
            .find(|d| d.id == install)
            .map(|d| d.status)
            .unwrap()
    };

    let other = SimHost::new("/usr/share/logstash", "8.5.0")
        .with_file("/usr/share/logstash/Gemfile", "gem \"logstash-output-s3\", \"1.2.2\"\n");
    assert_eq!(status(&other), ActionStatus::Pending);

    let same = SimHost::new("/usr/share/logstash", "8.5.0")
        .with_file("/usr/share/logstash/Gemfile", "gem \"logstash-output-s3\", \"1.2.3\"\n");
    assert_eq!(status(&same), ActionStatus::Satisfied);
}

#[test]
fn test_missing_manifest_means_install_runs() {
    let facts = Facts::for_family(OsFamily::Debian);
    let settings = fast_settings(Settings::for_kernel(facts.kernel));
    let outcome = plan(
        &settings,
        &facts,
        Ensure::Present,
        None,
        &[("logstash-output-s3", "present", None)],
    );
    let host = SimHost::new("/usr/share/logstash", "8.5.0");

    let diff = compute_diffs(&outcome.plan, &host)
        .into_iter()
        .find(|d| d.id.as_str() == "plugin:logstash-output-s3:install")
        .unwrap();
    assert!(matches!(diff.status, ActionStatus::Undetermined { .. }));
    assert!(diff.status.would_run());
}

#[test]
fn test_plugin_removal_runs_once() {
    let facts = Facts::for_family(OsFamily::Debian);
    let settings = fast_settings(Settings::for_kernel(facts.kernel));
    let outcome = plan(
        &settings,
        &facts,
        Ensure::Present,
        None,
        &[("logstash-output-s3", "absent", None)],
    );
    let host = SimHost::new("/usr/share/logstash", "8.5.0")
        .with_file("/usr/share/logstash/bin/logstash-plugin", "#!/bin/sh\n")
        .with_file(
            "/usr/share/logstash/Gemfile",
            "gem \"logstash-core\"\ngem \"logstash-output-s3\"\n",
        );

    let first = converge(&outcome, &host);
    assert_eq!(first.removed, 1);
    assert_eq!(first.created, 1);
    assert_eq!(
        host.file("/usr/share/logstash/Gemfile").unwrap(),
        "gem \"logstash-core\""
    );

    assert_eq!(converge(&outcome, &host).total_changes(), 0);
}

#[test]
fn test_windows_install_then_absent() {
    let facts = Facts::for_family(OsFamily::Windows);
    let settings = fast_settings(Settings::for_kernel(facts.kernel));
    let outcome = plan(
        &settings,
        &facts,
        Ensure::Version("8.5.0".into()),
        None,
        &[("logstash-output-s3", "present", None)],
    );
    let host = SimHost::new("C:/logstash", "8.5.0").with_registration("logstash");

    let first = converge(&outcome, &host);
    assert!(first.is_success(), "{:?}", first.results);
    // stage, extract, unregister, patch, install
    assert_eq!(first.total_changes(), 5);
    assert!(
        host.file("C:/logstash/logstash-8.5.0/bin/logstash-plugin.bat")
            .unwrap()
            .ends_with("exit /b %ERRORLEVEL%\n")
    );

    let before = host.mutations();
    assert_eq!(converge(&outcome, &host).total_changes(), 0);
    assert_eq!(host.mutations(), before);

    let absent = plan(&settings, &facts, Ensure::Absent, None, &[]);
    assert_eq!(absent.plan.len(), 1);
    assert!(
        absent
            .plan
            .iter()
            .all(|a| matches!(a.operation, Operation::RemoveDir { .. }))
    );

    let removed = converge(&absent, &host);
    assert_eq!(removed.removed, 1);
    assert!(host.file("C:/logstash/logstash-8.5.0/Gemfile").is_none());
    assert_eq!(converge(&absent, &host).total_changes(), 0);
}

#[test]
fn test_gem_name() {
    assert_eq!(gem_name("logstash-output-s3"), "logstash-output-s3");
    assert_eq!(
        gem_name("/tmp/logstash-filter-custom-1.0.gem"),
        "logstash-filter-custom"
    );
    assert_eq!(gem_of("  gem 'logstash-core', '8.5.0'"), Some("logstash-core"));
}
