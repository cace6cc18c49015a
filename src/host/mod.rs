//! The real host: performs planned operations and evaluates guard checks.

pub mod extract;
pub mod fetch;
pub mod provider;

use anyhow::{Context, Result};
use declarative::{ActuationError, Actuator, Check, Operation};
use regex::Regex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::runner;

/// Actuator backed by the local filesystem, package managers, and network
#[derive(Debug, Default)]
pub struct HostActuator {
    /// Local mirror for `puppet:///modules/...` sources
    puppet_root: Option<PathBuf>,
}

impl HostActuator {
    pub fn new(puppet_root: Option<PathBuf>) -> Self {
        Self { puppet_root }
    }
}

impl Actuator for HostActuator {
    fn evaluate(&self, check: &Check) -> Result<bool> {
        let holds = match check {
            Check::PathExists { path } => path.exists(),
            Check::FileContainsLine { path, pattern } => file_contains_line(path, pattern)?,
            Check::CommandListsLine { command, line } => {
                let output = runner::run_capture(command, None)?;
                output.success && output.stdout_str().lines().any(|l| l.trim() == line.as_str())
            }
            Check::PackageInstalled {
                name,
                provider,
                version,
            } => match (provider::installed_version(name, *provider)?, version) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(installed), Some(wanted)) => provider::version_matches(&installed, wanted),
            },
            Check::PackageLatest { name, provider } => {
                provider::installed_version(name, *provider)?.is_some()
                    && !provider::update_available(name, *provider)?
            }
            Check::Any { checks } => any_holds(self, checks)?,
        };
        log::debug!("check '{}' -> {}", check.describe(), holds);
        Ok(holds)
    }

    fn perform(&self, operation: &Operation, timeout: Option<Duration>) -> Result<(), ActuationError> {
        log::info!("{}", operation.summary());
        match operation {
            Operation::Fetch { source, dest } => {
                fetch::fetch(source, dest, self.puppet_root.as_deref(), timeout)
            }
            Operation::Extract { archive, dest } => extract::extract(archive, dest),
            Operation::Package {
                name,
                ensure,
                provider,
                source,
            } => {
                for cmd in provider::commands(name, ensure, *provider, source.as_deref())? {
                    runner::run_checked(&cmd, timeout)?;
                }
                Ok(())
            }
            Operation::RemoveDir { path } => remove_dir(path),
            Operation::Exec(cmd) => runner::run_checked(cmd, timeout).map(|_| ()),
            Operation::AppendLine { path, line } => append_line(path, line),
        }
    }
}

/// True if one check holds. Errors only surface when no check holds.
fn any_holds(actuator: &dyn Actuator, checks: &[Check]) -> Result<bool> {
    let mut first_error = None;
    for check in checks {
        match actuator.evaluate(check) {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) if first_error.is_none() => first_error = Some(e),
            Err(_) => {}
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(false),
    }
}

/// Whether any line of the file matches `pattern`; a missing file is an error
fn file_contains_line(path: &Path, pattern: &str) -> Result<bool> {
    let regex = Regex::new(pattern).with_context(|| format!("Invalid pattern /{}/", pattern))?;
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    Ok(content.lines().any(|line| regex.is_match(line)))
}

fn remove_dir(path: &Path) -> Result<(), ActuationError> {
    if path.exists() {
        fs::remove_dir_all(path).map_err(|e| {
            ActuationError::failed(format!("Failed to remove {}: {}", path.display(), e))
        })?;
    }
    Ok(())
}

/// Append `line` to an existing file, starting a new line if needed
fn append_line(path: &Path, line: &str) -> Result<(), ActuationError> {
    let content = fs::read(path).map_err(|e| {
        ActuationError::failed(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let mut file = fs::OpenOptions::new().append(true).open(path)?;
    if !content.is_empty() && !content.ends_with(b"\n") {
        file.write_all(b"\n")?;
    }
    writeln!(file, "{}", line)?;
    Ok(())
}
