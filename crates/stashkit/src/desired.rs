//! Desired state for the Logstash package and its plugins.

use crate::error::{Error, Result};
use crate::facts::{Facts, Kernel, OsFamily};
use declarative::{Provider, RetryPolicy};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

static NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._+-]*$").expect("valid name regex"));

static PLUGIN_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+\.\d+").expect("valid version regex"));

/// Desired presence or version of a managed entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "version")]
pub enum Ensure {
    Present,
    Absent,
    Version(String),
}

impl Ensure {
    /// Package ensure: `present` (optionally pinned by `version`) or `absent`.
    pub fn for_package(ensure: &str, version: Option<&str>) -> Result<Self> {
        match ensure {
            "present" => Ok(match version {
                Some(v) if !v.is_empty() => Self::Version(v.to_string()),
                _ => Self::Present,
            }),
            "absent" => Ok(Self::Absent),
            other => Err(Error::invalid_ensure(other)),
        }
    }

    /// Plugin ensure: `present`, `absent`, or a version like `5.3.4`.
    pub fn for_plugin(ensure: &str) -> Result<Self> {
        match ensure {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            v if PLUGIN_VERSION.is_match(v) => Ok(Self::Version(v.to_string())),
            other => Err(Error::invalid_ensure(other)),
        }
    }
}

fn validate_name(what: &'static str, name: &str) -> Result<()> {
    if NAME.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidName {
            what,
            name: name.to_string(),
        })
    }
}

/// Desired state of the Logstash package on one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageSpec {
    pub name: String,
    pub ensure: Ensure,
    pub source_url: Option<String>,
    pub os_family: OsFamily,
    pub kernel: Kernel,
    /// Repository provider for the host
    pub provider: Provider,
}

impl PackageSpec {
    pub fn new(
        name: &str,
        ensure: Ensure,
        source_url: Option<String>,
        facts: &Facts,
    ) -> Result<Self> {
        validate_name("package", name)?;
        facts.validate()?;
        Ok(Self {
            name: name.to_string(),
            ensure,
            source_url: source_url.filter(|s| !s.is_empty()),
            os_family: facts.os_family,
            kernel: facts.kernel,
            provider: facts.provider(),
        })
    }

    pub fn version(&self) -> Option<&str> {
        match &self.ensure {
            Ensure::Version(v) => Some(v),
            Ensure::Present | Ensure::Absent => None,
        }
    }
}

/// Desired state of one named plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginSpec {
    pub name: String,
    pub ensure: Ensure,
    pub source: Option<String>,
    /// Environment overlay for the installer, in order
    pub environment: Vec<(String, String)>,
    /// Path whose existence means the plugin is installed
    pub creates: Option<PathBuf>,
}

impl PluginSpec {
    pub fn new(
        name: &str,
        ensure: &str,
        source: Option<String>,
        environment: &[String],
        creates: Option<PathBuf>,
    ) -> Result<Self> {
        validate_name("plugin", name)?;
        let ensure = Ensure::for_plugin(ensure)?;
        let environment = environment
            .iter()
            .map(|entry| match entry.split_once('=') {
                Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
                _ => Err(Error::InvalidEnvironment {
                    entry: entry.clone(),
                }),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: name.to_string(),
            ensure,
            source: source.filter(|s| !s.is_empty()),
            environment,
            creates,
        })
    }
}

/// Module-wide settings threaded through every planning function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    /// Logstash installation root
    pub home_dir: PathBuf,
    /// Service-owner account plugin commands run as on Linux
    pub user: String,
    /// Where staged files are written
    pub staging_dir: PathBuf,
    pub download_timeout: Duration,
    pub package_timeout: Duration,
    pub plugin_timeout: Duration,
    /// Track the newest package when no version is pinned
    pub auto_upgrade: bool,
    /// The hosting platform manages the package repository (and its index refresh)
    pub manage_repo: bool,
    pub retry: RetryPolicy,
}

impl Settings {
    /// Defaults for a kernel.
    pub fn for_kernel(kernel: Kernel) -> Self {
        let (home_dir, staging_dir) = match kernel {
            Kernel::Linux => ("/usr/share/logstash", "/tmp"),
            Kernel::Windows => ("C:/logstash", "C:/Windows/Temp"),
        };
        Self {
            home_dir: PathBuf::from(home_dir),
            user: "logstash".to_string(),
            staging_dir: PathBuf::from(staging_dir),
            download_timeout: Duration::from_secs(600),
            package_timeout: Duration::from_secs(300),
            plugin_timeout: Duration::from_secs(1800),
            auto_upgrade: false,
            manage_repo: true,
            retry: RetryPolicy::default(),
        }
    }

    /// Versioned directory a Windows archive extracts into.
    pub fn windows_install_dir(&self, version: &str) -> PathBuf {
        self.home_dir.join(format!("logstash-{}", version))
    }

    /// Directory holding `bin/` and the plugin `Gemfile` for this package.
    pub fn logstash_home(&self, package: &PackageSpec) -> PathBuf {
        match (package.kernel, package.version()) {
            (Kernel::Windows, Some(version)) => self.windows_install_dir(version),
            _ => self.home_dir.clone(),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }
}
