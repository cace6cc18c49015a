//! Site configuration: what the host should look like.
//!
//! Loaded from TOML (preferred) or JSON:
//!
//! ```toml
//! [logstash]
//! ensure = "present"
//! version = "8.5.0"
//!
//! [[plugin]]
//! name = "logstash-output-s3"
//! ensure = "4.3.5"
//! environment = ["LS_JAVA_OPTS=-Xmx1g"]
//!
//! [facts]
//! os_family = "debian"
//!
//! [puppet]
//! file_root = "/etc/puppetlabs/code/environments/production/modules"
//! ```

use anyhow::{Context, Result, bail};
use declarative::Provider;
use serde::{Deserialize, Serialize};
use stashkit::{Ensure, Facts, Kernel, OsFamily, PackageSpec, PluginSpec, Settings};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

/// Config file formats, in lookup order
const FORMATS: [&str; 2] = ["toml", "json"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub logstash: LogstashConfig,

    #[serde(default, rename = "plugin")]
    pub plugins: Vec<PluginConfig>,

    #[serde(default)]
    pub facts: FactsConfig,

    #[serde(default)]
    pub puppet: PuppetConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogstashConfig {
    #[serde(default = "default_ensure")]
    pub ensure: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "default_package_name")]
    pub package_name: String,
    #[serde(default)]
    pub package_url: Option<String>,
    #[serde(default)]
    pub auto_upgrade: bool,
    #[serde(default = "default_true")]
    pub manage_repo: bool,
    /// Defaults per kernel when unset
    #[serde(default)]
    pub home_dir: Option<String>,
    #[serde(default)]
    pub staging_dir: Option<String>,
    #[serde(default = "default_user")]
    pub user: String,
    /// Seconds
    #[serde(default = "default_download_timeout")]
    pub download_timeout: u64,
}

impl Default for LogstashConfig {
    fn default() -> Self {
        Self {
            ensure: default_ensure(),
            version: None,
            package_name: default_package_name(),
            package_url: None,
            auto_upgrade: false,
            manage_repo: true,
            home_dir: None,
            staging_dir: None,
            user: default_user(),
            download_timeout: default_download_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    pub name: String,
    #[serde(default = "default_ensure")]
    pub ensure: String,
    #[serde(default)]
    pub source: Option<String>,
    /// `KEY=VALUE` entries
    #[serde(default)]
    pub environment: Vec<String>,
    #[serde(default)]
    pub creates: Option<String>,
}

/// Overrides for detected facts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactsConfig {
    #[serde(default)]
    pub os_family: Option<OsFamily>,
    #[serde(default)]
    pub kernel: Option<Kernel>,
    #[serde(default)]
    pub package_provider: Option<Provider>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PuppetConfig {
    /// Local module tree `puppet:///modules/...` sources are read from
    #[serde(default)]
    pub file_root: Option<String>,
}

fn default_ensure() -> String {
    "present".to_string()
}

fn default_package_name() -> String {
    "logstash".to_string()
}

fn default_user() -> String {
    "logstash".to_string()
}

fn default_download_timeout() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

impl SiteConfig {
    /// Load from `path`, or from `config.{toml,json}` in the config directory.
    ///
    /// A missing default config yields the default site (Logstash present,
    /// no plugins); a missing explicit path is an error.
    pub fn load(path: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = path {
            return Ok((Self::load_file(path)?, Some(path.to_path_buf())));
        }

        let dir = paths::config_dir()?;
        for ext in FORMATS {
            let candidate = dir.join(format!("config.{}", ext));
            if candidate.exists() {
                return Ok((Self::load_file(&candidate)?, Some(candidate)));
            }
        }

        log::info!("no config found in {}, using defaults", dir.display());
        Ok((Self::default(), None))
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?,
            _ => toml::from_str(&content)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?,
        };
        Self::validate(&config).with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Reject shapes that cannot be planned at all.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for plugin in &self.plugins {
            if !seen.insert(plugin.name.as_str()) {
                bail!("plugin '{}' is declared more than once", plugin.name);
            }
        }
        Ok(())
    }

    /// Planning settings for a kernel, with configured paths expanded.
    pub fn settings(&self, kernel: Kernel) -> Settings {
        let defaults = Settings::for_kernel(kernel);
        let ls = &self.logstash;
        Settings {
            home_dir: ls
                .home_dir
                .as_deref()
                .map_or(defaults.home_dir.clone(), paths::expand),
            staging_dir: ls
                .staging_dir
                .as_deref()
                .map_or(defaults.staging_dir.clone(), paths::expand),
            user: ls.user.clone(),
            download_timeout: Duration::from_secs(ls.download_timeout),
            auto_upgrade: ls.auto_upgrade,
            manage_repo: ls.manage_repo,
            ..defaults
        }
    }

    pub fn package_spec(&self, facts: &Facts) -> stashkit::Result<PackageSpec> {
        let ls = &self.logstash;
        let ensure = Ensure::for_package(&ls.ensure, ls.version.as_deref())?;
        PackageSpec::new(&ls.package_name, ensure, ls.package_url.clone(), facts)
    }

    pub fn plugin_specs(&self) -> impl Iterator<Item = (&str, stashkit::Result<PluginSpec>)> {
        self.plugins.iter().map(|p| {
            (
                p.name.as_str(),
                PluginSpec::new(
                    &p.name,
                    &p.ensure,
                    p.source.clone(),
                    &p.environment,
                    p.creates.as_deref().map(paths::expand),
                ),
            )
        })
    }

    pub fn puppet_root(&self) -> Option<PathBuf> {
        self.puppet.file_root.as_deref().map(paths::expand)
    }
}
