//! Host fact detection.
//!
//! Kernel comes from the OS this binary runs on; the OS family from
//! `/etc/os-release`. Anything set under `[facts]` in the site config wins.

use anyhow::{Context, Result};
use stashkit::{Facts, Kernel, OsFamily};
use std::fs;
use std::path::Path;

use crate::config::FactsConfig;

const OS_RELEASE: &str = "/etc/os-release";

/// Detect facts for this host, applying config overrides.
pub fn detect(overrides: &FactsConfig) -> Result<Facts> {
    let kernel = match overrides.kernel {
        Some(k) => k,
        None => std::env::consts::OS
            .parse::<Kernel>()
            .context("Unsupported host")?,
    };

    let os_family = match overrides.os_family {
        Some(f) => f,
        None => match kernel {
            Kernel::Windows => OsFamily::Windows,
            Kernel::Linux => detect_linux_family(Path::new(OS_RELEASE))?,
        },
    };

    let facts = Facts {
        os_family,
        kernel,
        package_provider: overrides.package_provider,
    };
    log::debug!("facts: {:?}", facts);
    Ok(facts)
}

fn detect_linux_family(path: &Path) -> Result<OsFamily> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    parse_os_release(&content).with_context(|| {
        format!(
            "Unrecognized distribution in {}; set [facts] os_family in the config",
            path.display()
        )
    })
}

/// Family from `os-release` content: `ID` first, then each `ID_LIKE` entry.
pub fn parse_os_release(content: &str) -> Option<OsFamily> {
    let mut id = None;
    let mut id_like = None;

    for line in content.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        match key {
            "ID" => id = Some(value.to_string()),
            "ID_LIKE" => id_like = Some(value.to_string()),
            _ => {}
        }
    }

    id.iter()
        .chain(id_like.iter())
        .flat_map(|v| v.split_whitespace())
        .find_map(|candidate| candidate.parse::<OsFamily>().ok())
        .filter(|family| *family != OsFamily::Windows)
}
