//! Version normalization for package managers.

use crate::facts::OsFamily;
use regex::Regex;
use std::sync::LazyLock;

static PRERELEASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+\.\d+\.\d+)-((?:alpha|beta|rc)\d+)$").expect("valid pre-release regex")
});

/// Map a user supplied version to the form the family's package manager expects.
///
/// RPM sorts `~` before the release, so a pre-release written as
/// `6.0.0-rc2` becomes `6.0.0~rc2` on RedHat hosts and still orders before
/// `6.0.0`. Every other input passes through unchanged.
pub fn normalize(version: &str, os_family: OsFamily) -> String {
    match os_family {
        OsFamily::RedHat => PRERELEASE.replace(version, "${1}~${2}").into_owned(),
        OsFamily::Debian | OsFamily::Suse | OsFamily::Archlinux | OsFamily::Windows => {
            version.to_string()
        }
    }
}
