//! Host facts that drive platform branching.
//!
//! Kernel and OS family are closed sets. Strings from fact sources are
//! parsed once at the edge; everything past that point matches on the
//! enums.

use crate::error::{Error, Result};
use declarative::Provider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kernel of the managed host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Kernel {
    Linux,
    Windows,
}

impl Kernel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kernel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            _ => Err(Error::unsupported_platform(format!("kernel '{}'", s))),
        }
    }
}

impl TryFrom<String> for Kernel {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Operating system family of the managed host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum OsFamily {
    Debian,
    RedHat,
    Suse,
    Archlinux,
    Windows,
}

impl OsFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debian => "debian",
            Self::RedHat => "redhat",
            Self::Suse => "suse",
            Self::Archlinux => "archlinux",
            Self::Windows => "windows",
        }
    }

    /// Package manager used when nothing overrides it.
    pub fn default_provider(&self) -> Provider {
        match self {
            Self::Debian => Provider::Apt,
            Self::RedHat => Provider::Yum,
            Self::Suse => Provider::Zypper,
            Self::Archlinux => Provider::Pacman,
            Self::Windows => Provider::Windows,
        }
    }

    /// Kernel this family runs on.
    pub fn kernel(&self) -> Kernel {
        match self {
            Self::Windows => Kernel::Windows,
            Self::Debian | Self::RedHat | Self::Suse | Self::Archlinux => Kernel::Linux,
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OsFamily {
    type Err = Error;

    /// Accepts family names as well as common distribution ids.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debian" | "ubuntu" | "linuxmint" | "raspbian" => Ok(Self::Debian),
            "redhat" | "rhel" | "centos" | "fedora" | "rocky" | "almalinux" | "amazon"
            | "ol" => Ok(Self::RedHat),
            "suse" | "sles" | "opensuse" | "opensuse-leap" | "opensuse-tumbleweed" => {
                Ok(Self::Suse)
            }
            "archlinux" | "arch" | "manjaro" => Ok(Self::Archlinux),
            "windows" => Ok(Self::Windows),
            _ => Err(Error::unsupported_platform(format!("os family '{}'", s))),
        }
    }
}

impl TryFrom<String> for OsFamily {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Facts consumed by the planners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facts {
    pub os_family: OsFamily,
    pub kernel: Kernel,
    /// Overrides the family's default package manager
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_provider: Option<Provider>,
}

impl Facts {
    /// Facts for a family on its own kernel, with the default provider.
    pub fn for_family(os_family: OsFamily) -> Self {
        Self {
            os_family,
            kernel: os_family.kernel(),
            package_provider: None,
        }
    }

    /// Package manager for repository installs.
    pub fn provider(&self) -> Provider {
        self.package_provider
            .unwrap_or_else(|| self.os_family.default_provider())
    }

    /// Reject family/kernel combinations that cannot exist.
    pub fn validate(&self) -> Result<()> {
        if self.os_family.kernel() == self.kernel {
            Ok(())
        } else {
            Err(Error::unsupported_platform(format!(
                "os family '{}' on kernel '{}'",
                self.os_family, self.kernel
            )))
        }
    }
}
