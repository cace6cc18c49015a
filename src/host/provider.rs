//! Package manager command lines and state queries.
//!
//! Commands are built as argv vectors; nothing here goes through a shell.

use anyhow::{Result, bail};
use declarative::{ActuationError, CommandSpec, PackageEnsure, Provider};
use std::path::Path;

use crate::runner;

/// Commands that converge `name` to `ensure`, in order
pub fn commands(
    name: &str,
    ensure: &PackageEnsure,
    provider: Provider,
    source: Option<&Path>,
) -> Result<Vec<CommandSpec>, ActuationError> {
    let unsupported = || {
        ActuationError::Unsupported(format!(
            "{} cannot ensure {} for {}{}",
            provider,
            ensure,
            name,
            source.map_or(String::new(), |s| format!(" from {}", s.display()))
        ))
    };

    if provider.is_file_based() != source.is_some() && !ensure.is_removal() {
        return Err(unsupported());
    }

    let cmds = match provider {
        Provider::Apt => {
            let apt = |verb: &str| {
                CommandSpec::new("apt-get")
                    .args(["-y", "-q", verb])
                    .env("DEBIAN_FRONTEND", "noninteractive")
            };
            match ensure {
                PackageEnsure::Present | PackageEnsure::Latest => vec![apt("install").arg(name)],
                PackageEnsure::Version(v) => vec![
                    apt("install")
                        .arg("--allow-downgrades")
                        .arg(format!("{}={}", name, v)),
                ],
                PackageEnsure::Absent => vec![apt("remove").arg(name)],
                PackageEnsure::Purged => vec![apt("purge").arg(name)],
            }
        }
        Provider::Dpkg => {
            let dpkg = CommandSpec::new("dpkg").env("DEBIAN_FRONTEND", "noninteractive");
            match (ensure, source) {
                (PackageEnsure::Absent, _) => vec![dpkg.args(["--remove", name])],
                (PackageEnsure::Purged, _) => vec![dpkg.args(["--purge", name])],
                (_, Some(file)) => vec![dpkg.arg("-i").arg(file.display().to_string())],
                (_, None) => return Err(unsupported()),
            }
        }
        Provider::Yum => {
            let yum = |verb: &str| CommandSpec::new("yum").args(["-y", "-q", verb]);
            match ensure {
                PackageEnsure::Present => vec![yum("install").arg(name)],
                PackageEnsure::Latest => vec![yum("install").arg(name), yum("update").arg(name)],
                PackageEnsure::Version(v) => vec![yum("install").arg(format!("{}-{}", name, v))],
                PackageEnsure::Absent | PackageEnsure::Purged => vec![yum("remove").arg(name)],
            }
        }
        Provider::Rpm => match (ensure, source) {
            (PackageEnsure::Absent | PackageEnsure::Purged, _) => {
                vec![CommandSpec::new("rpm").args(["-e", name])]
            }
            (_, Some(file)) => vec![
                CommandSpec::new("rpm")
                    .args(["-Uvh", "--oldpackage"])
                    .arg(file.display().to_string()),
            ],
            (_, None) => return Err(unsupported()),
        },
        Provider::Zypper => {
            let zypper =
                |verb: &str| CommandSpec::new("zypper").args(["--non-interactive", "--quiet", verb]);
            match ensure {
                PackageEnsure::Present => vec![zypper("install").arg(name)],
                PackageEnsure::Latest => vec![zypper("install").arg(name), zypper("update").arg(name)],
                PackageEnsure::Version(v) => vec![
                    zypper("install")
                        .arg("--oldpackage")
                        .arg(format!("{}={}", name, v)),
                ],
                PackageEnsure::Absent | PackageEnsure::Purged => vec![zypper("remove").arg(name)],
            }
        }
        Provider::Pacman => {
            let pacman = |flag: &str| CommandSpec::new("pacman").args([flag, "--noconfirm"]);
            match ensure {
                PackageEnsure::Present => vec![pacman("-S").arg("--needed").arg(name)],
                PackageEnsure::Latest => vec![pacman("-Sy").arg(name)],
                // Repositories only carry the current build
                PackageEnsure::Version(_) => return Err(unsupported()),
                PackageEnsure::Absent => vec![pacman("-R").arg(name)],
                PackageEnsure::Purged => vec![pacman("-Rns").arg(name)],
            }
        }
        Provider::Windows => match ensure {
            PackageEnsure::Absent | PackageEnsure::Purged => vec![powershell(&format!(
                "Uninstall-Package -Name '{}' -Force -ErrorAction Stop",
                name
            ))],
            _ => return Err(unsupported()),
        },
    };

    Ok(cmds)
}

fn powershell(script: &str) -> CommandSpec {
    CommandSpec::new("powershell.exe").args(["-NoProfile", "-NonInteractive", "-Command", script])
}

/// Query for the installed version of `name`
fn version_query(name: &str, provider: Provider) -> CommandSpec {
    match provider {
        Provider::Apt | Provider::Dpkg => CommandSpec::new("dpkg-query")
            .args(["-W", "-f=${Status}|${Version}\\n", name]),
        Provider::Yum | Provider::Rpm | Provider::Zypper => {
            CommandSpec::new("rpm").args(["-q", "--qf", "%{VERSION}-%{RELEASE}\\n", name])
        }
        Provider::Pacman => CommandSpec::new("pacman").args(["-Q", name]),
        Provider::Windows => powershell(&format!(
            "Get-Package -Name '{}' -ErrorAction SilentlyContinue | Select-Object -ExpandProperty Version",
            name
        )),
    }
}

/// Parse a version query's output; `None` when not installed
fn parse_version(provider: Provider, success: bool, stdout: &str) -> Option<String> {
    if !success {
        return None;
    }
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    match provider {
        Provider::Apt | Provider::Dpkg => {
            let (status, version) = line.split_once('|')?;
            (status == "install ok installed").then(|| version.to_string())
        }
        Provider::Pacman => line.split_whitespace().nth(1).map(str::to_string),
        Provider::Yum | Provider::Rpm | Provider::Zypper | Provider::Windows => {
            Some(line.to_string())
        }
    }
}

/// Installed version of `name`, or `None` when it is not installed
pub fn installed_version(name: &str, provider: Provider) -> Result<Option<String>> {
    let query = version_query(name, provider);
    let (code, stdout) = runner::run_query(&query)?;
    let version = parse_version(provider, code == Some(0), &stdout);
    log::debug!("{} installed version via {}: {:?}", name, provider, version);
    Ok(version)
}

/// Whether the repository offers a newer version than the installed one
pub fn update_available(name: &str, provider: Provider) -> Result<bool> {
    match provider {
        Provider::Apt => {
            let query = CommandSpec::new("apt-cache").args(["policy", name]);
            let (_, stdout) = runner::run_query(&query)?;
            Ok(parse_apt_policy(&stdout))
        }
        Provider::Yum => {
            let query = CommandSpec::new("yum").args(["-q", "check-update", name]);
            match runner::run_query(&query)? {
                (Some(0), _) => Ok(false),
                (Some(100), _) => Ok(true),
                (code, _) => bail!("yum check-update exited with {:?}", code),
            }
        }
        Provider::Zypper => {
            let query = CommandSpec::new("zypper").args(["--non-interactive", "--quiet", "list-updates"]);
            let (_, stdout) = runner::run_query(&query)?;
            Ok(stdout
                .lines()
                .any(|l| l.split('|').map(str::trim).any(|cell| cell == name)))
        }
        Provider::Pacman => {
            let query = CommandSpec::new("pacman").args(["-Qu", name]);
            let (code, stdout) = runner::run_query(&query)?;
            Ok(code == Some(0) && !stdout.trim().is_empty())
        }
        Provider::Dpkg | Provider::Rpm | Provider::Windows => {
            bail!("{} cannot report available updates", provider)
        }
    }
}

/// True when `apt-cache policy` shows a candidate newer than what is installed
fn parse_apt_policy(stdout: &str) -> bool {
    let field = |key: &str| {
        stdout
            .lines()
            .find_map(|l| l.trim().strip_prefix(key).map(|v| v.trim().to_string()))
    };
    match (field("Installed:"), field("Candidate:")) {
        (Some(installed), Some(candidate)) => {
            installed != "(none)" && candidate != "(none)" && installed != candidate
        }
        _ => false,
    }
}

/// Whether an installed version string satisfies a wanted version.
///
/// Epochs are ignored, and a wanted version without a release matches any
/// release of it: `1:8.5.0-1` satisfies `8.5.0`.
pub fn version_matches(installed: &str, wanted: &str) -> bool {
    let strip_epoch = |v: &str| v.split_once(':').map_or(v, |(_, rest)| rest).to_string();
    let installed = strip_epoch(installed.trim());
    let wanted = strip_epoch(wanted.trim());
    installed == wanted
        || installed
            .strip_prefix(wanted.as_str())
            .is_some_and(|rest| rest.starts_with('-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn argv(cmd: &CommandSpec) -> Vec<&str> {
        std::iter::once(cmd.program.as_str())
            .chain(cmd.args.iter().map(String::as_str))
            .collect()
    }

    #[test]
    fn test_apt_commands() {
        let cmds = commands(
            "logstash",
            &PackageEnsure::Version("1:8.5.0-1".into()),
            Provider::Apt,
            None,
        )
        .unwrap();
        assert_eq!(
            argv(&cmds[0]),
            vec![
                "apt-get",
                "-y",
                "-q",
                "install",
                "--allow-downgrades",
                "logstash=1:8.5.0-1"
            ]
        );
        assert_eq!(
            cmds[0].env,
            vec![("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string())]
        );

        let purge = commands("logstash", &PackageEnsure::Purged, Provider::Apt, None).unwrap();
        assert_eq!(argv(&purge[0]), vec!["apt-get", "-y", "-q", "purge", "logstash"]);
    }

    #[test]
    fn test_file_providers_need_source() {
        let file = PathBuf::from("/tmp/logstash-8.5.0.rpm");
        let cmds = commands(
            "logstash",
            &PackageEnsure::Version("8.5.0".into()),
            Provider::Rpm,
            Some(&file),
        )
        .unwrap();
        assert_eq!(
            argv(&cmds[0]),
            vec!["rpm", "-Uvh", "--oldpackage", "/tmp/logstash-8.5.0.rpm"]
        );

        assert!(commands("logstash", &PackageEnsure::Present, Provider::Dpkg, None).is_err());
        assert!(commands("logstash", &PackageEnsure::Present, Provider::Apt, Some(&file)).is_err());

        let remove = commands("logstash", &PackageEnsure::Absent, Provider::Rpm, None).unwrap();
        assert_eq!(argv(&remove[0]), vec!["rpm", "-e", "logstash"]);
    }

    #[test]
    fn test_latest_installs_then_updates() {
        let cmds = commands("logstash", &PackageEnsure::Latest, Provider::Yum, None).unwrap();
        assert_eq!(cmds.len(), 2);
        assert_eq!(argv(&cmds[1]), vec!["yum", "-y", "-q", "update", "logstash"]);
    }

    #[test]
    fn test_pacman_cannot_pin() {
        let err = commands(
            "logstash",
            &PackageEnsure::Version("8.5.0".into()),
            Provider::Pacman,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ActuationError::Unsupported(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_windows_removal_only() {
        let cmds = commands("logstash", &PackageEnsure::Absent, Provider::Windows, None).unwrap();
        assert_eq!(cmds[0].program, "powershell.exe");
        assert!(cmds[0].args[3].contains("Uninstall-Package -Name 'logstash'"));
        assert!(commands("logstash", &PackageEnsure::Present, Provider::Windows, None).is_err());
    }

    #[test]
    fn test_parse_dpkg_version() {
        assert_eq!(
            parse_version(Provider::Apt, true, "install ok installed|1:8.5.0-1\n"),
            Some("1:8.5.0-1".to_string())
        );
        assert_eq!(
            parse_version(Provider::Dpkg, true, "deinstall ok config-files|1:8.5.0-1\n"),
            None
        );
        assert_eq!(parse_version(Provider::Dpkg, false, ""), None);
    }

    #[test]
    fn test_parse_other_versions() {
        assert_eq!(
            parse_version(Provider::Pacman, true, "logstash 8.5.0-1\n"),
            Some("8.5.0-1".to_string())
        );
        assert_eq!(
            parse_version(Provider::Rpm, true, "6.0.0~rc2-1\n"),
            Some("6.0.0~rc2-1".to_string())
        );
        assert_eq!(parse_version(Provider::Windows, true, "\n"), None);
    }

    #[test]
    fn test_parse_apt_policy() {
        let outdated = "logstash:\n  Installed: 1:8.4.0-1\n  Candidate: 1:8.5.0-1\n  Version table:\n";
        assert!(parse_apt_policy(outdated));

        let current = "logstash:\n  Installed: 1:8.5.0-1\n  Candidate: 1:8.5.0-1\n";
        assert!(!parse_apt_policy(current));

        let missing = "logstash:\n  Installed: (none)\n  Candidate: 1:8.5.0-1\n";
        assert!(!parse_apt_policy(missing));
    }

    #[test]
    fn test_version_matches() {
        assert!(version_matches("1:8.5.0-1", "8.5.0"));
        assert!(version_matches("8.5.0-1", "8.5.0-1"));
        assert!(version_matches("6.0.0~rc2-1", "6.0.0~rc2"));
        assert!(version_matches("8.5.0", "1:8.5.0"));
        assert!(!version_matches("8.5.01-1", "8.5.0"));
        assert!(!version_matches("8.4.0-1", "8.5.0"));
    }
}
