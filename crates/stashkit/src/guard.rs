//! Idempotence guard builder.
//!
//! Every step the planners emit gets exactly one guard, derived from its
//! [`Intent`]. `unless` guards skip the step when the host already has the
//! desired state; `only if` guards skip removals when there is nothing to
//! remove.

use crate::step::{Intent, Step};
use declarative::{Check, Guard, PackageEnsure, PlannedAction};

/// Manifest line pattern for a plugin, optionally pinned to a version.
///
/// Matches Gemfile entries such as `gem "logstash-output-s3"` and
/// `gem "logstash-output-s3", "= 4.3.5"`.
pub fn manifest_pattern(name: &str, version: Option<&str>) -> String {
    let name = regex::escape(name);
    match version {
        Some(version) => format!(
            r#"^\s*gem\s+["']{}["'].*["'](?:=\s*)?{}["']"#,
            name,
            regex::escape(version)
        ),
        None => format!(r#"^\s*gem\s+["']{}["']"#, name),
    }
}

/// Build the guard for an intent.
pub fn build_guard(intent: &Intent) -> Guard {
    match intent {
        Intent::Creates { marker } => Guard::unless(Check::PathExists {
            path: marker.clone(),
        }),
        Intent::Package {
            name,
            provider,
            ensure,
        } => {
            let installed = |version: Option<String>| Check::PackageInstalled {
                name: name.clone(),
                provider: *provider,
                version,
            };
            match ensure {
                PackageEnsure::Present => Guard::unless(installed(None)),
                PackageEnsure::Version(v) => Guard::unless(installed(Some(v.clone()))),
                PackageEnsure::Latest => Guard::unless(Check::PackageLatest {
                    name: name.clone(),
                    provider: *provider,
                }),
                PackageEnsure::Absent | PackageEnsure::Purged => Guard::only_if(installed(None)),
            }
        }
        Intent::RemoveDir { path } => Guard::only_if(Check::PathExists { path: path.clone() }),
        Intent::PluginInstall {
            name,
            version,
            manifest,
            creates,
        } => {
            let listed = Check::FileContainsLine {
                path: manifest.clone(),
                pattern: manifest_pattern(name, version.as_deref()),
            };
            match creates {
                Some(marker) => Guard::unless(Check::Any {
                    checks: vec![
                        Check::PathExists {
                            path: marker.clone(),
                        },
                        listed,
                    ],
                }),
                None => Guard::unless(listed),
            }
        }
        Intent::PluginRemove { name, list } => Guard::only_if(Check::CommandListsLine {
            command: list.clone(),
            line: name.clone(),
        }),
        Intent::LinePresent { path, line } => Guard::unless(Check::FileContainsLine {
            path: path.clone(),
            pattern: format!("^{}$", regex::escape(line)),
        }),
    }
}

/// Attach guards, turning steps into plan-ready actions.
pub fn annotate(steps: Vec<Step>) -> Vec<PlannedAction> {
    steps
        .into_iter()
        .map(|step| {
            let guard = build_guard(&step.intent);
            log::debug!("{}: {}", step.action.id, guard.describe());
            step.action.with_guard(guard)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{GuardPolarity, Provider};
    use regex::Regex;
    use std::path::PathBuf;

    #[test]
    fn test_manifest_pattern_present() {
        let re = Regex::new(&manifest_pattern("logstash-output-s3", None)).unwrap();
        assert!(re.is_match(r#"gem "logstash-output-s3""#));
        assert!(re.is_match(r#"  gem 'logstash-output-s3', "4.3.5""#));
        assert!(!re.is_match(r#"gem "logstash-output-s3-extra""#));
        assert!(!re.is_match(r#"# gem "logstash-output-s3""#));
    }

    #[test]
    fn test_manifest_pattern_version() {
        let re = Regex::new(&manifest_pattern("logstash-output-s3", Some("1.2.3"))).unwrap();
        assert!(re.is_match(r#"gem "logstash-output-s3", "1.2.3""#));
        assert!(re.is_match(r#"gem "logstash-output-s3", "= 1.2.3""#));
        assert!(!re.is_match(r#"gem "logstash-output-s3", "1.2.2""#));
        assert!(!re.is_match(r#"gem "logstash-output-s3", "1.2.33""#));
        assert!(!re.is_match(r#"gem "logstash-output-s3""#));
    }

    #[test]
    fn test_package_guards() {
        let guard = |ensure| {
            build_guard(&Intent::Package {
                name: "logstash".into(),
                provider: Provider::Apt,
                ensure,
            })
        };

        assert_eq!(guard(PackageEnsure::Present).polarity, GuardPolarity::Unless);
        assert_eq!(
            guard(PackageEnsure::Version("8.5.0".into())).check,
            Check::PackageInstalled {
                name: "logstash".into(),
                provider: Provider::Apt,
                version: Some("8.5.0".into()),
            }
        );
        assert!(matches!(
            guard(PackageEnsure::Latest).check,
            Check::PackageLatest { .. }
        ));
        assert_eq!(guard(PackageEnsure::Purged).polarity, GuardPolarity::OnlyIf);
    }

    #[test]
    fn test_creates_marker_joins_manifest_check() {
        let guard = build_guard(&Intent::PluginInstall {
            name: "logstash-filter-custom".into(),
            version: None,
            manifest: PathBuf::from("/usr/share/logstash/Gemfile"),
            creates: Some(PathBuf::from("/opt/markers/custom")),
        });
        let Check::Any { ref checks } = guard.check else {
            panic!("expected Any, got {:?}", guard.check);
        };
        assert_eq!(checks.len(), 2);
        assert!(guard.skips(Some(true)));
    }

    #[test]
    fn test_line_present_is_exact() {
        let guard = build_guard(&Intent::LinePresent {
            path: PathBuf::from("C:/logstash/bin/logstash-plugin.bat"),
            line: "exit /b %ERRORLEVEL%".into(),
        });
        let Check::FileContainsLine { pattern, .. } = guard.check else {
            panic!("expected FileContainsLine");
        };
        let re = Regex::new(&pattern).unwrap();
        assert!(re.is_match("exit /b %ERRORLEVEL%"));
        assert!(!re.is_match("rem exit /b %ERRORLEVEL%"));
    }

    #[test]
    fn test_annotate_guards_every_step() {
        let steps = vec![Step::new(
            PlannedAction::new(
                "package:install-dir",
                declarative::ActionKind::Remove,
                "Remove install directory",
                declarative::Operation::RemoveDir {
                    path: PathBuf::from("C:/logstash"),
                },
            ),
            Intent::RemoveDir {
                path: PathBuf::from("C:/logstash"),
            },
        )];
        let actions = annotate(steps);
        assert!(actions.iter().all(|a| a.guard.is_some()));
    }
}
