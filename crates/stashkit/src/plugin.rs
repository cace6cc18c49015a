//! Plugin flow: from desired plugin state to installer invocations.

use crate::desired::{Ensure, PackageSpec, PluginSpec, Settings};
use crate::error::{Error, Result};
use crate::facts::Kernel;
use crate::source::{SourceKind, SourceUse, classify_in};
use crate::step::{Intent, Step};
use declarative::{ActionId, ActionKind, CommandSpec, Operation, PlannedAction};
use std::path::{Path, PathBuf};

/// Id of the shared Windows `logstash-plugin.bat` fix.
pub const TOOL_PATCH_ID: &str = "plugin-tool:exit-code";

/// Line that makes the Windows plugin script report the installer's exit status.
pub const EXIT_CODE_LINE: &str = "exit /b %ERRORLEVEL%";

/// `logstash-plugin` executable under a Logstash home.
pub fn plugin_tool(home: &Path, kernel: Kernel) -> PathBuf {
    match kernel {
        Kernel::Linux => home.join("bin").join("logstash-plugin"),
        Kernel::Windows => home.join("bin").join("logstash-plugin.bat"),
    }
}

/// Plan the steps converging one plugin.
///
/// Every step depends, directly or through the stage/patch steps, on
/// `anchor`, the package step that makes `logstash-plugin` available.
pub fn plan_plugin(
    spec: &PluginSpec,
    package: &PackageSpec,
    settings: &Settings,
    anchor: &ActionId,
) -> Result<Vec<Step>> {
    // Removing the package removes its plugins
    if package.ensure == Ensure::Absent {
        return match spec.ensure {
            Ensure::Absent => Ok(Vec::new()),
            Ensure::Present | Ensure::Version(_) => Err(Error::PackageAbsent {
                plugin: spec.name.clone(),
                package: package.name.clone(),
            }),
        };
    }

    let home = settings.logstash_home(package);
    let tool = plugin_tool(&home, package.kernel);
    let mut steps = Vec::new();
    let mut install_deps = vec![anchor.clone()];

    if package.kernel == Kernel::Windows {
        steps.push(Step::new(
            PlannedAction::new(
                TOOL_PATCH_ID,
                ActionKind::PatchFile,
                "Propagate logstash-plugin exit status",
                Operation::AppendLine {
                    path: tool.clone(),
                    line: EXIT_CODE_LINE.to_string(),
                },
            )
            .depends_on(anchor.clone())
            .with_retry(settings.retry),
            Intent::LinePresent {
                path: tool.clone(),
                line: EXIT_CODE_LINE.to_string(),
            },
        ));
        install_deps.push(ActionId::new(TOOL_PATCH_ID));
    }

    let base = command(&tool, spec, package.kernel, settings);

    let (id, kind, description, cmd, intent) = match &spec.ensure {
        Ensure::Absent => (
            format!("plugin:{}:remove", spec.name),
            ActionKind::Remove,
            format!("Remove plugin {}", spec.name),
            base.clone().args(["remove", spec.name.as_str()]),
            Intent::PluginRemove {
                name: spec.name.clone(),
                list: base.arg("list").arg(spec.name.clone()),
            },
        ),
        ensure => {
            let version = match ensure {
                Ensure::Version(v) => Some(v.clone()),
                Ensure::Present | Ensure::Absent => None,
            };
            let target = install_target(spec, settings, anchor, &mut steps, &mut install_deps)?;

            let mut cmd = base.arg("install");
            if let Some(v) = &version {
                cmd = cmd.args(["--version", v.as_str()]);
            }
            let description = match &version {
                Some(v) => format!("Install plugin {} {}", spec.name, v),
                None => format!("Install plugin {}", spec.name),
            };
            (
                format!("plugin:{}:install", spec.name),
                ActionKind::Install,
                description,
                cmd.arg(target),
                Intent::PluginInstall {
                    name: spec.name.clone(),
                    version,
                    manifest: home.join("Gemfile"),
                    creates: spec.creates.clone(),
                },
            )
        }
    };

    let mut action = PlannedAction::new(id, kind, description, Operation::Exec(cmd))
        .with_timeout(settings.plugin_timeout)
        .with_retry(settings.retry);
    for dep in install_deps {
        action = action.depends_on(dep);
    }
    steps.push(Step::new(action, intent));

    Ok(steps)
}

/// Installer invocation shared by install, remove and list.
fn command(tool: &Path, spec: &PluginSpec, kernel: Kernel, settings: &Settings) -> CommandSpec {
    let user = match kernel {
        Kernel::Linux => Some(settings.user.clone()),
        Kernel::Windows => None,
    };
    let mut cmd = CommandSpec::new(tool.display().to_string())
        .user(user)
        .cwd(settings.staging_dir.clone());
    for (key, value) in &spec.environment {
        cmd = cmd.env(key.clone(), value.clone());
    }
    cmd
}

/// What to pass to `install`, staging `puppet:` sources first.
fn install_target(
    spec: &PluginSpec,
    settings: &Settings,
    anchor: &ActionId,
    steps: &mut Vec<Step>,
    install_deps: &mut Vec<ActionId>,
) -> Result<String> {
    let source = classify_in(
        spec.source.as_deref(),
        SourceUse::Plugin,
        settings.staging_dir(),
    )?;

    match source.kind {
        SourceKind::Inherent => Ok(spec.name.clone()),
        SourceKind::PuppetRepoFile => {
            let stage_id = ActionId::new(format!("plugin:{}:stage", spec.name));
            let dest = PathBuf::from(&source.resolved_path);
            steps.push(Step::new(
                PlannedAction::new(
                    stage_id.clone(),
                    ActionKind::Download,
                    format!("Stage plugin {}", spec.name),
                    Operation::Fetch {
                        source: source.original.clone().unwrap_or_default(),
                        dest: dest.clone(),
                    },
                )
                .depends_on(anchor.clone())
                .with_timeout(settings.download_timeout)
                .with_retry(settings.retry),
                Intent::Creates { marker: dest },
            ));
            install_deps.push(stage_id);

            // Offline plugin packs are only recognized as file URIs
            if source.resolved_path.ends_with(".zip") {
                Ok(format!("file://{}", source.resolved_path))
            } else {
                Ok(source.resolved_path)
            }
        }
        SourceKind::LocalFile | SourceKind::RemoteHttp | SourceKind::RemoteFtp => {
            Ok(source.resolved_path)
        }
    }
}
