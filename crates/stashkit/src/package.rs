//! Package flow: from desired package state to ordered steps.

use crate::desired::{Ensure, PackageSpec, Settings};
use crate::error::{Error, Result};
use crate::facts::{Kernel, OsFamily};
use crate::source::{ClassifiedSource, SourceUse, classify_in};
use crate::step::{Intent, Step};
use crate::version::normalize;
use declarative::{ActionId, ActionKind, Operation, PackageEnsure, PlannedAction, Provider};
use std::path::PathBuf;

/// Id of the external action that refreshes the Debian package index.
pub const INDEX_REFRESH: &str = "package-index:refresh";

const STAGE_ID: &str = "package:stage";
const EXTRACT_ID: &str = "package:extract";
const REGISTRATION_ID: &str = "package:registration";
const INSTALL_DIR_ID: &str = "package:install-dir";

/// Steps for the package and the action plugins hang off.
#[derive(Debug, Clone)]
pub struct PackagePlan {
    pub steps: Vec<Step>,
    /// Last step of the flow; plugin steps depend on it
    pub anchor: ActionId,
}

/// Plan the package flow for a host.
pub fn plan_package(spec: &PackageSpec, settings: &Settings) -> Result<PackagePlan> {
    match spec.kernel {
        Kernel::Linux => plan_linux(spec, settings),
        Kernel::Windows => plan_windows(spec, settings),
    }
}

fn package_id(spec: &PackageSpec) -> ActionId {
    ActionId::new(format!("package:{}", spec.name))
}

fn plan_linux(spec: &PackageSpec, settings: &Settings) -> Result<PackagePlan> {
    let id = package_id(spec);

    if spec.ensure == Ensure::Absent {
        // zypper has no purge; remove through rpm instead
        let (ensure, provider) = match spec.os_family {
            OsFamily::Suse => (PackageEnsure::Absent, Provider::Rpm),
            _ => (PackageEnsure::Purged, spec.provider),
        };
        log::debug!("{}: remove with {} ({})", spec.name, provider, ensure);
        let step = package_step(id.clone(), spec, ensure, provider, None, settings);
        return Ok(PackagePlan {
            steps: vec![step],
            anchor: id,
        });
    }

    let version = spec.version().map(|v| normalize(v, spec.os_family));

    let Some(url) = spec.source_url.as_deref() else {
        let ensure = match version {
            Some(v) => PackageEnsure::Version(v),
            None if settings.auto_upgrade => PackageEnsure::Latest,
            None => PackageEnsure::Present,
        };
        let mut step = package_step(id.clone(), spec, ensure, spec.provider, None, settings);
        if spec.os_family == OsFamily::Debian && settings.manage_repo {
            step.action = step.action.depends_on(INDEX_REFRESH);
        }
        return Ok(PackagePlan {
            steps: vec![step],
            anchor: id,
        });
    };

    let source = classify_in(Some(url), SourceUse::Package, settings.staging_dir())?;
    let provider = match source.extension.as_deref() {
        Some("deb") => Provider::Dpkg,
        _ => Provider::Rpm,
    };
    let ensure = version.map_or(PackageEnsure::Present, PackageEnsure::Version);

    let mut steps = Vec::with_capacity(2);
    let stage = stage_step(&source, settings);
    let local = local_file(&source);
    let mut install = package_step(id.clone(), spec, ensure, provider, Some(local), settings);
    if let Some(stage) = stage {
        install.action = install.action.depends_on(stage.action.id.clone());
        steps.push(stage);
    }
    steps.push(install);

    Ok(PackagePlan { steps, anchor: id })
}

fn plan_windows(spec: &PackageSpec, settings: &Settings) -> Result<PackagePlan> {
    if spec.ensure == Ensure::Absent {
        let path = settings.home_dir.clone();
        let step = Step::new(
            PlannedAction::new(
                INSTALL_DIR_ID,
                ActionKind::Remove,
                format!("Remove {}", path.display()),
                Operation::RemoveDir { path: path.clone() },
            )
            .with_retry(settings.retry),
            Intent::RemoveDir { path },
        );
        return Ok(PackagePlan {
            steps: vec![step],
            anchor: ActionId::new(INSTALL_DIR_ID),
        });
    }

    let version = spec.version().ok_or_else(|| Error::MissingVersion {
        what: format!("{} on windows", spec.name),
    })?;
    let url = spec
        .source_url
        .clone()
        .unwrap_or_else(|| default_archive_url(version));
    let source = classify_in(Some(&url), SourceUse::Archive, settings.staging_dir())?;
    let install_dir = settings.windows_install_dir(version);

    let mut steps = Vec::with_capacity(3);
    let mut extract = PlannedAction::new(
        EXTRACT_ID,
        ActionKind::ExtractStage,
        format!("Extract {} {}", spec.name, version),
        Operation::Extract {
            archive: local_file(&source),
            dest: settings.home_dir.clone(),
        },
    )
    .with_timeout(settings.package_timeout)
    .with_retry(settings.retry);

    if source.needs_staging() {
        // Skip the download too once the versioned directory exists
        let stage = Step::new(
            PlannedAction::new(
                STAGE_ID,
                ActionKind::Download,
                format!("Download {}", basename_of(&source)),
                Operation::Fetch {
                    source: url.clone(),
                    dest: PathBuf::from(&source.resolved_path),
                },
            )
            .with_timeout(settings.download_timeout)
            .with_retry(settings.retry),
            Intent::Creates {
                marker: install_dir.clone(),
            },
        );
        extract = extract.depends_on(STAGE_ID);
        steps.push(stage);
    }

    steps.push(Step::new(
        extract,
        Intent::Creates {
            marker: install_dir,
        },
    ));

    // A previously registered install is superseded by the extracted one
    let registration = PackageEnsure::Absent;
    steps.push(Step::new(
        PlannedAction::new(
            REGISTRATION_ID,
            ActionKind::Remove,
            format!("Unregister previous {} install", spec.name),
            Operation::Package {
                name: spec.name.clone(),
                ensure: registration.clone(),
                provider: Provider::Windows,
                source: None,
            },
        )
        .depends_on(EXTRACT_ID)
        .with_timeout(settings.package_timeout)
        .with_retry(settings.retry),
        Intent::Package {
            name: spec.name.clone(),
            provider: Provider::Windows,
            ensure: registration,
        },
    ));

    Ok(PackagePlan {
        steps,
        anchor: ActionId::new(EXTRACT_ID),
    })
}

/// Vendor download location of the Windows distribution.
pub fn default_archive_url(version: &str) -> String {
    format!(
        "https://artifacts.elastic.co/downloads/logstash/logstash-{}.zip",
        version
    )
}

fn package_step(
    id: ActionId,
    spec: &PackageSpec,
    ensure: PackageEnsure,
    provider: Provider,
    source: Option<PathBuf>,
    settings: &Settings,
) -> Step {
    let kind = if ensure.is_removal() {
        ActionKind::Remove
    } else {
        ActionKind::Install
    };
    let description = match &source {
        Some(file) => format!("Install {} from {}", spec.name, file.display()),
        None if ensure.is_removal() => format!("Remove {}", spec.name),
        None => format!("Install {} ({})", spec.name, ensure),
    };
    Step::new(
        PlannedAction::new(
            id,
            kind,
            description,
            Operation::Package {
                name: spec.name.clone(),
                ensure: ensure.clone(),
                provider,
                source,
            },
        )
        .with_timeout(settings.package_timeout)
        .with_retry(settings.retry),
        Intent::Package {
            name: spec.name.clone(),
            provider,
            ensure,
        },
    )
}

fn stage_step(source: &ClassifiedSource, settings: &Settings) -> Option<Step> {
    let original = source.original.as_ref().filter(|_| source.needs_staging())?;
    let dest = PathBuf::from(&source.resolved_path);
    Some(Step::new(
        PlannedAction::new(
            STAGE_ID,
            ActionKind::Download,
            format!("Download {}", basename_of(source)),
            Operation::Fetch {
                source: original.clone(),
                dest: dest.clone(),
            },
        )
        .with_timeout(settings.download_timeout)
        .with_retry(settings.retry),
        Intent::Creates { marker: dest },
    ))
}

fn local_file(source: &ClassifiedSource) -> PathBuf {
    source
        .local_path()
        .unwrap_or_else(|| PathBuf::from(&source.resolved_path))
}

fn basename_of(source: &ClassifiedSource) -> &str {
    crate::source::basename(&source.resolved_path)
}
