//! Source classification.
//!
//! A source string (package URL or plugin source) is classified into the
//! way an actuator obtains it, and the path the install step consumes.

use crate::error::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Staging directory used when the caller does not choose one.
pub const DEFAULT_STAGING_DIR: &str = "/tmp";

/// How a source reaches the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Already on the local filesystem (`/...`, `file:`, `C:/...`)
    LocalFile,
    /// Served by the configuration master (`puppet:`)
    PuppetRepoFile,
    /// `http:` or `https:`
    RemoteHttp,
    /// `ftp:`
    RemoteFtp,
    /// No source: the package manager or plugin registry provides it
    Inherent,
}

/// What the classified source will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceUse {
    /// A `.deb`/`.rpm` installed by file; remote sources are always staged
    Package,
    /// A `.zip` distribution extracted on Windows; staged like packages
    Archive,
    /// Handed to the plugin installer, which fetches http(s) itself
    Plugin,
}

impl SourceUse {
    fn accepted_extensions(&self) -> Option<(&'static [&'static str], &'static str)> {
        match self {
            Self::Package => Some((&["deb", "rpm"], "deb or rpm")),
            Self::Archive => Some((&["zip"], "zip")),
            Self::Plugin => None,
        }
    }

    fn stages_remote(&self) -> bool {
        matches!(self, Self::Package | Self::Archive)
    }
}

/// Result of classifying a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedSource {
    pub kind: SourceKind,
    /// Extension of the basename, for package and archive sources
    pub extension: Option<String>,
    /// Path or URI the consuming action operates on
    pub resolved_path: String,
    /// Source as given, when there was one
    pub original: Option<String>,
}

impl ClassifiedSource {
    /// Whether a fetch must copy the source to `resolved_path` first
    pub fn needs_staging(&self) -> bool {
        self.original.is_some() && self.original.as_deref() != Some(self.resolved_path.as_str())
    }

    /// Filesystem path the install step reads, for sources that end up local
    ///
    /// `file:` URIs are turned into plain paths. Unstaged remote sources
    /// and inherent sources have none.
    pub fn local_path(&self) -> Option<PathBuf> {
        match self.kind {
            SourceKind::LocalFile => Some(PathBuf::from(strip_file_scheme(&self.resolved_path))),
            SourceKind::PuppetRepoFile => Some(PathBuf::from(&self.resolved_path)),
            SourceKind::RemoteHttp | SourceKind::RemoteFtp if self.needs_staging() => {
                Some(PathBuf::from(&self.resolved_path))
            }
            SourceKind::RemoteHttp | SourceKind::RemoteFtp | SourceKind::Inherent => None,
        }
    }
}

/// Classify a source, staging into [`DEFAULT_STAGING_DIR`].
pub fn classify(source: Option<&str>, usage: SourceUse) -> Result<ClassifiedSource> {
    classify_in(source, usage, Path::new(DEFAULT_STAGING_DIR))
}

/// Classify a source, staging into `staging_dir`.
pub fn classify_in(
    source: Option<&str>,
    usage: SourceUse,
    staging_dir: &Path,
) -> Result<ClassifiedSource> {
    let Some(source) = source else {
        return Ok(ClassifiedSource {
            kind: SourceKind::Inherent,
            extension: None,
            resolved_path: String::new(),
            original: None,
        });
    };

    let kind = kind_of(source, usage)?;
    let staged = || staging_dir.join(basename(source)).display().to_string();

    let resolved_path = match kind {
        SourceKind::LocalFile => source.to_string(),
        SourceKind::PuppetRepoFile => staged(),
        SourceKind::RemoteHttp | SourceKind::RemoteFtp if usage.stages_remote() => staged(),
        SourceKind::RemoteHttp | SourceKind::RemoteFtp => source.to_string(),
        SourceKind::Inherent => String::new(),
    };

    let extension = match usage.accepted_extensions() {
        Some((accepted, expected)) => {
            let ext = extension(basename(source));
            if !accepted.contains(&ext) {
                return Err(Error::UnsupportedExtension {
                    ext: ext.to_string(),
                    expected,
                });
            }
            Some(ext.to_string())
        }
        None => None,
    };

    log::debug!("classified source {} as {:?} -> {}", source, kind, resolved_path);

    Ok(ClassifiedSource {
        kind,
        extension,
        resolved_path,
        original: Some(source.to_string()),
    })
}

fn kind_of(source: &str, usage: SourceUse) -> Result<SourceKind> {
    if source.starts_with('/') || source.starts_with("file:") || is_drive_path(source) {
        return Ok(SourceKind::LocalFile);
    }

    let prefix = scheme(source);
    match prefix.to_ascii_lowercase().as_str() {
        "puppet" => Ok(SourceKind::PuppetRepoFile),
        "http" | "https" => Ok(SourceKind::RemoteHttp),
        // The plugin installer cannot fetch ftp and nothing stages it
        "ftp" if usage != SourceUse::Plugin => Ok(SourceKind::RemoteFtp),
        _ => Err(Error::UnsupportedScheme {
            prefix: prefix.to_string(),
        }),
    }
}

/// Text before the first ':', or the whole source when there is none.
fn scheme(source: &str) -> &str {
    source.split_once(':').map_or(source, |(prefix, _)| prefix)
}

/// `C:/...` or `C:\...`
fn is_drive_path(source: &str) -> bool {
    let bytes = source.as_bytes();
    bytes.len() > 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && matches!(bytes[2], b'/' | b'\\')
}

/// Substring after the final path separator.
pub fn basename(source: &str) -> &str {
    source.rsplit(['/', '\\']).next().unwrap_or(source)
}

/// Substring after the final '.', or the whole name when there is none.
fn extension(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

fn strip_file_scheme(source: &str) -> &str {
    source
        .strip_prefix("file://")
        .or_else(|| source.strip_prefix("file:"))
        .unwrap_or(source)
}
