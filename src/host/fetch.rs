//! Staging remote and master-served files onto the local filesystem.

use declarative::{ActuationError, CommandSpec};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::runner;

const USER_AGENT: &str = concat!("lsconverge/", env!("CARGO_PKG_VERSION"));

/// Copy or download `source` to `dest`.
///
/// Downloads land in a `.part` file that is renamed into place, so `dest`
/// only ever holds a complete file.
pub fn fetch(
    source: &str,
    dest: &Path,
    puppet_root: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<(), ActuationError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let scheme = source
        .split_once("://")
        .map(|(s, _)| s.to_ascii_lowercase());
    match scheme.as_deref() {
        Some("http" | "https") => download_http(source, dest, timeout),
        Some("ftp") => download_ftp(source, dest, timeout),
        Some("puppet") => {
            let path = resolve_puppet(source, puppet_root)?;
            copy_local(&path, dest)
        }
        Some("file") => copy_local(Path::new(source.trim_start_matches("file://")), dest),
        _ if source.starts_with("file:") => {
            copy_local(Path::new(source.trim_start_matches("file:")), dest)
        }
        _ if Path::new(source).is_absolute() || source.starts_with('/') => {
            copy_local(Path::new(source), dest)
        }
        _ => Err(ActuationError::Unsupported(format!("cannot fetch {}", source))),
    }
}

/// Map `puppet:///modules/<module>/<path>` (or `puppet://<server>/modules/...`)
/// to `<root>/<module>/files/<path>`.
pub fn resolve_puppet(source: &str, root: Option<&Path>) -> Result<PathBuf, ActuationError> {
    let root = root.ok_or_else(|| {
        ActuationError::Unsupported(format!(
            "{} needs a [puppet] file_root to resolve against",
            source
        ))
    })?;

    let rest = source
        .strip_prefix("puppet://")
        .and_then(|r| r.split_once('/'))
        .map(|(_server, path)| path)
        .and_then(|p| p.strip_prefix("modules/"))
        .ok_or_else(|| {
            ActuationError::Unsupported(format!("{} is not a module file URI", source))
        })?;

    let (module, path) = rest
        .split_once('/')
        .filter(|(m, p)| !m.is_empty() && !p.is_empty())
        .ok_or_else(|| {
            ActuationError::Unsupported(format!("{} names no file in its module", source))
        })?;

    Ok(root.join(module).join("files").join(path))
}

fn copy_local(from: &Path, dest: &Path) -> Result<(), ActuationError> {
    log::info!("copying {} -> {}", from.display(), dest.display());
    fs::copy(from, dest).map_err(|e| {
        ActuationError::failed(format!("Failed to copy {}: {}", from.display(), e))
    })?;
    Ok(())
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

fn download_http(url: &str, dest: &Path, timeout: Option<Duration>) -> Result<(), ActuationError> {
    log::info!("downloading {} -> {}", url, dest.display());

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(timeout)
        .build()
        .into();

    let mut response = agent
        .get(url)
        .header("User-Agent", USER_AGENT)
        .call()
        .map_err(|e| match e {
            ureq::Error::Timeout(_) => ActuationError::TimedOut {
                what: format!("download {}", url),
                after: timeout.unwrap_or_default(),
            },
            other => ActuationError::failed(format!("Failed to download {}: {}", url, other)),
        })?;

    let part = part_path(dest);
    if let Err(e) = write_body(&mut response, &part, dest) {
        let _ = fs::remove_file(&part);
        return Err(ActuationError::failed(format!(
            "Failed to write {}: {}",
            dest.display(),
            e
        )));
    }
    Ok(())
}

fn write_body(
    response: &mut ureq::http::Response<ureq::Body>,
    part: &Path,
    dest: &Path,
) -> io::Result<()> {
    let mut file = fs::File::create(part)?;
    io::copy(&mut response.body_mut().as_reader(), &mut file)?;
    file.sync_all()?;
    fs::rename(part, dest)
}

fn download_ftp(url: &str, dest: &Path, timeout: Option<Duration>) -> Result<(), ActuationError> {
    log::info!("downloading {} -> {} with wget", url, dest.display());

    let part = part_path(dest);
    let wget = CommandSpec::new("wget")
        .args(["-q", "-O"])
        .arg(part.display().to_string())
        .arg(url);

    if let Err(e) = runner::run_checked(&wget, timeout) {
        let _ = fs::remove_file(&part);
        return Err(e);
    }
    fs::rename(&part, dest)?;
    Ok(())
}
