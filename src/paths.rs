//! Path resolution for lsconverge
//!
//! # Environment Variables
//!
//! - `LSCONVERGE_CONFIG_DIR` - Override config directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `LSCONVERGE_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/lsconverge` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\lsconverge`
//!    - Linux: `~/.config/lsconverge`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "LSCONVERGE_CONFIG_DIR";

const APP_DIR: &str = "lsconverge";

/// Get the lsconverge config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join(APP_DIR);
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Run `f` with an environment variable set, restoring it afterwards
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Each test uses its own variable name
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: As above
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, "/etc/lsconverge", || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/etc/lsconverge"));
        });
    }

    #[test]
    fn test_expand_with_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand("~/logstash"), home.join("logstash"));
    }

    #[test]
    fn test_expand_absolute() {
        assert_eq!(expand("/usr/share/logstash"), PathBuf::from("/usr/share/logstash"));
    }

    #[test]
    fn test_expand_with_env_var() {
        with_env_var("LSCONVERGE_TEST_STAGING", "staging", || {
            assert_eq!(
                expand("/var/$LSCONVERGE_TEST_STAGING/x"),
                PathBuf::from("/var/staging/x")
            );
        });
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        assert_eq!(
            expand("/path/$NONEXISTENT_VAR_12345/file"),
            PathBuf::from("/path/$NONEXISTENT_VAR_12345/file")
        );
    }
}
