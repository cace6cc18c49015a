//! Error types for planning.
//!
//! Every variant is a configuration error: it is detected while planning,
//! before any host mutation, and aborts only the resource it belongs to.

/// Result type alias for planning operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while planning a resource.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The source uses a scheme no staging path exists for.
    #[error("unsupported source scheme '{prefix}'")]
    UnsupportedScheme {
        /// Text before the first ':' (or the whole source when there is none).
        prefix: String,
    },

    /// The source file has an extension no provider installs.
    #[error("unsupported file extension '{ext}' (expected {expected})")]
    UnsupportedExtension {
        /// Extension found on the source basename.
        ext: String,
        /// Human readable list of accepted extensions.
        expected: &'static str,
    },

    /// Kernel or OS family outside the supported set.
    #[error("unsupported platform: {platform}")]
    UnsupportedPlatform {
        /// Offending kernel, family, or combination.
        platform: String,
    },

    /// Ensure value that is neither present, absent, nor a version.
    #[error("invalid ensure value '{value}': expected 'present', 'absent', or a version like '5.3.4'")]
    InvalidEnsureValue {
        /// Value as configured.
        value: String,
    },

    /// An install that can only target a versioned location had no version.
    #[error("{what} requires an explicit version")]
    MissingVersion {
        /// What was being planned.
        what: String,
    },

    /// Package or plugin name with characters no installer accepts.
    #[error("invalid {what} name '{name}'")]
    InvalidName {
        /// "package" or "plugin".
        what: &'static str,
        /// Name as configured.
        name: String,
    },

    /// Environment overlay entry not in KEY=VALUE form.
    #[error("invalid environment entry '{entry}': expected KEY=VALUE")]
    InvalidEnvironment {
        /// Entry as configured.
        entry: String,
    },

    /// A plugin declared installed while its package is declared absent.
    #[error("plugin '{plugin}' cannot be installed: package '{package}' is declared absent")]
    PackageAbsent {
        /// Plugin name as configured.
        plugin: String,
        /// Package the plugin lives in.
        package: String,
    },
}

impl Error {
    pub fn unsupported_platform(platform: impl Into<String>) -> Self {
        Self::UnsupportedPlatform {
            platform: platform.into(),
        }
    }

    pub fn invalid_ensure(value: impl Into<String>) -> Self {
        Self::InvalidEnsureValue {
            value: value.into(),
        }
    }
}
