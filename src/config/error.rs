//! Error types for configuration parsing and validation.

use std::path::PathBuf;

use thiserror::Error;

use crate::transport::HostMatchError;

/// Error type for configuration operations.
///
/// Covers errors from parsing, validation, and file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config file '{}': {source}", path.display())]
    FileRead {
        /// Path to the config file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to write configuration file (for init command).
    #[error("Failed to write config file '{}': {source}", path.display())]
    FileWrite {
        /// Path to the config file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Missing field required by the selected command.
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired {
        /// Name of the missing field
        field: &'static str,
        /// Hint for how to provide the value
        hint: &'static str,
    },

    /// Invalid URL provided.
    #[error("Invalid URL '{url}' for {field}: {reason}")]
    InvalidUrl {
        field: &'static str,
        /// The invalid URL string
        url: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Invalid duration value.
    #[error("Invalid duration for {field}: {reason}")]
    InvalidDuration {
        /// Name of the field
        field: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Worker count out of range.
    #[error("Invalid worker count {0}: must be greater than 0")]
    InvalidWorkers(usize),

    /// The host allow-list does not parse.
    #[error(transparent)]
    InvalidAllowList(#[from] HostMatchError),

    /// A proxy host glob does not compile.
    #[error("Invalid proxy host pattern '{pattern}': {source}")]
    InvalidProxyHost {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A path starting with `~` but no home directory is known.
    #[error("Cannot expand '{0}': home directory is unknown")]
    NoHomeDir(String),
}

/// Well-known field names for `MissingRequired` errors.
pub mod field {
    /// The secret key protecting stored authorization values.
    pub const SECRET_KEY: &str = "security.secret_key";
}

impl ConfigError {
    /// Creates a `MissingRequired` error for a required field.
    #[must_use]
    pub const fn missing(field: &'static str, hint: &'static str) -> Self {
        Self::MissingRequired { field, hint }
    }
}
