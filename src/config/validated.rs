//! Validated configuration after merging CLI and TOML sources.
//!
//! This module contains the final, validated configuration that is used
//! by the application. All validation is performed during construction.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::delivery::EngineConfig;
use crate::transport::{ALLOWED_HOST_LIST_SETTING, HostMatchList, TransportConfig, glob_to_regex};

use super::cli::Cli;
use super::defaults;
use super::error::{ConfigError, field};
use super::toml::TomlConfig;

/// Fully validated configuration ready for use by the application.
///
/// # Construction
///
/// Use [`ValidatedConfig::from_raw`] to create from CLI args and optional TOML config.
/// The function validates all inputs and returns errors for invalid configurations.
#[derive(Debug)]
pub struct ValidatedConfig {
    /// Settings handed to the delivery engine
    pub engine: EngineConfig,

    /// JSON store file
    pub store_path: PathBuf,

    /// Directory holding `<owner>/<name>.git` repositories
    pub repository_root: PathBuf,

    /// Verbose logging enabled
    pub verbose: bool,
}

impl fmt::Display for ValidatedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let transport = &self.engine.transport;
        let proxy = transport
            .proxy_url
            .as_ref()
            .map_or_else(|| "none".to_string(), Url::to_string);

        write!(
            f,
            "Config {{ store: {}, repositories: {}, workers: {}, timeout: {}s, \
             allowed_host_list: {}, proxy: {} ({} hosts), deliveries_disabled: {}, app_url: {} }}",
            self.store_path.display(),
            self.repository_root.display(),
            self.engine.workers,
            transport.timeout.as_secs(),
            transport.allowed_host_list,
            proxy,
            transport.proxy_hosts.len(),
            self.engine.deliveries_disabled,
            self.engine.app_url,
        )
    }
}

impl ValidatedConfig {
    /// Creates a validated configuration from CLI arguments and optional TOML config.
    ///
    /// CLI arguments take precedence over TOML config values, which take
    /// precedence over the [`defaults`].
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The worker count or a duration is zero
    /// - The proxy URL or app URL is invalid
    /// - The allow-list or a proxy host glob does not compile
    /// - A `~` path cannot be expanded
    pub fn from_raw(cli: &Cli, toml: Option<&TomlConfig>) -> Result<Self, ConfigError> {
        let workers = Self::resolve_workers(cli, toml)?;

        // Flags only enable
        let deliveries_disabled =
            cli.disable_deliveries || toml.is_some_and(|t| t.delivery.disabled);

        let shutdown_timeout = Self::resolve_shutdown_timeout(toml)?;
        let rescan_interval = Self::resolve_rescan_interval(toml);
        let transport = Self::build_transport(cli, toml)?;
        let app_url = Self::resolve_app_url(cli, toml)?;

        let secret_key = toml
            .and_then(|t| t.security.secret_key.clone())
            .unwrap_or_default();

        let store_path = resolve_path(
            cli.store.as_deref(),
            toml.and_then(|t| t.store.path.as_deref()),
            defaults::STORE_PATH,
        )?;
        let repository_root = resolve_path(
            cli.repository_root.as_deref(),
            toml.and_then(|t| t.repository.root.as_deref()),
            defaults::REPOSITORY_ROOT,
        )?;

        Ok(Self {
            engine: EngineConfig {
                workers,
                deliveries_disabled,
                shutdown_timeout,
                rescan_interval,
                transport,
                app_url,
                secret_key,
            },
            store_path,
            repository_root,
            verbose: cli.verbose,
        })
    }

    /// Loads and merges configuration from CLI and optional config file.
    ///
    /// If `cli.config` is set, loads the TOML file from that path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config file cannot be read or parsed
    /// - The merged configuration is invalid
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let toml = if let Some(ref path) = cli.config {
            Some(TomlConfig::load(path)?)
        } else {
            None
        };

        Self::from_raw(cli, toml.as_ref())
    }

    /// The secret key, for commands that cannot work without one.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequired`] when no key is configured.
    pub fn require_secret_key(&self) -> Result<&str, ConfigError> {
        if self.engine.secret_key.is_empty() {
            return Err(ConfigError::missing(
                field::SECRET_KEY,
                "Set security.secret_key in the config file",
            ));
        }
        Ok(&self.engine.secret_key)
    }

    fn resolve_workers(cli: &Cli, toml: Option<&TomlConfig>) -> Result<usize, ConfigError> {
        let workers = cli
            .workers
            .or_else(|| toml.and_then(|t| t.delivery.workers))
            .unwrap_or(defaults::WORKERS);

        if workers == 0 {
            return Err(ConfigError::InvalidWorkers(workers));
        }

        Ok(workers)
    }

    fn resolve_shutdown_timeout(toml: Option<&TomlConfig>) -> Result<Duration, ConfigError> {
        let seconds = toml
            .and_then(|t| t.delivery.shutdown_timeout)
            .unwrap_or(defaults::SHUTDOWN_TIMEOUT_SECS);

        positive_secs("delivery.shutdown_timeout", seconds)
    }

    fn resolve_rescan_interval(toml: Option<&TomlConfig>) -> Option<Duration> {
        let seconds = toml
            .and_then(|t| t.delivery.rescan_interval)
            .unwrap_or(defaults::RESCAN_INTERVAL_SECS);

        (seconds > 0).then(|| Duration::from_secs(seconds))
    }

    fn build_transport(
        cli: &Cli,
        toml: Option<&TomlConfig>,
    ) -> Result<TransportConfig, ConfigError> {
        let section = toml.map(|t| &t.transport);

        let timeout_secs = cli
            .timeout
            .or_else(|| section.and_then(|s| s.timeout))
            .unwrap_or(defaults::TIMEOUT_SECS);
        let timeout = positive_secs("transport.timeout", timeout_secs)?;

        let skip_tls_verify = cli.skip_tls_verify || section.is_some_and(|s| s.skip_tls_verify);

        let proxy_url = cli
            .proxy_url
            .as_deref()
            .or_else(|| section.and_then(|s| s.proxy_url.as_deref()))
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(|raw| parse_url("transport.proxy_url", raw))
            .transpose()?;

        // CLI hosts replace TOML hosts entirely
        let proxy_hosts = if cli.proxy_hosts.is_empty() {
            section.map(|s| s.proxy_hosts.clone()).unwrap_or_default()
        } else {
            cli.proxy_hosts.clone()
        };
        for pattern in &proxy_hosts {
            glob_to_regex(pattern.trim()).map_err(|source| ConfigError::InvalidProxyHost {
                pattern: pattern.clone(),
                source,
            })?;
        }

        let allowed_host_list = cli
            .allowed_host_list
            .clone()
            .or_else(|| section.and_then(|s| s.allowed_host_list.clone()))
            .unwrap_or_else(|| defaults::ALLOWED_HOST_LIST.to_string());
        HostMatchList::parse(ALLOWED_HOST_LIST_SETTING, &allowed_host_list)?;

        Ok(TransportConfig {
            timeout,
            skip_tls_verify,
            proxy_url,
            proxy_hosts,
            allowed_host_list,
        })
    }

    fn resolve_app_url(cli: &Cli, toml: Option<&TomlConfig>) -> Result<String, ConfigError> {
        let raw = cli
            .app_url
            .as_deref()
            .or_else(|| toml.and_then(|t| t.repository.app_url.as_deref()))
            .unwrap_or(defaults::APP_URL);

        parse_url("repository.app_url", raw).map(String::from)
    }
}

/// Writes the default configuration template to a file.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    let template = super::toml::default_config_template();
    std::fs::write(path, template).map_err(|e| ConfigError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

// Helper functions

fn positive_secs(field: &'static str, seconds: u64) -> Result<Duration, ConfigError> {
    if seconds == 0 {
        return Err(ConfigError::InvalidDuration {
            field,
            reason: "must be greater than 0".to_string(),
        });
    }
    Ok(Duration::from_secs(seconds))
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        field,
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

fn resolve_path(
    cli: Option<&Path>,
    toml: Option<&str>,
    default: &str,
) -> Result<PathBuf, ConfigError> {
    match (cli, toml) {
        // Non UTF-8 paths cannot start with `~` and are taken as is.
        (Some(path), _) => path
            .to_str()
            .map_or_else(|| Ok(path.to_path_buf()), expand_tilde),
        (None, Some(raw)) => expand_tilde(raw),
        (None, None) => Ok(PathBuf::from(default)),
    }
}

/// Expands a leading `~` or `~/` to the home directory.
pub(super) fn expand_tilde(path: &str) -> Result<PathBuf, ConfigError> {
    let rest = if path == "~" {
        Some("")
    } else {
        path.strip_prefix("~/")
    };

    match rest {
        None => Ok(PathBuf::from(path)),
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .ok_or_else(|| ConfigError::NoHomeDir(path.to_string())),
    }
}
