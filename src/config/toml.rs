//! TOML configuration file parsing.
//!
//! Defines the structure of the configuration file with serde.

use std::path::Path;

use serde::Deserialize;

use super::ConfigError;

/// Root configuration structure from TOML file.
///
/// All fields are optional to allow partial configuration
/// that can be merged with CLI arguments.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    /// Delivery engine section
    #[serde(default)]
    pub delivery: DeliverySection,

    /// Outbound HTTP section
    #[serde(default)]
    pub transport: TransportSection,

    /// Task store section
    #[serde(default)]
    pub store: StoreSection,

    /// Repository access section
    #[serde(default)]
    pub repository: RepositorySection,

    /// Secrets section
    #[serde(default)]
    pub security: SecuritySection,
}

/// Delivery engine section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeliverySection {
    /// Maximum number of concurrent deliveries
    pub workers: Option<usize>,

    /// Claim and record tasks without sending anything
    #[serde(default)]
    pub disabled: bool,

    /// Seconds to wait for in-flight deliveries at shutdown
    pub shutdown_timeout: Option<u64>,

    /// Seconds between scans for new tasks in the store; 0 disables
    pub rescan_interval: Option<u64>,
}

/// Outbound HTTP section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportSection {
    /// Request timeout in seconds
    pub timeout: Option<u64>,

    /// Accept invalid TLS certificates
    #[serde(default)]
    pub skip_tls_verify: bool,

    /// Proxy for webhook requests
    pub proxy_url: Option<String>,

    /// Host globs routed through the proxy
    #[serde(default)]
    pub proxy_hosts: Vec<String>,

    /// Hosts webhooks may call
    pub allowed_host_list: Option<String>,
}

/// Task store section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    /// Path to the JSON store file
    pub path: Option<String>,
}

/// Repository access section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositorySection {
    /// Directory holding `<owner>/<name>.git` repositories
    pub root: Option<String>,

    /// Public URL of the forge
    pub app_url: Option<String>,
}

/// Secrets section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecuritySection {
    /// Key protecting stored Authorization header values
    pub secret_key: Option<String>,
}

impl TomlConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::from)
    }
}

/// Generates a default configuration file with comments.
#[must_use]
pub fn default_config_template() -> String {
    r#"# forge-hooks Configuration File

[delivery]
# Maximum number of concurrent deliveries (default: 4)
workers = 4

# Claim and record tasks without sending anything
# disabled = false

# Seconds to wait for in-flight deliveries at shutdown (default: 10)
# shutdown_timeout = 10

# Seconds between scans for tasks submitted by other processes; 0 scans
# only at startup (default: 10)
# rescan_interval = 10

[transport]
# Whole-request timeout in seconds (default: 5)
timeout = 5

# Accept invalid TLS certificates from receivers
# skip_tls_verify = false

# Proxy for webhook requests; only hosts matching proxy_hosts use it
# proxy_url = "http://proxy.internal:3128"
# proxy_hosts = ["*.github.com", "hooks.slack.com"]

# Hosts webhooks may call, comma separated (default: "external")
# Builtins: "external", "private", "loopback", "*"; also CIDRs and host globs
allowed_host_list = "external"

[store]
# JSON file holding webhooks and tasks (default: "forge-hooks.json")
# path = "~/.local/share/forge-hooks/store.json"

[repository]
# Directory holding <owner>/<name>.git repositories (default: "repositories")
# root = "/var/lib/forge/repositories"

# Public URL of the forge, announced to CI builders
# app_url = "https://forge.example.com/"

[security]
# Key protecting stored Authorization header values
# secret_key = "change-me"
"#
    .to_string()
}
