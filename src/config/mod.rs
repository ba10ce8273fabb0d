//! Configuration layer for forge-hooks.
//!
//! This module provides:
//! - CLI argument parsing ([`Cli`], [`Command`])
//! - TOML configuration file parsing ([`TomlConfig`])
//! - Validated configuration ([`ValidatedConfig`])
//! - Configuration file generation ([`write_default_config`])
//! - Default values ([`defaults`])
//!
//! # Priority
//!
//! Configuration values are resolved with the following priority (highest to lowest):
//!
//! 1. **Explicit CLI arguments** - Values explicitly passed via command line
//! 2. **TOML config file** - Values from the configuration file
//! 3. **Built-in defaults** - Hardcoded default values
//!
//! Proxy hosts given with `--proxy-host` **replace** the TOML `proxy_hosts`
//! list entirely.
//!
//! # Boolean Flag Semantics
//!
//! Boolean flags (`--skip-tls-verify`, `--disable-deliveries`) use OR semantics:
//! once set `true` in TOML, the CLI cannot turn them off again.
//!
//! # TOML-Only Options
//!
//! - `delivery.shutdown_timeout` (default: 10s)
//! - `delivery.rescan_interval` (default: 10s, 0 scans only at startup)
//! - `security.secret_key` (no default; required by `encrypt-authorization`,
//!   and by delivery of webhooks carrying an encrypted Authorization header)

mod cli;
pub mod defaults;
mod error;
mod toml;
mod validated;


pub use cli::{Cli, Command};
pub use error::{ConfigError, field};
pub use toml::{TomlConfig, default_config_template};
pub use validated::{ValidatedConfig, write_default_config};
