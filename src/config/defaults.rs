//! Default values for configuration options.
//!
//! Centralized constants to avoid magic numbers scattered across the codebase.

use std::time::Duration;

/// Default config file written by `init`.
pub const CONFIG_FILE: &str = "forge-hooks.toml";

/// Default number of concurrent deliveries.
pub const WORKERS: usize = 4;

/// Default whole-request timeout in seconds.
pub const TIMEOUT_SECS: u64 = 5;

/// Default wait for in-flight deliveries at shutdown, in seconds.
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Default pause between scans for tasks written by other processes, in
/// seconds. 0 disables rescanning.
pub const RESCAN_INTERVAL_SECS: u64 = 10;

/// Default host allow-list: every public address.
pub const ALLOWED_HOST_LIST: &str = "external";

/// Default store file.
pub const STORE_PATH: &str = "forge-hooks.json";

/// Default directory holding `<owner>/<name>.git` repositories.
pub const REPOSITORY_ROOT: &str = "repositories";

/// Default public URL of the forge.
pub const APP_URL: &str = "http://localhost:3000/";

/// Default request timeout as Duration.
#[must_use]
pub const fn timeout() -> Duration {
    Duration::from_secs(TIMEOUT_SECS)
}

/// Default shutdown timeout as Duration.
#[must_use]
pub const fn shutdown_timeout() -> Duration {
    Duration::from_secs(SHUTDOWN_TIMEOUT_SECS)
}
