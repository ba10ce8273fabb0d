//! CLI argument parsing using clap.
//!
//! Defines the command-line interface with all options and subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::model::HookEventType;

/// forge-hooks: outbound webhook delivery engine
///
/// Delivers queued hook tasks to third-party receivers, records every
/// attempt, and lets operators replay past deliveries.
#[derive(Debug, Parser)]
#[command(name = "forge-hooks")]
#[command(version, about, long_about = None)]
#[allow(clippy::struct_excessive_bools)] // CLI flags are naturally boolean
pub struct Cli {
    /// Subcommand to run (default: run)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to configuration file
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Path to the JSON store file
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Maximum number of concurrent deliveries
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Accept invalid TLS certificates from receivers
    #[arg(long = "skip-tls-verify", global = true)]
    pub skip_tls_verify: bool,

    /// Proxy for webhook requests
    #[arg(long = "proxy-url", global = true)]
    pub proxy_url: Option<String>,

    /// Host glob routed through the proxy (can be specified multiple times)
    #[arg(long = "proxy-host", value_name = "GLOB", global = true)]
    pub proxy_hosts: Vec<String>,

    /// Hosts webhooks may call, e.g. "external,*.ci.example.com"
    #[arg(long = "allowed-host-list", global = true)]
    pub allowed_host_list: Option<String>,

    /// Claim and record tasks without sending anything
    #[arg(long = "disable-deliveries", global = true)]
    pub disable_deliveries: bool,

    /// Directory holding `<owner>/<name>.git` repositories
    #[arg(long = "repository-root", global = true)]
    pub repository_root: Option<PathBuf>,

    /// Public URL of the forge
    #[arg(long = "app-url", global = true)]
    pub app_url: Option<String>,
}

/// Subcommands for forge-hooks
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a default configuration file
    Init {
        /// Output path for the configuration file
        #[arg(long, short, default_value = super::defaults::CONFIG_FILE)]
        output: PathBuf,
    },

    /// Deliver pending tasks until interrupted
    Run,

    /// Copy a past delivery into a new task and deliver it
    Replay {
        /// Webhook id
        #[arg(long)]
        hook: i64,

        /// Uuid of the task to replay
        #[arg(long)]
        uuid: String,
    },

    /// Create a task from a payload file and deliver it
    Submit {
        /// Webhook id
        #[arg(long)]
        hook: i64,

        /// Event type, e.g. "push" or "issue_comment"
        #[arg(long)]
        event: HookEventType,

        /// JSON payload file
        #[arg(long)]
        payload: PathBuf,

        /// Send the payload unchanged through the default handler
        #[arg(long)]
        legacy: bool,
    },

    /// Encrypt an Authorization header value for storage on a webhook
    EncryptAuthorization {
        /// Header value, e.g. "Bearer abc123"
        value: String,
    },
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Parses CLI arguments from an iterator (useful for testing).
    pub fn parse_from_iter<I, T>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::parse_from(iter)
    }

    /// Returns true if this is the init command.
    #[must_use]
    pub const fn is_init(&self) -> bool {
        matches!(self.command, Some(Command::Init { .. }))
    }
}
