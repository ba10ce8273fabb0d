//! forge-hooks: outbound webhook delivery engine
//!
//! Entry point for the forge-hooks application.

use forge_hooks::config::{Cli, Command, ValidatedConfig, write_default_config};
use forge_hooks::crypto::AuthorizationCipher;
use std::process::ExitCode;

mod app;
mod run;

use app::{exit_code, print_config_hint, setup_tracing};
use run::Action;

/// Main entry point.
///
/// Excluded from coverage as it's the thin wrapper around testable components.
#[cfg(not(tarpaulin_include))]
fn main() -> ExitCode {
    let mut cli = Cli::parse_args();

    let action = match cli.command.take().unwrap_or(Command::Run) {
        Command::Init { output } => return handle_init(&output),
        Command::EncryptAuthorization { value } => {
            return match load_config(&cli) {
                Ok(config) => handle_encrypt(&config, &value),
                Err(code) => code,
            };
        }
        Command::Run => Action::Serve,
        Command::Replay { hook, uuid } => Action::Replay { hook_id: hook, uuid },
        Command::Submit {
            hook,
            event,
            payload,
            legacy,
        } => Action::Submit {
            hook_id: hook,
            event,
            payload,
            legacy,
        },
    };

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(code) => return code,
    };

    // Setup logging and run
    setup_tracing(config.verbose);
    tracing::info!("{config}");

    run_application(config, action)
}

/// Loads and validates configuration, reporting errors on stderr.
fn load_config(cli: &Cli) -> Result<ValidatedConfig, ExitCode> {
    ValidatedConfig::load(cli).map_err(|e| {
        eprintln!("Configuration error: {e}");
        print_config_hint(&e);
        exit_code::CONFIG_ERROR
    })
}

/// Handles the `init` subcommand.
fn handle_init(output: &std::path::Path) -> ExitCode {
    match write_default_config(output) {
        Ok(()) => {
            println!("Configuration template written to: {}", output.display());
            exit_code::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            exit_code::CONFIG_ERROR
        }
    }
}

/// Handles the `encrypt-authorization` subcommand.
///
/// Prints only the ciphertext so the output can be stored as is.
fn handle_encrypt(config: &ValidatedConfig, value: &str) -> ExitCode {
    let secret_key = match config.require_secret_key() {
        Ok(key) => key,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            print_config_hint(&e);
            return exit_code::CONFIG_ERROR;
        }
    };

    match AuthorizationCipher::new(secret_key).encrypt(value) {
        Ok(sealed) => {
            println!("{sealed}");
            exit_code::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            exit_code::runtime_error()
        }
    }
}

/// Runs a delivery command with the given configuration.
///
/// Excluded from coverage - requires async runtime.
#[cfg(not(tarpaulin_include))]
fn run_application(config: ValidatedConfig, action: Action) -> ExitCode {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to create Tokio runtime: {e}");
            return exit_code::runtime_error();
        }
    };

    match runtime.block_on(run::execute(config, action)) {
        Ok(()) => exit_code::SUCCESS,
        Err(e) => {
            tracing::error!("Application error: {e}");
            exit_code::runtime_error()
        }
    }
}
