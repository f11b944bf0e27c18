//! session-broadcast binary entry point.

use std::path::Path;
use std::process::ExitCode;

use session_broadcast::auth::{CredentialStorage, FileStorage};
use session_broadcast::cli;
use session_broadcast::config::Config;
use session_broadcast::ping::{BEDROCK_GAME_VERSION, BEDROCK_PROTOCOL_VERSION};
use session_broadcast::{logging, Broadcaster};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Run with --help for usage.");
            return ExitCode::FAILURE;
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config.log_filter());

    info!(
        "Starting session-broadcast {} for Bedrock {} ({})",
        env!("CARGO_PKG_VERSION"),
        BEDROCK_GAME_VERSION,
        BEDROCK_PROTOCOL_VERSION
    );
    for warning in config.warnings() {
        warn!("{}", warning);
    }

    if let Some(ref path) = args.import {
        return import_credential(&config, path);
    }

    let broadcaster = match Broadcaster::from_config(&config) {
        Ok(broadcaster) => broadcaster,
        Err(e) => {
            error!("Failed to set up: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match broadcaster.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to create session: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn import_credential(config: &Config, path: &Path) -> ExitCode {
    let storage = FileStorage::new(&config.cache_dir);
    let result = FileStorage::read_credential_file(path)
        .and_then(|credential| storage.save_credential(&credential).map(|_| credential));

    match result {
        Ok(credential) => {
            info!(
                "Imported credential for {} into {}",
                credential.gamertag,
                storage.credential_path().display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to import credential: {}", e);
            ExitCode::FAILURE
        }
    }
}
