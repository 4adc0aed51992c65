mod bridge;
mod config;
mod diagnostics;
mod editor;
mod error;
mod io;
mod logging;
mod project;
mod rc;
mod session;

#[cfg(test)]
mod test_utils;

use clap::Parser;
use logging::{LogConfig, init_logging};

use bridge::{BridgeDefaults, process_backend};
use config::Settings;
use std::path::PathBuf;
use tokio::io::{stdin, stdout};
use tracing::info;

/// CLI arguments for the RTags editor bridge
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the rc client (overrides RC_PATH env var)
    #[arg(long, value_name = "PATH")]
    rc_path: Option<String>,

    /// Path to the rdm daemon (overrides RDM_PATH env var)
    #[arg(long, value_name = "PATH")]
    rdm_path: Option<String>,

    /// JSON settings used when the editor sends none with `initialize`
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Log level (overrides RUST_LOG env var)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log file path (overrides RTAGS_LOG_FILE env var)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

/// CLI arg > environment variable; None leaves the choice to settings/defaults
fn resolve_executable(arg: Option<String>, env_var: &str) -> Option<String> {
    arg.or_else(|| std::env::var(env_var).ok())
        .filter(|path| !path.trim().is_empty())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_config = LogConfig::from_env().with_overrides(args.log_level, args.log_file);

    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let settings = match &args.settings {
        Some(path) => match Settings::from_file(path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        },
        None => Settings::default(),
    };

    let defaults = BridgeDefaults {
        rc_executable: resolve_executable(args.rc_path, "RC_PATH"),
        rdm_executable: resolve_executable(args.rdm_path, "RDM_PATH"),
        settings,
    };
    info!(
        "RTags bridge ready (rc: {}, rdm: {})",
        defaults.rc_executable.as_deref().unwrap_or("from settings"),
        defaults.rdm_executable.as_deref().unwrap_or("from settings")
    );

    bridge::run(stdin(), stdout(), defaults, Box::new(process_backend)).await?;

    info!("RTags bridge shutdown");
    Ok(())
}
