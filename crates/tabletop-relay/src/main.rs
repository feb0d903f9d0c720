//! Relay entry point.
//!
//! Loads `config.ron` (creating it on first run), applies the `--port`
//! override, binds the listening socket and relays until the listener fails
//! or Ctrl+C is pressed.
//!
//! Run with: `cargo run -p tabletop-relay -- --port 6061`

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tabletop_config::{CliArgs, Config, ConfigError, default_config_dir};
use tabletop_net::{Relay, RelayConfig};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Config from the default directory, or defaults plus the reason they were
/// needed.
fn load_config() -> (Config, Option<String>) {
    let Some(dir) = default_config_dir() else {
        return (
            Config::default(),
            Some("no config directory on this platform".to_string()),
        );
    };
    match Config::load_or_create(&dir) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(format!("{}: {e}", dir.display()))),
    }
}

fn relay_config(config: &Config) -> Result<RelayConfig, ConfigError> {
    Ok(RelayConfig {
        bind_addr: config.network.bind_socket_addr()?,
        max_connections: config.network.max_connections,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let (mut config, load_problem) = load_config();
    config.apply_cli_overrides(&args);

    if let Err(e) = tabletop_log::init_logging(config.debug.log_dir.as_deref(), Some(&config)) {
        eprintln!("Could not initialise logging: {e}");
    }
    if let Some(problem) = load_problem {
        warn!("Using default config ({problem})");
    }

    let relay_config = match relay_config(&config) {
        Ok(relay_config) => relay_config,
        Err(e) => {
            eprintln!("Invalid network config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let listener = match TcpListener::bind(relay_config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Cannot listen on {}: {e}", relay_config.bind_addr);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Relay listening on {} (max {} connections)",
        relay_config.bind_addr, relay_config.max_connections
    );

    let relay = Arc::new(Relay::new(relay_config));
    let on_interrupt = Arc::clone(&relay);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted");
            on_interrupt.shutdown();
        }
    });

    match relay.run_with_listener(listener).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Relay stopped: {e}");
            eprintln!("Relay stopped: {e}");
            ExitCode::FAILURE
        }
    }
}
