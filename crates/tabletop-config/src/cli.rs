//! Command-line arguments for the relay.

use clap::Parser;

use crate::Config;

/// Relay command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "relay", about = "Board game relay server")]
pub struct CliArgs {
    /// Port to listen on.
    #[arg(long, short)]
    pub port: Option<u16>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(port) = args.port {
            self.network.server_port = port;
        }
    }
}
