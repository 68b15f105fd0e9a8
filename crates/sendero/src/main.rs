// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sendero - WhatsApp campaign dispatch and delivery reconciliation.
//!
//! This is the binary entry point for the Sendero service.

use clap::{Parser, Subcommand};

mod serve;
mod sweep;

/// Sendero - WhatsApp campaign dispatch and delivery reconciliation.
#[derive(Parser, Debug)]
#[command(name = "sendero", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Sendero service (HTTP API, callbacks, periodic sweeps).
    Serve,
    /// Run one sweep and exit.
    Sweep {
        /// Purge campaigns by age regardless of status, prune routine audit
        /// entries, and compact the database.
        #[arg(long)]
        aggressive: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match sendero_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            sendero_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Sweep { aggressive }) => sweep::run_sweep(config, aggressive).await,
        None => {
            println!("sendero: use --help for available commands");
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn binary_loads_config_defaults() {
        let config = sendero_config::load_and_validate_str("")
            .expect("default config should be valid");
        assert_eq!(config.service.bind_address, "127.0.0.1:8787");
        assert_eq!(config.campaign.ttl_hours, 720);
    }
}
