// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ratel - a community bot backend.
//!
//! This is the binary entry point for the Ratel service.

mod rpc_service;
mod serve;
mod shutdown;

use clap::{Parser, Subcommand};

/// Ratel - a community bot backend.
#[derive(Parser, Debug)]
#[command(name = "ratel", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the bot service.
    Serve,
    /// Print the effective configuration and exit.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ratel_config::load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ratel: {e}");
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("ratel serve: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Config) => match toml::to_string_pretty(&config) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => {
                eprintln!("ratel config: {e}");
                std::process::exit(1);
            }
        },
        None => {
            println!("ratel: use --help for available commands");
        }
    }
}
