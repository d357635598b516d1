// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! dmrelay - relay and archive Discord direct messages.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod shell;
mod status;
mod token;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dmrelay_config::DmRelayConfig;
use dmrelay_core::DmRelayError;
use dmrelay_storage::DurableStore;

/// dmrelay - relay and archive Discord direct messages.
#[derive(Parser, Debug)]
#[command(name = "dmrelay", version, about, long_about = None)]
struct Cli {
    /// Read this TOML file instead of the standard locations.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Relay direct messages headlessly until SIGINT or SIGTERM.
    Serve,
    /// Relay direct messages with an interactive console (the default).
    Shell,
    /// Summarise the stored conversations without connecting.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// Manage dmrelay configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Save the bot token to the data directory. Prompts when omitted.
    SetToken {
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match cli.config_path.as_deref() {
        Some(path) => dmrelay_config::load_and_validate_path(path),
        None => dmrelay_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            dmrelay_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Shell) | None => shell::run_shell(config).await,
        Some(Commands::Status { json, plain }) => status::run_status(&config, json, plain),
        Some(Commands::Config {
            action: ConfigCommands::SetToken { token },
        }) => set_token(&config, token),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn set_token(config: &DmRelayConfig, token: Option<String>) -> Result<(), DmRelayError> {
    let token = match token.filter(|t| !t.trim().is_empty()) {
        Some(token) => token,
        None => token::prompt_token("New bot token: ")?,
    };
    let store = DurableStore::open(config.storage.data_path())?;
    token::save_token(&store, &token)?;
    println!("Token saved to {}", store.path(dmrelay_storage::Table::Config).display());
    Ok(())
}
