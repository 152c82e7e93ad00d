use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "offline-router",
    about = "Offline-first cache router for the tienda site"
)]
pub struct Cli {
    /// Path to the configuration file (defaults to /etc/offline-router/offline-router.toml or
    /// ./offline-router.toml if present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Install, activate and serve requests (default).
    Serve,
    /// Pre-cache the static manifest and exit.
    Install,
    /// Install, delete partitions from other versions and exit.
    Activate,
    /// Replay the queue for a background sync tag and exit.
    Sync {
        /// `cart-sync` or `contact-form-sync`.
        tag: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}
