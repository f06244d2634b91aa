use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "teebook",
    version,
    about = "Book the earliest tee time in your preferred window"
)]
pub struct Cli {
    /// Read settings from this env-style file instead of the default lookup
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log every step at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Make one booking attempt (default)
    Book,
    /// Validate configuration and print the resolved preference
    Check,
    /// Sign in and list the tee sheet without reserving anything
    Slots {
        #[arg(long)]
        json: bool,
    },
}
