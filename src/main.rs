mod app;
mod cli;
mod config;
mod paths;
mod slot;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    app::run(cli)
}
