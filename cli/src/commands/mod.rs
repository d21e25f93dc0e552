//! CLI command definitions and dispatch.

mod copy;

use clap::{Parser, Subcommand};

pub use copy::CopyArgs;

/// bundlecopy: copy bundles and images between registries and tar archives.
#[derive(Parser)]
#[command(name = "bundlecopy", version, about)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Copy a bundle, image or images lock to a repository or tar archive
    Copy(copy::CopyArgs),
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Copy(args) => copy::execute(args).await,
    }
}
