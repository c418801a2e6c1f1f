//! `kiln`: manage the local model artifact cache
//!
//! Usage:
//!   # Download the default model into the cache (no-op when already cached):
//!   kiln pull
//!   # Use a custom manifest and database:
//!   kiln --db /tmp/artifacts.sqlite pull --manifest model.json
//!   # Show what is cached:
//!   kiln inspect
//!   # Drop the cached model:
//!   kiln clear-cache

mod cli;

use clap::Parser;

#[tokio::main]
async fn main() -> kiln::Result<()> {
    let cli = cli::Cli::parse();
    cli::run_cli(cli).await
}
