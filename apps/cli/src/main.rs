//! gradesync CLI: faculty/grade ingestion and reconciliation.
//!
//! Scrapes the archived faculty catalog, ingests the public grade dataset,
//! and merges the two into a local libSQL store.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
