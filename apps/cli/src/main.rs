//! orgenrich CLI: organization record enrichment and bulk indexing.
//!
//! Reads a member dataset, asks a generation service for classification and
//! AFI scoring per record, validates the answers, and loads the merged
//! documents into an OpenSearch-compatible index.

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
