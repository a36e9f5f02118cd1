//! lineage CLI: descendant lineage crawler.
//!
//! Walks a genealogy site's profile graph from a root ancestor, scores each
//! descendant, and stores the tree for later lineage queries.

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
