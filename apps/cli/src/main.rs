//! Atomizer CLI: decompose outline text into atoms and contexts, expand
//! stored contexts, aggregate embeddings, and drain embedding jobs.

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
