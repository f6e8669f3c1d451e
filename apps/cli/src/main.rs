//! Draftforge CLI — topic-to-article generation tool.
//!
//! Turns a single topic into a publishable markdown article with citations,
//! SEO metadata, and fact-check annotations.

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
