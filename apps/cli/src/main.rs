//! Leadflow CLI: run, validate and inspect lead-generation pipelines.
//!
//! Credentials are read from the environment variables named in the app
//! config; a `.env` file in the working directory is loaded first.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
