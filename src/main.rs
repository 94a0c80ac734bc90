//! `docflow` command-line entrypoint.
use anyhow::{Context, Result};
use clap::Parser;
use docflow::{cli, config, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::init_config().context("failed to load configuration")?;
    logging::init_tracing();

    let accepted = cli::run(cli::Cli::parse(), config).await?;
    if !accepted {
        std::process::exit(2);
    }
    Ok(())
}
