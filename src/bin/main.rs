//! tdms-analytics binary.
//!
//! Command-line front end for ingesting instrument recordings and reading
//! windowed, downsampled channel data.

use clap::Parser;
use tdms_analytics_core::{
    cli::{commands::Commands, dispatch, init_logging},
    config::{ConfigArgs, Settings},
};
use tracing::debug;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;

    let _guard = init_logging(&settings.logging)?;
    debug!(?settings, "Configuration loaded");

    dispatch(cli.command, settings).await
}
