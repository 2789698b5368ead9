//! swemu
//!
//! Parses CLI arguments, sets up logging and runs the proxy.

use clap::Parser as ClapParser;
use sw_server::{Cli, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_cli(&cli)?;
    sw_server::run(config).await?;
    Ok(())
}
