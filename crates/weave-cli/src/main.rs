use anyhow::Result;
use clap::Parser;

use weave_cli::config::{Cli, ToolConfig};

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = ToolConfig::load(&cli)?;
    weave_cli::logging::init(&config)?;
    weave_cli::run(&config)?;
    Ok(())
}
