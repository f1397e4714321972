//! Logger setup for the binary.

use std::fs::OpenOptions;

use anyhow::{Context, Result};

use crate::config::ToolConfig;

/// Install `env_logger`: `info` by default, `debug` when verbose.
/// `RUST_LOG` overrides both. With `log_file` set, records go there.
pub fn init(config: &ToolConfig) -> Result<()> {
    let level = if config.verbose { "debug" } else { "info" };
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    builder.format_timestamp_nanos();

    if let Some(path) = &config.log_file {
        let path = config.output_path(path);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        println!("Logging to {}", path.display());
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init().context("installing the logger")
}
