//! Command-line front end of the WASM weaver.
//!
//! ```text
//! config (flags > WMR_* env > file > defaults)
//!   → read module (.wat / .wasm) and description (.toml / .json)
//!   → weave → write module, glue
//! ```

pub mod config;
pub mod glue;
pub mod io;
pub mod logging;

use anyhow::{Context, Result};
use weave_compiler::{weave, WeaveSummary};

use crate::config::{extension, ToolConfig};

/// What a run wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub summary: WeaveSummary,
    pub wrote_module: bool,
    pub wrote_js: bool,
}

/// Run the tool with a settled configuration.
pub fn run(config: &ToolConfig) -> Result<RunReport> {
    let in_module = config.input_path(&config.in_module);
    log::info!(
        "Reading module ({} file)",
        extension(&in_module).unwrap_or_default()
    );
    let text = io::read_module(&in_module)?;

    if let Some(orig) = &config.out_module_orig {
        log::info!("Printing untouched module");
        let orig = config.output_path(orig);
        if let Err(err) = io::write_module(&orig, &text) {
            log::error!("could not print the original module: {err}");
        }
    }

    log::info!("Reading transformations");
    let in_transform = config.input_path(&config.in_transform);
    let description = io::read_description(&in_transform)?;

    let result = weave(&text, &description, &config.weave_options())
        .with_context(|| format!("weaving {}", in_module.display()))?;
    let summary = result.summary();
    log::debug!("summary: {}", result.summary_json());

    if !result.applied() {
        log::info!("Finishing execution");
        return Ok(RunReport {
            summary,
            wrote_module: false,
            wrote_js: false,
        });
    }

    let mut wrote_js = false;
    if glue::needed(result.module(), config.print_js) {
        log::info!("Printing javascript glue");
        let js = glue::render(&glue::descriptors(result.module()));
        let out_js = config.output_path(&config.out_js);
        match io::write_text(&out_js, &js) {
            Ok(()) => wrote_js = true,
            Err(err) => log::warn!("could not write the javascript glue: {err}"),
        }
    }

    log::info!("Printing web assembly transformations");
    let out_module = config.output_path(&config.out_module);
    io::write_module(&out_module, &result.pretty())?;

    log::info!("Finishing execution");
    Ok(RunReport {
        summary,
        wrote_module: true,
        wrote_js,
    })
}
