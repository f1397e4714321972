//! Tool configuration.
//!
//! Every key can come from four places, highest precedence first:
//! command-line flags, `WMR_*` environment variables, a configuration
//! file and the built-in defaults. Each source is read into a
//! [`ConfigLayer`] of optional values and the layers are merged.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use weave_compiler::WeaveOptions;

pub const ENV_PREFIX: &str = "WMR_";

/// Weave a transformation description into a WebAssembly module.
#[derive(Parser, Debug, Default)]
#[command(name = "wasm-weaver", version)]
pub struct Cli {
    /// Configuration file (.toml or .json)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Input module (.wat or .wasm)
    #[arg(long, value_name = "PATH")]
    pub in_module: Option<PathBuf>,

    /// Transformation description (.toml or .json)
    #[arg(long, value_name = "PATH")]
    pub in_transform: Option<PathBuf>,

    /// Output module; `.wat` writes text, anything else binary
    #[arg(long, value_name = "PATH")]
    pub out_module: Option<PathBuf>,

    /// JavaScript glue output
    #[arg(long, value_name = "PATH")]
    pub out_js: Option<PathBuf>,

    /// Copy of the untouched input module
    #[arg(long, value_name = "PATH")]
    pub out_module_orig: Option<PathBuf>,

    /// Directory for relative input paths
    #[arg(long, value_name = "DIRECTORY")]
    pub dependencies_dir: Option<PathBuf>,

    /// Directory for relative output paths
    #[arg(long, value_name = "DIRECTORY")]
    pub data_dir: Option<PathBuf>,

    /// Write log messages to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Only run these advices
    #[arg(long, value_delimiter = ',', value_name = "ADVICE")]
    pub include: Vec<String>,

    /// Skip these advices
    #[arg(long, value_delimiter = ',', value_name = "ADVICE")]
    pub exclude: Vec<String>,

    /// Always write the JavaScript glue
    #[arg(long)]
    pub print_js: bool,

    /// Apply the global context even when no advice is left
    #[arg(long)]
    pub allow_empty: bool,

    /// Debug logging
    #[arg(long, short)]
    pub verbose: bool,

    /// Weave advices in document order
    #[arg(long)]
    pub ignore_order: bool,
}

// ══════════════════════════════════════════════════════════════════════════════
// Layers
// ══════════════════════════════════════════════════════════════════════════════

/// One configuration source. `None` means the source does not set the key.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub in_module: Option<PathBuf>,
    pub in_transform: Option<PathBuf>,
    pub out_module: Option<PathBuf>,
    pub out_js: Option<PathBuf>,
    pub out_module_orig: Option<PathBuf>,
    pub dependencies_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub print_js: Option<bool>,
    pub allow_empty: Option<bool>,
    pub verbose: Option<bool>,
    pub ignore_order: Option<bool>,
}

impl ConfigLayer {
    /// Keys set by `self` win over `lower`.
    pub fn over(self, lower: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            in_module: self.in_module.or(lower.in_module),
            in_transform: self.in_transform.or(lower.in_transform),
            out_module: self.out_module.or(lower.out_module),
            out_js: self.out_js.or(lower.out_js),
            out_module_orig: self.out_module_orig.or(lower.out_module_orig),
            dependencies_dir: self.dependencies_dir.or(lower.dependencies_dir),
            data_dir: self.data_dir.or(lower.data_dir),
            log_file: self.log_file.or(lower.log_file),
            include: self.include.or(lower.include),
            exclude: self.exclude.or(lower.exclude),
            print_js: self.print_js.or(lower.print_js),
            allow_empty: self.allow_empty.or(lower.allow_empty),
            verbose: self.verbose.or(lower.verbose),
            ignore_order: self.ignore_order.or(lower.ignore_order),
        }
    }

    /// Flags given on the command line. Absent switches leave the key unset.
    pub fn from_cli(cli: &Cli) -> ConfigLayer {
        let list = |v: &Vec<String>| (!v.is_empty()).then(|| v.clone());
        let switch = |b: bool| b.then_some(true);
        ConfigLayer {
            in_module: cli.in_module.clone(),
            in_transform: cli.in_transform.clone(),
            out_module: cli.out_module.clone(),
            out_js: cli.out_js.clone(),
            out_module_orig: cli.out_module_orig.clone(),
            dependencies_dir: cli.dependencies_dir.clone(),
            data_dir: cli.data_dir.clone(),
            log_file: cli.log_file.clone(),
            include: list(&cli.include),
            exclude: list(&cli.exclude),
            print_js: switch(cli.print_js),
            allow_empty: switch(cli.allow_empty),
            verbose: switch(cli.verbose),
            ignore_order: switch(cli.ignore_order),
        }
    }

    /// `WMR_<KEY>` variables. Lists are comma separated; empty values are
    /// ignored.
    pub fn from_env<I, K, V>(vars: I) -> Result<ConfigLayer>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut layer = ConfigLayer::default();
        for (key, value) in vars {
            let Some(key) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }
            let path = || Some(PathBuf::from(value));
            let name = format!("{ENV_PREFIX}{key}");
            match key.to_ascii_lowercase().as_str() {
                "in_module" => layer.in_module = path(),
                "in_transform" => layer.in_transform = path(),
                "out_module" => layer.out_module = path(),
                "out_js" => layer.out_js = path(),
                "out_module_orig" => layer.out_module_orig = path(),
                "dependencies_dir" => layer.dependencies_dir = path(),
                "data_dir" => layer.data_dir = path(),
                "log_file" => layer.log_file = path(),
                "include" => layer.include = Some(split_list(value)),
                "exclude" => layer.exclude = Some(split_list(value)),
                "print_js" => layer.print_js = Some(parse_bool(&name, value)?),
                "allow_empty" => layer.allow_empty = Some(parse_bool(&name, value)?),
                "verbose" => layer.verbose = Some(parse_bool(&name, value)?),
                "ignore_order" => layer.ignore_order = Some(parse_bool(&name, value)?),
                _ => {}
            }
        }
        Ok(layer)
    }

    /// A configuration file, TOML or JSON by extension.
    pub fn from_file(path: &Path) -> Result<ConfigLayer> {
        let text = fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
        match extension(path).as_deref() {
            Some("toml") => toml::from_str(&text).with_context(|| format!("parsing {}", path.display())),
            Some("json") => serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display())),
            _ => bail!("unsupported config file format: {}", path.display()),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{name}: expected a boolean, got '{value}'")),
    }
}

/// Lower-case extension of `path`, if any.
pub fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

// ══════════════════════════════════════════════════════════════════════════════
// ToolConfig
// ══════════════════════════════════════════════════════════════════════════════

/// The settled configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolConfig {
    pub in_module: PathBuf,
    pub in_transform: PathBuf,
    pub out_module: PathBuf,
    pub out_js: PathBuf,
    pub out_module_orig: Option<PathBuf>,
    pub dependencies_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub print_js: bool,
    pub allow_empty: bool,
    pub verbose: bool,
    pub ignore_order: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        ToolConfig::from(ConfigLayer::default())
    }
}

impl From<ConfigLayer> for ToolConfig {
    fn from(layer: ConfigLayer) -> Self {
        let out_module = layer.out_module.unwrap_or_else(|| PathBuf::from("output.wasm"));
        let out_js = layer.out_js.unwrap_or_else(|| out_module.with_extension("js"));
        ToolConfig {
            in_module: layer.in_module.unwrap_or_else(|| PathBuf::from("input.wat")),
            in_transform: layer.in_transform.unwrap_or_else(|| PathBuf::from("input.toml")),
            out_module,
            out_js,
            out_module_orig: layer.out_module_orig,
            dependencies_dir: layer.dependencies_dir,
            data_dir: layer.data_dir,
            log_file: layer.log_file,
            include: layer.include.unwrap_or_default(),
            exclude: layer.exclude.unwrap_or_default(),
            print_js: layer.print_js.unwrap_or(false),
            allow_empty: layer.allow_empty.unwrap_or(false),
            verbose: layer.verbose.unwrap_or(false),
            ignore_order: layer.ignore_order.unwrap_or(false),
        }
    }
}

impl ToolConfig {
    /// Layer flags over the process environment over the config file.
    pub fn load(cli: &Cli) -> Result<ToolConfig> {
        let env = ConfigLayer::from_env(std::env::vars())?;
        let file = match &cli.config {
            Some(path) => ConfigLayer::from_file(path)?,
            None => ConfigLayer::default(),
        };
        Ok(ConfigLayer::from_cli(cli).over(env).over(file).into())
    }

    pub fn weave_options(&self) -> WeaveOptions {
        WeaveOptions {
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            allow_empty: self.allow_empty,
            ignore_order: self.ignore_order,
            print_js: self.print_js,
        }
    }

    /// `path` under `dependencies_dir` when it is relative.
    pub fn input_path(&self, path: &Path) -> PathBuf {
        under(self.dependencies_dir.as_deref(), path)
    }

    /// `path` under `data_dir` when it is relative.
    pub fn output_path(&self, path: &Path) -> PathBuf {
        under(self.data_dir.as_deref(), path)
    }
}

fn under(dir: Option<&Path>, path: &Path) -> PathBuf {
    match dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}
