//! Module and description files.
//!
//! Modules are read as text (`.wat`) or binary (`.wasm`, printed to text
//! with `wasmprinter`). Output goes to text for `.wat` and to validated
//! binary otherwise.

use std::fs;
use std::path::Path;

use weave_types::description::{DescriptionFormat, TransformDescription};
use weave_types::{ErrorCode, Result, WeaveError};

use crate::config::extension;

/// How a module file is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleFormat {
    Text,
    Binary,
}

impl ModuleFormat {
    /// Input format from the file extension.
    pub fn of_input(path: &Path) -> Result<Self> {
        match extension(path).as_deref() {
            Some("wat") => Ok(Self::Text),
            Some("wasm") => Ok(Self::Binary),
            _ => Err(WeaveError::new(
                ErrorCode::UNSUPPORTED_FORMAT,
                format!("unknown input file extension: {}", path.display()),
            )),
        }
    }

    /// Output format; anything but `.wat` is binary.
    pub fn of_output(path: &Path) -> Self {
        match extension(path).as_deref() {
            Some("wat") => Self::Text,
            _ => Self::Binary,
        }
    }
}

fn read_failed(path: &Path, err: impl std::fmt::Display) -> WeaveError {
    WeaveError::new(ErrorCode::READ_FAILED, format!("{}: {err}", path.display()))
}

fn write_failed(path: &Path, err: impl std::fmt::Display) -> WeaveError {
    WeaveError::new(ErrorCode::WRITE_FAILED, format!("{}: {err}", path.display()))
}

/// Read a module as text.
pub fn read_module(path: &Path) -> Result<String> {
    match ModuleFormat::of_input(path)? {
        ModuleFormat::Text => fs::read_to_string(path).map_err(|e| read_failed(path, e)),
        ModuleFormat::Binary => {
            let bytes = fs::read(path).map_err(|e| read_failed(path, e))?;
            wasmprinter::print_bytes(&bytes).map_err(|e| read_failed(path, e))
        }
    }
}

/// Assemble module text and check it with the validator.
pub fn encode_module(text: &str) -> Result<Vec<u8>> {
    let bytes = wat::parse_str(text)
        .map_err(|e| WeaveError::new(ErrorCode::ENCODE_FAILED, format!("assembling module: {e}")))?;
    wasmparser::validate(&bytes)
        .map_err(|e| WeaveError::new(ErrorCode::ENCODE_FAILED, format!("invalid module: {e}")))?;
    Ok(bytes)
}

/// Write module text to `path`, as text or binary by extension. Both
/// forms are validated first.
pub fn write_module(path: &Path, text: &str) -> Result<()> {
    let bytes = encode_module(text)?;
    create_parent(path)?;
    match ModuleFormat::of_output(path) {
        ModuleFormat::Text => fs::write(path, text),
        ModuleFormat::Binary => fs::write(path, bytes),
    }
    .map_err(|e| write_failed(path, e))
}

pub fn write_text(path: &Path, text: &str) -> Result<()> {
    create_parent(path)?;
    fs::write(path, text).map_err(|e| write_failed(path, e))
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir).map_err(|e| write_failed(dir, e)),
        _ => Ok(()),
    }
}

/// Read a transformation description, TOML or JSON by extension.
pub fn read_description(path: &Path) -> Result<TransformDescription> {
    let format = extension(path)
        .as_deref()
        .and_then(DescriptionFormat::from_extension)
        .ok_or_else(|| {
            WeaveError::new(
                ErrorCode::UNSUPPORTED_FORMAT,
                format!("unknown description file extension: {}", path.display()),
            )
        })?;
    let text = fs::read_to_string(path).map_err(|e| read_failed(path, e))?;
    TransformDescription::parse(&text, format).map_err(|e| e.within(path.display().to_string()))
}
