//! Shared types for the WASM weaver.
//!
//! This crate defines the pointcut AST, source spans, the workspace error
//! type, WebAssembly value and variable types and the serde model of a transformation
//! description. Every other crate in the workspace depends on it.

mod error;
mod span;
mod var_type;
mod wasm_type;
pub mod ast;
pub mod description;
pub mod text;

pub use error::{ErrorCategory, ErrorCode, WeaveError};
pub use span::Span;
pub use var_type::VarType;
pub use wasm_type::WasmType;

/// Result type used throughout the weaver.
pub type Result<T> = std::result::Result<T, WeaveError>;
