//! Template engine for the WASM weaver.
//!
//! A template is WebAssembly text with `%name%` placeholders. It compiles
//! to a structural pattern with holes, which is searched against the text
//! of a join-point block. Placeholders may carry inbound operations that
//! require (or forbid) a nested template match inside the captured text.
//!
//! The entry point is [`TemplateSet`]: it owns the parsed templates and
//! memoizes a [`TemplateContext`] per template on first use.

pub mod code;
mod context;
pub mod matcher;
mod operations;
mod search;
mod template;

pub use code::{clear_code, count_instructions};
pub use context::{TemplateContext, TemplateSet};
pub use operations::{IncludeMode, InboundOperation};
pub use search::{SearchIteration, SearchValue};
pub use template::{Template, TemplateVariable, VariableOperation};
