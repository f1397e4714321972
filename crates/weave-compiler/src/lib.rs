//! WASM weaver driver: applies a transformation description to a module.
//!
//! ```text
//! Module text ─┐
//!              ├→ advices → global context → join points → advice code → woven module
//! Description ─┘
//! ```
//!
//! [`weave`] runs the whole pipeline and returns a [`TransformationResult`].
//! Context names resolve through [`zone`]s; advice pointcut parameters
//! through [`PointcutParameters`].

mod advice;
mod driver;
mod options;
mod parallel;
mod params;
mod result;
pub mod zone;

pub use advice::{compile_advices, sort_advices, Advice};
pub use driver::{weave, weave_module};
pub use options::WeaveOptions;
pub use params::PointcutParameters;
pub use result::{sha256_hex, AdviceReport, TransformationResult, WeaveSummary};
