//! Pointcut evaluation for the WASM weaver.
//!
//! A pointcut compiles to a tree of filter nodes. Each node takes a
//! [`PointcutContext`] (the module, the current join points and the
//! template results so far) and returns a narrowed one:
//!
//! ```text
//! init_search → func / call / args / returns / template / named pointcut
//!             → AND (refine left, then right) / OR (union by function)
//! ```
//!
//! Template matches are kept in a [`TemplateManager`] so that advice
//! weaving can later restrict them to the values bound at each site.

mod context;
mod node;
mod param;
mod pointcut;
mod predicate;
mod templates;

pub use context::{JoinPoint, PointcutContext};
pub use param::PointcutParam;
pub use pointcut::ParsedPointcut;
pub use templates::{TemplateKeywords, TemplateManager};
