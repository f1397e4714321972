//! Keyword layer for the WASM weaver.
//!
//! Advice code refers to context through `%keyword%` tokens: `%this%` for
//! the join-point code, pointcut parameters, context variables, bindings
//! captured by filters and template placeholders. This crate holds the
//! keyword values, the stack that resolves names against several maps in
//! order, and the lexer that rewrites advice text. Keywords are small
//! expressions: accessors, methods with lambdas, operators and quoted
//! text.

mod eval;
mod expr;
mod map;
mod substitute;
mod templates;
mod value;

pub use map::{FunctionOrders, KeywordMap, KeywordSource, KeywordStack};
pub use substitute::substitute;
pub use templates::template_keywords;
pub use value::KeywordValue;
