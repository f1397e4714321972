//! Pointcut parser: converts pointcut source into an AST.
//!
//! ```text
//! Pointcut source → Lexer → Parser → Pointcut<ContextArg | PlainArg>
//! ```

mod parse_method;
mod parse_pointcut;
mod parse_variable;
mod parser;

pub use parse_variable::parse_variable;
pub use parser::Parser;

use weave_lexer::Lexer;
use weave_types::ast::{ContextPointcut, PlainPointcut};
use weave_types::Result;

/// Parse a pointcut written inside an advice (`(i32.param[$x] p) => ...`).
pub fn parse_context_pointcut(source: &str) -> Result<ContextPointcut> {
    let tokens = Lexer::new(source).lex()?;
    Parser::new(tokens).parse_context_pointcut()
}

/// Parse a named pointcut from the `pointcuts` section (`(i32 v) => ...`).
pub fn parse_plain_pointcut(source: &str) -> Result<PlainPointcut> {
    let tokens = Lexer::new(source).lex()?;
    Parser::new(tokens).parse_plain_pointcut()
}
