//! Module context for the WASM weaver.
//!
//! A [`ModuleContext`] holds a WebAssembly text module as S-expression
//! trees, one per field. Functions keep their instruction tree behind
//! their own lock: searches and advice application on different functions
//! can run in parallel, while adding types, globals, functions and exports
//! needs exclusive access to the context.
//!
//! Join points are [`JoinPointBlock`]s. The `find_*` searches narrow a
//! block down to the functions, call sites, argument lists, return sites
//! or instruction runs inside it, and [`ModuleContext::apply`] replaces a
//! block with advice code.
//!
//! Composite variables (strings, maps, arrays) live in a host runtime that
//! the module reaches through generated imports; see [`RuntimeImport`].

mod apply;
mod error;
mod function;
mod info;
mod instr;
mod module;
mod mutate;
mod runtime;
mod search;
mod sexpr;
mod transform;
mod tree;

pub use error::{ModuleError, ModuleResult};
pub use function::{Function, ImportName, Variable};
pub use info::{ArgInfo, CallInfo, FunctionInfo, ReturnInfo};
pub use module::{GlobalDef, ModuleContext, TypeDef};
pub use runtime::{pack_words, RuntimeFunction, RuntimeImport};
pub use search::{remove_duplicates, JoinPointBlock};
pub use sexpr::SExpr;
pub use transform::RuntimeTransform;
pub use tree::NodeId;
