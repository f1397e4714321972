//! AST for pointcut expressions and variable declarations.
//!
//! Two pointcut forms exist. Advices use the *with context* form, whose
//! arguments bind a parameter or local of the advised function. Named,
//! reusable pointcuts use the *without context* form, whose arguments are
//! plain typed names filled positionally by the caller.

use crate::{Span, VarType, WasmType};

// ══════════════════════════════════════════════════════════════════════════════
// Pointcuts
// ══════════════════════════════════════════════════════════════════════════════

/// A parsed pointcut: `( args ) => expr`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pointcut<A> {
    pub args: Vec<A>,
    pub body: Expr,
    pub span: Span,
}

/// Pointcut written inside an advice.
pub type ContextPointcut = Pointcut<ContextArg>;

/// Pointcut declared in the `pointcuts` section.
pub type PlainPointcut = Pointcut<PlainArg>;

/// Whether a pointcut argument targets a parameter or a local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locality {
    Param,
    Local,
}

impl Locality {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Param => "param",
            Self::Local => "local",
        }
    }
}

/// The bracketed index of a context argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArgIndex {
    /// `[3]`
    Ordinal(u32),
    /// `[$x]`
    Symbol(String),
    /// `[name]`, resolved through the function's alias map.
    Alias(String),
    /// `[?]`, bound to whatever the predicate finds.
    Unbound,
}

/// `[type "."] locality "[" index "]" name`
#[derive(Debug, Clone, PartialEq)]
pub struct ContextArg {
    pub ty: Option<WasmType>,
    pub locality: Locality,
    pub index: ArgIndex,
    pub name: String,
    pub span: Span,
}

/// `[type] name`
#[derive(Debug, Clone, PartialEq)]
pub struct PlainArg {
    pub ty: Option<WasmType>,
    pub name: String,
    pub span: Span,
}

/// Boolean combination of pointcut methods. `&&` binds tighter than `||`
/// and both are left-associative.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Method(Method),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// A pointcut leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub kind: MethodKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MethodKind {
    /// `func(fdef)`
    Func(FuncDef),
    /// `call(fdef)`
    Call(FuncDef),
    /// `args(a, b, ...)`
    Args(Vec<String>),
    /// `returns(τ | * | void)`
    Returns(ReturnsFilter),
    /// `template(name [, true|false])`
    Template { name: String, just_check: bool },
    /// Any other identifier, resolved against the named pointcuts.
    User { name: String, args: Vec<String> },
}

impl MethodKind {
    pub fn name(&self) -> &str {
        match self {
            Self::Func(_) => "func",
            Self::Call(_) => "call",
            Self::Args(_) => "args",
            Self::Returns(_) => "returns",
            Self::Template { .. } => "template",
            Self::User { name, .. } => name,
        }
    }
}

/// `retType name ( params ) [, scope]`
#[derive(Debug, Clone, PartialEq)]
pub struct FuncDef {
    pub ret: ReturnPattern,
    pub name: NamePattern,
    pub params: ParamsPattern,
    pub scope: FunctionScope,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReturnPattern {
    /// `*`
    Any,
    /// `void`
    Void,
    Type(WasmType),
    /// `%var%` binds the result type, whatever it is.
    Var(String),
    /// `%var:i32%` binds the result type and requires it.
    VarType(String, WasmType),
}

/// A function-name pattern with an optional `%var%` binding.
#[derive(Debug, Clone, PartialEq)]
pub struct NamePattern {
    pub var: Option<String>,
    pub matcher: NameMatcher,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NameMatcher {
    Any,
    /// Visible name: export name, `module.field` of an import, or the symbol without `$`.
    Literal(String),
    /// `$symbol`
    Symbol(String),
    /// `[N]`, the function index.
    Ordinal(u32),
    /// `/regex/`, stored without slashes.
    Regex(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamsPattern {
    /// `..`
    Any,
    /// A fixed list; an empty list only matches functions without params.
    List(Vec<ParamPattern>),
}

/// `{type | *} [%var%]`
#[derive(Debug, Clone, PartialEq)]
pub struct ParamPattern {
    /// `None` for `*`.
    pub ty: Option<WasmType>,
    pub var: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FunctionScope {
    #[default]
    Any,
    Internal,
    Imported,
    Exported,
    Start,
}

impl FunctionScope {
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "internal" => Some(Self::Internal),
            "imported" => Some(Self::Imported),
            "exported" => Some(Self::Exported),
            "start" => Some(Self::Start),
            _ => None,
        }
    }
}

/// Input of `returns(...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnsFilter {
    Any,
    Void,
    Type(WasmType),
}

// ══════════════════════════════════════════════════════════════════════════════
// Variable declarations
// ══════════════════════════════════════════════════════════════════════════════

/// `type [= value]`, used for context globals and advice/function locals.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub ty: VarType,
    /// `None` when no initializer was given or the initializer is zero.
    /// Composite initializers are JSON text.
    pub value: Option<String>,
}

impl VariableDecl {
    /// The initializer, or `0` when none was given.
    pub fn init_or_zero(&self) -> &str {
        self.value.as_deref().unwrap_or("0")
    }
}
