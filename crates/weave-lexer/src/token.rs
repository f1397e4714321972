//! Token types for the pointcut lexer.

use std::fmt;
use weave_types::ast::Locality;
use weave_types::{Span, WasmType};

// ─────────────────────────────────────────────────────────────────────
// Token
// ─────────────────────────────────────────────────────────────────────

/// A single token produced by the pointcut lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

// ─────────────────────────────────────────────────────────────────────
// TokenKind
// ─────────────────────────────────────────────────────────────────────

/// Every token kind of the pointcut language.
///
/// Words such as `func`, `void` or `exported` are plain identifiers; the
/// parser gives them meaning by position.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ── Literals ──────────────────────────────────────────────

    /// `"text"`, stored without quotes.
    StringLit(String),
    /// `42`, `3.5`, kept as written.
    Number(String),
    /// `$name`, stored with the leading `$`.
    Index(String),
    /// `/pattern/`, stored without the slashes.
    Regex(String),

    // ── Words ─────────────────────────────────────────────────

    /// `i32`, `i64`, `f32`, `f64`
    WasmType(WasmType),
    /// `param`, `local`
    Locality(Locality),
    Identifier(String),

    // ── Punctuation ───────────────────────────────────────────

    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    /// `..`
    DotDot,
    /// `=>`
    FatArrow,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
    Star,
    Percent,
    Colon,
    Question,

    Eof,
}

impl TokenKind {
    /// Classify a scanned word.
    pub fn word(text: &str) -> TokenKind {
        if let Ok(ty) = text.parse::<WasmType>() {
            return TokenKind::WasmType(ty);
        }
        match text {
            "param" => TokenKind::Locality(Locality::Param),
            "local" => TokenKind::Locality(Locality::Local),
            _ => TokenKind::Identifier(text.to_string()),
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::StringLit(s) => write!(f, "\"{s}\""),
            TokenKind::Number(n) => write!(f, "{n}"),
            TokenKind::Index(s) => write!(f, "{s}"),
            TokenKind::Regex(r) => write!(f, "/{r}/"),
            TokenKind::WasmType(t) => write!(f, "{t}"),
            TokenKind::Locality(l) => write!(f, "{}", l.as_str()),
            TokenKind::Identifier(s) => write!(f, "{s}"),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Dot => write!(f, "."),
            TokenKind::DotDot => write!(f, ".."),
            TokenKind::FatArrow => write!(f, "=>"),
            TokenKind::AndAnd => write!(f, "&&"),
            TokenKind::OrOr => write!(f, "||"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Question => write!(f, "?"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}
