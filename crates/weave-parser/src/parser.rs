//! Core parser infrastructure: token cursor, error helpers.

use weave_lexer::token::{Token, TokenKind};
use weave_types::{ErrorCode, Span, WeaveError};

/// The pointcut parser.
///
/// Consumes a token stream produced by the lexer and builds an AST.
/// Parsing stops at the first error; grammar errors are fatal to the
/// advice that owns the pointcut.
pub struct Parser {
    tokens: Vec<Token>,
    /// Current index into `tokens`.
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    // ── Token Cursor ──────────────────────────────────────────────────────────

    /// Returns the current token without advancing.
    pub(crate) fn peek(&self) -> &TokenKind {
        self.look_ahead(0)
    }

    /// Look ahead by `n` tokens from current position.
    pub(crate) fn look_ahead(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    /// Advance the cursor by one and return the consumed token.
    pub(crate) fn advance(&mut self) -> Token {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .unwrap_or_else(|| Token::new(TokenKind::Eof, self.current_span()));
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Returns the span of the current token.
    pub(crate) fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.span)
            .unwrap_or_else(|| Span::point(1, 1))
    }

    /// Returns the previously consumed token's span.
    pub(crate) fn previous_span(&self) -> Span {
        match self.pos {
            0 => Span::point(1, 1),
            n => self.tokens[n - 1].span,
        }
    }

    pub(crate) fn at_end(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    /// If the current token matches, advance and return `true`.
    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    // ── Expect Helpers ────────────────────────────────────────────────────────

    pub(crate) fn expect(&mut self, expected: &TokenKind) -> Result<Token, WeaveError> {
        if self.check(expected) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("'{expected}'")))
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> Result<String, WeaveError> {
        match self.peek().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    pub(crate) fn expect_eof(&mut self) -> Result<(), WeaveError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.unexpected("end of pointcut"))
        }
    }

    // ── Error Reporting ───────────────────────────────────────────────────────

    /// Error for the current token, naming what was expected instead.
    pub(crate) fn unexpected(&self, expected: &str) -> WeaveError {
        WeaveError::new(
            ErrorCode::UNEXPECTED_TOKEN,
            format!("expected {expected}, got '{}'", self.peek()),
        )
        .at(self.current_span())
    }
}
