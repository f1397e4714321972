//! Pointcut lexer: converts pointcut source text to a token stream.
//!
//! Features:
//! - Words are classified as WebAssembly types, localities or identifiers
//! - `$name` indices, `/regex/` literals with `\/` escapes, quoted strings
//! - Two-character operators `=>`, `&&`, `||`, `..`
//! - Whitespace (including newlines) is insignificant
//! - Fails on the first unknown character or unterminated literal

use weave_types::{ErrorCode, Result, Span, WeaveError};

use crate::token::{Token, TokenKind};

/// The pointcut lexer.
pub struct Lexer<'src> {
    source: &'src [u8],
    /// Current byte offset into `source`.
    pos: usize,
    /// Current line number (1-based).
    line: u32,
    /// Current column number (1-based).
    col: u32,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Lex the whole input. The returned stream always ends with
    /// [`TokenKind::Eof`].
    pub fn lex(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.scan()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                return Ok(tokens);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Character-level helpers
    // ─────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn span_from(&self, start_line: u32, start_col: u32) -> Span {
        Span::new(
            start_line,
            start_col,
            self.line,
            self.col.saturating_sub(1).max(1),
        )
    }

    fn text(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.source[start..self.pos]).into_owned()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.advance();
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Scanning
    // ─────────────────────────────────────────────────────────────

    fn scan(&mut self) -> Result<Token> {
        self.skip_whitespace();

        let start_line = self.line;
        let start_col = self.col;
        let start = self.pos;

        let Some(ch) = self.advance() else {
            return Ok(Token::new(TokenKind::Eof, Span::point(self.line, self.col)));
        };

        let kind = match ch {
            b'"' => self.scan_string(start_line, start_col)?,
            b'/' => self.scan_regex(start_line, start_col)?,
            b'0'..=b'9' => self.scan_number(start),
            b'$' => {
                if !matches!(self.peek(), Some(b'a'..=b'z' | b'A'..=b'Z')) {
                    return Err(WeaveError::new(
                        ErrorCode::UNEXPECTED_CHARACTER,
                        "expected a name after '$'",
                    )
                    .at(self.span_from(start_line, start_col)));
                }
                self.scan_word();
                TokenKind::Index(self.text(start))
            }
            b'a'..=b'z' | b'A'..=b'Z' => {
                self.scan_word();
                TokenKind::word(&self.text(start))
            }
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b',' => TokenKind::Comma,
            b'*' => TokenKind::Star,
            b'%' => TokenKind::Percent,
            b':' => TokenKind::Colon,
            b'?' => TokenKind::Question,
            b'.' => {
                if self.peek() == Some(b'.') {
                    self.advance();
                    TokenKind::DotDot
                } else if matches!(self.peek(), Some(b'0'..=b'9')) {
                    self.scan_number(start)
                } else {
                    TokenKind::Dot
                }
            }
            b'=' if self.peek() == Some(b'>') => {
                self.advance();
                TokenKind::FatArrow
            }
            b'&' if self.peek() == Some(b'&') => {
                self.advance();
                TokenKind::AndAnd
            }
            b'|' if self.peek() == Some(b'|') => {
                self.advance();
                TokenKind::OrOr
            }
            other => {
                return Err(WeaveError::new(
                    ErrorCode::UNEXPECTED_CHARACTER,
                    format!("unexpected character '{}'", other as char),
                )
                .at(self.span_from(start_line, start_col)));
            }
        };

        Ok(Token::new(kind, self.span_from(start_line, start_col)))
    }

    /// `[\w\d_]*` after the first letter.
    fn scan_word(&mut self) {
        while matches!(
            self.peek(),
            Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')
        ) {
            self.advance();
        }
    }

    /// `(?:\d*\.)?\d+`; the first character has already been consumed.
    fn scan_number(&mut self, start: usize) -> TokenKind {
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.advance();
        }
        let seen_dot = self.source[start..self.pos].contains(&b'.');
        if !seen_dot && self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            self.advance();
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.advance();
            }
        }
        TokenKind::Number(self.text(start))
    }

    fn scan_string(&mut self, start_line: u32, start_col: u32) -> Result<TokenKind> {
        let mut bytes = Vec::new();
        loop {
            match self.advance() {
                None => {
                    return Err(WeaveError::new(
                        ErrorCode::UNTERMINATED_LITERAL,
                        "unterminated string literal",
                    )
                    .at(self.span_from(start_line, start_col)))
                }
                Some(b'"') => {
                    return Ok(TokenKind::StringLit(
                        String::from_utf8_lossy(&bytes).into_owned(),
                    ))
                }
                Some(b'\\') if self.peek() == Some(b'"') => {
                    self.advance();
                    bytes.push(b'"');
                }
                Some(b) => bytes.push(b),
            }
        }
    }

    fn scan_regex(&mut self, start_line: u32, start_col: u32) -> Result<TokenKind> {
        let body_start = self.pos;
        loop {
            match self.peek() {
                None => {
                    return Err(WeaveError::new(
                        ErrorCode::UNTERMINATED_LITERAL,
                        "unterminated regular expression",
                    )
                    .at(self.span_from(start_line, start_col)))
                }
                Some(b'\\') if self.peek_at(1) == Some(b'/') => {
                    self.advance();
                    self.advance();
                }
                Some(b'/') => {
                    let body = self.text(body_start).replace("\\/", "/");
                    self.advance();
                    return Ok(TokenKind::Regex(body));
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_of_arrow() {
        let tokens = Lexer::new("() => f").lex().unwrap();
        assert_eq!(tokens[2].kind, TokenKind::FatArrow);
        assert_eq!(tokens[2].span, Span::new(1, 4, 1, 5));
    }

    #[test]
    fn test_multiline_spans() {
        let tokens = Lexer::new("()\n  =>").lex().unwrap();
        assert_eq!(tokens[2].span.start_line, 2);
        assert_eq!(tokens[2].span.start_col, 3);
    }
}
