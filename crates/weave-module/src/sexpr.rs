//! Owned S-expressions and the WebAssembly text reader.
//!
//! The reader understands lists, atoms, quoted strings and keyword atoms
//! (`%this%`, `%args[0].index%`). Line comments (`;;`) and nested block
//! comments (`(; ;)`) are dropped.

use std::fmt;

use crate::error::{ModuleError, ModuleResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SExpr {
    List(Vec<SExpr>),
    Atom(String),
    /// A quoted string, stored with its quotes.
    Str(String),
    /// An unresolved `%…%` keyword, stored with its percent signs.
    Keyword(String),
}

impl SExpr {
    pub fn atom(s: impl Into<String>) -> Self {
        Self::Atom(s.into())
    }

    pub fn list(items: impl IntoIterator<Item = SExpr>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// The leading atom of a list.
    pub fn head(&self) -> Option<&str> {
        match self {
            Self::List(items) => match items.first() {
                Some(Self::Atom(a)) => Some(a),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn items(&self) -> &[SExpr] {
        match self {
            Self::List(items) => items,
            _ => &[],
        }
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Self::Atom(a) => Some(a),
            _ => None,
        }
    }

    /// Contents of a quoted string without its quotes.
    pub fn as_str_literal(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(weave_types::text::unquote(s)),
            _ => None,
        }
    }
}

impl fmt::Display for SExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(s) | Self::Str(s) | Self::Keyword(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Read every top-level expression of `text`.
pub fn parse(text: &str) -> ModuleResult<Vec<SExpr>> {
    Reader::new(text).read_all()
}

struct Reader<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).map(|(_, c)| *c)
    }

    fn offset(&self, pos: usize) -> usize {
        self.chars.get(pos).map_or(self.src.len(), |(i, _)| *i)
    }

    fn slice(&self, from: usize, to: usize) -> &'a str {
        &self.src[self.offset(from)..self.offset(to)]
    }

    fn read_all(mut self) -> ModuleResult<Vec<SExpr>> {
        let mut out = Vec::new();
        loop {
            self.skip_trivia()?;
            match self.peek() {
                None => return Ok(out),
                Some(')') => {
                    return Err(ModuleError::Malformed(format!(
                        "unexpected ')' at offset {}",
                        self.offset(self.pos)
                    )))
                }
                Some(_) => out.push(self.read_expr()?),
            }
        }
    }

    fn skip_trivia(&mut self) -> ModuleResult<()> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => self.pos += 1,
                (Some(';'), Some(';')) => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                }
                (Some('('), Some(';')) => self.skip_block_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn skip_block_comment(&mut self) -> ModuleResult<()> {
        let start = self.offset(self.pos);
        let mut depth = 0usize;
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some('('), Some(';')) => {
                    depth += 1;
                    self.pos += 2;
                }
                (Some(';'), Some(')')) => {
                    depth -= 1;
                    self.pos += 2;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                (Some(_), _) => self.pos += 1,
                (None, _) => {
                    return Err(ModuleError::Malformed(format!(
                        "unterminated block comment at offset {start}"
                    )))
                }
            }
        }
    }

    fn read_expr(&mut self) -> ModuleResult<SExpr> {
        match self.peek() {
            Some('(') => self.read_list(),
            Some('"') => self.read_string(),
            Some('%') => match self.keyword_end() {
                Some(end) => {
                    let text = self.slice(self.pos, end).to_string();
                    self.pos = end;
                    Ok(SExpr::Keyword(text))
                }
                None => Ok(self.read_atom()),
            },
            _ => Ok(self.read_atom()),
        }
    }

    fn read_list(&mut self) -> ModuleResult<SExpr> {
        let start = self.offset(self.pos);
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_trivia()?;
            match self.peek() {
                Some(')') => {
                    self.pos += 1;
                    return Ok(SExpr::List(items));
                }
                Some(_) => items.push(self.read_expr()?),
                None => {
                    return Err(ModuleError::Malformed(format!(
                        "unclosed '(' at offset {start}"
                    )))
                }
            }
        }
    }

    fn read_string(&mut self) -> ModuleResult<SExpr> {
        let start = self.pos;
        self.pos += 1;
        loop {
            match self.peek() {
                Some('\\') => self.pos += 2,
                Some('"') => {
                    self.pos += 1;
                    return Ok(SExpr::Str(self.slice(start, self.pos).to_string()));
                }
                Some(_) => self.pos += 1,
                None => {
                    return Err(ModuleError::Malformed(format!(
                        "unterminated string at offset {}",
                        self.offset(start)
                    )))
                }
            }
        }
    }

    fn read_atom(&mut self) -> SExpr {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
                break;
            }
            if c == ';' && self.peek_at(1) == Some(';') {
                break;
            }
            self.pos += 1;
        }
        SExpr::Atom(self.slice(start, self.pos).to_string())
    }

    /// End of a keyword starting at the current `%`. Quoted text is
    /// skipped; whitespace outside quotes and parentheses ends the scan.
    fn keyword_end(&self) -> Option<usize> {
        let first = self.peek_at(1)?;
        if !(first.is_ascii_alphanumeric() || "_'\"`!(-".contains(first)) {
            return None;
        }
        let mut i = self.pos + 1;
        let mut depth = 0usize;
        loop {
            let c = self.chars.get(i).map(|(_, c)| *c)?;
            match c {
                '%' if depth == 0 => return Some(i + 1),
                '"' | '\'' | '`' => {
                    i += 1;
                    loop {
                        match self.chars.get(i).map(|(_, c)| *c)? {
                            '\\' => i += 2,
                            q if q == c => break,
                            _ => i += 1,
                        }
                    }
                }
                '(' => depth += 1,
                ')' => depth = depth.checked_sub(1)?,
                c if c.is_whitespace() && depth == 0 => return None,
                _ => {}
            }
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(text: &str) -> SExpr {
        let mut all = parse(text).unwrap();
        assert_eq!(all.len(), 1);
        all.remove(0)
    }

    #[test]
    fn test_read_nested_lists() {
        let e = one("(func $f (param i32) (local.get 0))");
        assert_eq!(e.head(), Some("func"));
        assert_eq!(e.items().len(), 4);
        assert_eq!(e.to_string(), "(func $f (param i32) (local.get 0))");
    }

    #[test]
    fn test_comments_are_dropped() {
        let e = one("(module ;; line\n (; block (; nested ;) ;) (func))");
        assert_eq!(e.to_string(), "(module (func))");
    }

    #[test]
    fn test_strings_keep_quotes_and_escapes() {
        let e = one(r#"(import "env" "a\"b" (func))"#);
        assert_eq!(e.items()[1], SExpr::Str("\"env\"".into()));
        assert_eq!(e.items()[2].as_str_literal(), Some("a\\\"b"));
    }

    #[test]
    fn test_keyword_atoms() {
        let e = one(r#"(call %log% %args:join(", ")%)"#);
        assert_eq!(e.items()[1], SExpr::Keyword("%log%".into()));
        assert_eq!(e.items()[2], SExpr::Keyword(r#"%args:join(", ")%"#.into()));
    }

    #[test]
    fn test_keyword_with_lambda_and_quotes() {
        let all = parse("(i32.const %'':map((_) => 2 << 2)%) (drop %x;' %y%'%)").unwrap();
        assert_eq!(all[0].items()[1], SExpr::Keyword("%'':map((_) => 2 << 2)%".into()));
        assert_eq!(all[1].items()[1], SExpr::Keyword("%x;' %y%'%".into()));
    }

    #[test]
    fn test_percent_without_keyword_is_atom() {
        let e = one("(x %)");
        assert_eq!(e.items()[1], SExpr::Atom("%".into()));
    }

    #[test]
    fn test_flat_sequence() {
        let all = parse("local.get 0 local.get 1 i32.add").unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[3], SExpr::Atom("1".into()));
    }

    #[test]
    fn test_unbalanced_is_malformed() {
        assert!(matches!(parse("(func"), Err(ModuleError::Malformed(_))));
        assert!(matches!(parse("(func))"), Err(ModuleError::Malformed(_))));
        assert!(matches!(parse("\"abc"), Err(ModuleError::Malformed(_))));
    }
}
