//! Structural matcher over WebAssembly text.
//!
//! Patterns use `:[name]` holes (and `:[_]` for anonymous ones). A hole
//! captures balanced text: parentheses and string literals are never split.
//! Holes are lazy, except a hole at the very end of the pattern, which runs
//! to the end of the enclosing parenthesized region.

use crate::code::{clear_code, string_end};

/// Name of an anonymous hole.
pub const ANONYMOUS: &str = "_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternItem {
    Char(char),
    /// One or more whitespace characters, or none next to a parenthesis.
    Space,
    Hole(String),
}

/// A compiled match pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    items: Vec<PatternItem>,
    /// Purely numeric patterns only match an identical input.
    numeric: bool,
}

/// One match of a pattern inside a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Start, in characters.
    pub start: usize,
    /// End (exclusive), in characters.
    pub end: usize,
    pub matched: String,
    /// Hole captures in pattern order, anonymous holes included.
    pub captures: Vec<(String, String)>,
}

impl Match {
    /// Captures of named holes, in pattern order.
    pub fn named_captures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.captures
            .iter()
            .filter(|(name, _)| name != ANONYMOUS)
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl Pattern {
    /// Compile a pattern written with `:[name]` holes.
    pub fn compile(source: &str) -> Self {
        let source = clear_code(source);
        let numeric = source.parse::<i64>().is_ok();
        let chars: Vec<char> = source.chars().collect();
        let mut items = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if c == ':' && chars.get(i + 1) == Some(&'[') {
                if let Some((name, next)) = hole_at(&chars, i) {
                    items.push(PatternItem::Hole(name));
                    i = next;
                    continue;
                }
            }
            if c.is_whitespace() {
                items.push(PatternItem::Space);
                i += 1;
                continue;
            }
            if c == '"' {
                let end = string_end(&chars, i);
                items.extend(chars[i..end].iter().map(|&c| PatternItem::Char(c)));
                i = end;
                continue;
            }
            items.push(PatternItem::Char(c));
            // `)(` in the pattern also matches `) (` in the text.
            if c == ')' && chars.get(i + 1) == Some(&'(') {
                items.push(PatternItem::Space);
            }
            i += 1;
        }

        Self {
            source,
            items,
            numeric,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn items(&self) -> &[PatternItem] {
        &self.items
    }

    /// Every non-overlapping match in `text`, left to right.
    ///
    /// `accept` sees each candidate. A rejected candidate does not consume
    /// text: scanning resumes one character after its start, so matches
    /// nested inside it can still be found.
    pub fn find(&self, text: &str, mut accept: impl FnMut(&Match) -> bool) -> Vec<Match> {
        let chars: Vec<char> = text.chars().collect();
        if self.numeric {
            let cleared = clear_code(text);
            if cleared != self.source {
                return Vec::new();
            }
            let m = Match {
                start: 0,
                end: chars.len(),
                matched: cleared,
                captures: Vec::new(),
            };
            return if accept(&m) { vec![m] } else { Vec::new() };
        }
        if self.items.is_empty() {
            return Vec::new();
        }

        let inside_string = string_mask(&chars);
        let mut found = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            if inside_string[i] || !token_start(&chars, i) {
                i += 1;
                continue;
            }
            let mut captures = Vec::new();
            if let Some(end) = self.match_from(&chars, 0, i, &mut captures) {
                if end > i && token_end(&chars, end) {
                    let m = Match {
                        start: i,
                        end,
                        matched: chars[i..end].iter().collect(),
                        captures,
                    };
                    if accept(&m) {
                        found.push(m);
                        i = end;
                        continue;
                    }
                }
            }
            i += 1;
        }
        found
    }

    /// `true` when the whole of `text` is one match.
    pub fn matches_exactly(&self, text: &str) -> bool {
        let cleared = clear_code(text);
        let len = cleared.chars().count();
        self.find(&cleared, |m| m.start == 0 && m.end == len)
            .first()
            .is_some()
    }

    fn match_from(
        &self,
        text: &[char],
        pi: usize,
        ti: usize,
        captures: &mut Vec<(String, String)>,
    ) -> Option<usize> {
        let Some(item) = self.items.get(pi) else {
            return Some(ti);
        };
        match item {
            PatternItem::Char(c) => {
                if text.get(ti) != Some(c) {
                    return None;
                }
                self.match_from(text, pi + 1, ti + 1, captures)
            }
            PatternItem::Space => {
                let mut end = ti;
                while end < text.len() && text[end].is_whitespace() {
                    end += 1;
                }
                if end == ti && !paren_boundary(text, ti) {
                    return None;
                }
                self.match_from(text, pi + 1, end, captures)
            }
            PatternItem::Hole(name) => {
                if text.get(ti).map_or(true, |c| c.is_whitespace()) {
                    return None;
                }
                if pi + 1 == self.items.len() {
                    let mut end = level_end(text, ti)?;
                    while end > ti && text[end - 1].is_whitespace() {
                        end -= 1;
                    }
                    if end == ti {
                        return None;
                    }
                    captures.push((name.clone(), text[ti..end].iter().collect()));
                    return Some(end);
                }
                let mut end = ti;
                while let Some(next) = next_unit(text, end) {
                    end = next;
                    if text[end - 1].is_whitespace() {
                        continue;
                    }
                    captures.push((name.clone(), text[ti..end].iter().collect()));
                    if let Some(done) = self.match_from(text, pi + 1, end, captures) {
                        return Some(done);
                    }
                    captures.pop();
                }
                None
            }
        }
    }
}

/// Parse `:[name]` at `at`; returns the name and the index after `]`.
fn hole_at(chars: &[char], at: usize) -> Option<(String, usize)> {
    let mut i = at + 2;
    let mut name = String::new();
    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
        name.push(chars[i]);
        i += 1;
    }
    (!name.is_empty() && chars.get(i) == Some(&']')).then_some((name, i + 1))
}

/// End of the balanced unit starting at `at`: a whole parenthesized group,
/// a whole string literal or a single character. `None` at a closing
/// parenthesis, at the end of the text or for an unclosed group.
fn next_unit(text: &[char], at: usize) -> Option<usize> {
    match text.get(at)? {
        ')' => None,
        '"' => Some(string_end(text, at)),
        '(' => {
            let mut depth = 0usize;
            let mut i = at;
            while i < text.len() {
                match text[i] {
                    '"' => {
                        i = string_end(text, i);
                        continue;
                    }
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(i + 1);
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
            None
        }
        _ => Some(at + 1),
    }
}

/// Position of the `)` closing the region that contains `at`, or the end of
/// the text at top level.
fn level_end(text: &[char], at: usize) -> Option<usize> {
    let mut end = at;
    while end < text.len() && text[end] != ')' {
        end = next_unit(text, end)?;
    }
    Some(end)
}

fn is_paren(c: char) -> bool {
    c == '(' || c == ')'
}

fn paren_boundary(text: &[char], at: usize) -> bool {
    at == 0
        || at == text.len()
        || is_paren(text[at])
        || is_paren(text[at - 1])
}

fn token_start(text: &[char], at: usize) -> bool {
    let c = text[at];
    !c.is_whitespace()
        && (at == 0 || c == '(' || text[at - 1].is_whitespace() || is_paren(text[at - 1]))
}

fn token_end(text: &[char], end: usize) -> bool {
    end == text.len()
        || text[end].is_whitespace()
        || is_paren(text[end])
        || is_paren(text[end - 1])
        || text[end - 1] == '"'
}

fn string_mask(text: &[char]) -> Vec<bool> {
    let mut mask = vec![false; text.len()];
    let mut i = 0;
    while i < text.len() {
        if text[i] == '"' {
            let end = string_end(text, i);
            for slot in &mut mask[i + 1..end] {
                *slot = true;
            }
            i = end;
        } else {
            i += 1;
        }
    }
    mask
}
