//! Template parsing.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use weave_types::{ErrorCode, Result, WeaveError};

use crate::code::clear_code;
use crate::matcher::{Pattern, ANONYMOUS};

/// Prefix that negates an inbound operation.
pub const NOT_PREFIX: &str = "not_";

fn variable_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"%[a-zA-Z][^%]*%").expect("valid regex"))
}

fn operation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":(!?)([a-zA-Z]\w*)\(([^)]*)\)").expect("valid regex"))
}

/// An operation attached to a placeholder, such as `includes(T)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableOperation {
    pub name: String,
    pub negated: bool,
    pub args: Vec<String>,
}

/// A named placeholder and its operations, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVariable {
    pub name: String,
    pub operations: Vec<VariableOperation>,
}

/// A parsed template.
#[derive(Debug, Clone)]
pub struct Template {
    key: String,
    value: String,
    variables: Vec<TemplateVariable>,
    comby: String,
    pattern: Pattern,
}

impl Template {
    /// Parse the template `key` with body `value`.
    pub fn parse(key: &str, value: &str) -> Result<Self> {
        let mut variables: Vec<TemplateVariable> = Vec::new();
        for found in variable_regex().find_iter(value) {
            let inner = found.as_str().trim_matches('%');
            let name = inner.split(':').next().unwrap_or(inner).trim();
            let operations = operation_regex()
                .captures_iter(found.as_str())
                .map(|caps| parse_operation(&caps[1], &caps[2], &caps[3]))
                .collect::<Vec<_>>();

            match variables.iter_mut().find(|v| v.name == name) {
                Some(existing) => existing.operations.extend(operations),
                None => variables.push(TemplateVariable {
                    name: name.to_string(),
                    operations,
                }),
            }
        }

        let comby = to_comby(value);
        if !balanced(&comby) {
            return Err(WeaveError::new(
                ErrorCode::INVALID_TEMPLATE,
                format!("template '{key}' has unbalanced parentheses: {value}"),
            ));
        }
        let pattern = Pattern::compile(&comby);
        Ok(Self {
            key: key.to_string(),
            value: value.to_string(),
            variables,
            comby,
            pattern,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn variables(&self) -> &[TemplateVariable] {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&TemplateVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// The pattern in `:[hole]` notation.
    pub fn comby(&self) -> &str {
        &self.comby
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Placeholder names, plus every name exported through `defines`.
    pub fn known_variables(&self) -> BTreeSet<String> {
        let mut known: BTreeSet<String> = self.variables.iter().map(|v| v.name.clone()).collect();
        for var in &self.variables {
            for op in var.operations.iter().filter(|op| op.name == "defines") {
                known.extend(op.args.iter().cloned());
            }
        }
        known
    }
}

fn parse_operation(bang: &str, name: &str, args: &str) -> VariableOperation {
    let (negated, name) = match name.strip_prefix(NOT_PREFIX) {
        Some(rest) => (true, rest),
        None => (!bang.is_empty(), name),
    };
    VariableOperation {
        name: name.to_string(),
        negated,
        args: args
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(String::from)
            .collect(),
    }
}

/// Rewrite template text into `:[hole]` notation.
///
/// `%name…%` becomes `:[name]`, an unescaped `?` becomes `:[_]` and `\?`
/// becomes a literal `?`.
fn to_comby(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(found) = variable_regex().find(rest) {
        out.push_str(&question_marks(&rest[..found.start()]));
        let inner = found.as_str().trim_matches('%');
        let name = inner.split(':').next().unwrap_or(inner).trim();
        out.push_str(&format!(":[{name}]"));
        rest = &rest[found.end()..];
    }
    out.push_str(&question_marks(rest));
    clear_code(&out)
}

fn balanced(code: &str) -> bool {
    let mut depth = 0i64;
    let mut in_string = false;
    let mut escaped = false;
    for c in code.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

fn question_marks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'?') => {
                chars.next();
                out.push('?');
            }
            '?' => out.push_str(&format!(":[{ANONYMOUS}]")),
            _ => out.push(c),
        }
    }
    out
}
