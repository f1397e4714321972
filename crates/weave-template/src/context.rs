//! Template contexts and the template set.
//!
//! A [`TemplateContext`] is a template plus its resolved inbound operations.
//! Contexts are built on first use and memoized by the owning
//! [`TemplateSet`]; building one builds the contexts of every template it
//! references and rejects reference cycles.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use log::debug;
use weave_types::{ErrorCode, Result, WeaveError};

use crate::code::clear_code;
use crate::matcher::Match;
use crate::operations::{InboundOperation, IncludeMode};
use crate::search::{SearchIteration, SearchValue};
use crate::template::{Template, TemplateVariable};

const DEFINES: &str = "defines";

/// A template with its inbound operations resolved.
#[derive(Debug)]
pub struct TemplateContext {
    template: Arc<Template>,
    operations: Vec<InboundOperation>,
    /// Placeholder name to the nested templates searched inside it.
    children: BTreeMap<String, Vec<(String, bool)>>,
    known_variables: BTreeSet<String>,
}

impl TemplateContext {
    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn key(&self) -> &str {
        self.template.key()
    }

    pub fn operations(&self) -> &[InboundOperation] {
        &self.operations
    }

    pub fn known_variables(&self) -> &BTreeSet<String> {
        &self.known_variables
    }

    /// `true` when every inbound operation accepts the match.
    pub fn validate_children(&self, search: &SearchValue) -> bool {
        self.operations.iter().all(|op| op.validate(search))
    }

    /// `true` when every placeholder that occurs more than once in the
    /// match captured the same text each time. Placeholders are scoped by
    /// the template that declares them.
    pub fn validate_values(&self, search: &SearchValue) -> bool {
        let mut seen = HashMap::new();
        search
            .iterations
            .iter()
            .all(|it| consistent_values(&it.values, &mut seen))
    }
}

/// Checks the placeholders of one template level, then descends into the
/// levels of the nested templates found inside them.
fn consistent_values<'a>(
    values: &'a [SearchValue],
    seen: &mut HashMap<(&'a str, &'a str), &'a str>,
) -> bool {
    for value in values {
        let Some(found) = value.found() else {
            continue;
        };
        let scoped = (value.templ.as_str(), value.key.as_str());
        match seen.get(&scoped) {
            Some(previous) if *previous != found => return false,
            Some(_) => {}
            None => {
                seen.insert(scoped, found);
            }
        }
        for nested in value.iterations.iter().flat_map(|it| it.values.iter()) {
            if !nested
                .iterations
                .iter()
                .all(|it| consistent_values(&it.values, seen))
            {
                return false;
            }
        }
    }
    true
}

/// Every template of a transformation, with memoized contexts.
#[derive(Debug, Default)]
pub struct TemplateSet {
    templates: BTreeMap<String, Arc<Template>>,
    contexts: RwLock<HashMap<String, Arc<TemplateContext>>>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every `(name, body)` pair.
    pub fn parse<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut set = Self::new();
        for (key, value) in entries {
            set.insert(Template::parse(key, value)?);
        }
        Ok(set)
    }

    pub fn insert(&mut self, template: Template) {
        self.contexts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.templates
            .insert(template.key().to_string(), Arc::new(template));
    }

    pub fn get(&self, key: &str) -> Option<&Template> {
        self.templates.get(key).map(Arc::as_ref)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.templates.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// The context of template `key`, built on first use.
    pub fn context(&self, key: &str) -> Result<Arc<TemplateContext>> {
        self.context_with(key, &mut Vec::new())
    }

    /// Search template `key` in `code`.
    ///
    /// Returns one value per accepted match, keyed by the template name. A
    /// match that breaks an inbound operation or binds one placeholder to
    /// two different texts is skipped; no match at all is an empty result,
    /// not an error.
    pub fn search(&self, key: &str, code: &str) -> Result<Vec<SearchValue>> {
        let ctx = self.context(key)?;
        Ok(self
            .find_iterations(&ctx, &clear_code(code))?
            .into_iter()
            .map(|it| SearchValue::new(key, key, vec![it]))
            .collect())
    }

    fn context_with(&self, key: &str, visiting: &mut Vec<String>) -> Result<Arc<TemplateContext>> {
        if let Some(ctx) = self
            .contexts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
        {
            return Ok(Arc::clone(ctx));
        }
        if visiting.iter().any(|k| k == key) {
            visiting.push(key.to_string());
            return Err(WeaveError::new(
                ErrorCode::INVALID_TEMPLATE,
                format!("cyclic template reference: {}", visiting.join(" -> ")),
            ));
        }
        let template = self.templates.get(key).cloned().ok_or_else(|| {
            WeaveError::new(ErrorCode::UNKNOWN_TEMPLATE, format!("template '{key}' not found"))
        })?;

        visiting.push(key.to_string());
        let mut operations = Vec::new();
        let mut children: BTreeMap<String, Vec<(String, bool)>> = BTreeMap::new();
        for var in template.variables() {
            for op in variable_operations(&template, var)? {
                for (child, included) in op.children() {
                    let child_ctx = self.context_with(&child, visiting)?;
                    if let Some(missing) = op
                        .definitions()
                        .iter()
                        .find(|d| !child_ctx.known_variables.contains(*d))
                    {
                        return Err(WeaveError::new(
                            ErrorCode::INVALID_TEMPLATE,
                            format!(
                                "template '{key}': variable '{missing}' is not defined by template '{child}'"
                            ),
                        ));
                    }
                    children
                        .entry(var.name.clone())
                        .or_default()
                        .push((child, included));
                }
                operations.push(op);
            }
        }
        visiting.pop();

        let ctx = Arc::new(TemplateContext {
            known_variables: template.known_variables(),
            template,
            operations,
            children,
        });
        Ok(Arc::clone(
            self.contexts
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .entry(key.to_string())
                .or_insert(ctx),
        ))
    }

    /// Accepted matches of `ctx` in `code`, as iterations.
    fn find_iterations(&self, ctx: &TemplateContext, code: &str) -> Result<Vec<SearchIteration>> {
        let mut accepted = Vec::new();
        let mut failure = None;
        ctx.template.pattern().find(code, |m| {
            if failure.is_some() {
                return false;
            }
            match self.accept(ctx, m) {
                Ok(Some(iteration)) => {
                    accepted.push(iteration);
                    true
                }
                Ok(None) => false,
                Err(e) => {
                    failure = Some(e);
                    false
                }
            }
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(accepted),
        }
    }

    /// The iteration for `m`, or `None` when the match is rejected.
    fn accept(&self, ctx: &TemplateContext, m: &Match) -> Result<Option<SearchIteration>> {
        let mut values = Vec::new();
        for (name, captured) in m.named_captures() {
            let captured = clear_code(captured);
            let mut nested = Vec::new();
            if let Some(children) = ctx.children.get(name) {
                let mut satisfied = false;
                for (child, included) in children {
                    let child_ctx = self.context(child)?;
                    let found = self.find_iterations(&child_ctx, &captured)?;
                    if found.is_empty() != *included {
                        satisfied = true;
                    }
                    nested.extend(
                        found
                            .into_iter()
                            .map(|it| SearchValue::new(name, child.as_str(), vec![it])),
                    );
                }
                if !satisfied {
                    return Ok(None);
                }
            }
            values.push(SearchValue::new(
                name,
                ctx.key(),
                vec![SearchIteration::new(captured, nested)],
            ));
        }

        let iteration = SearchIteration::new(clear_code(&m.matched), values);
        let search = SearchValue::new(ctx.key(), ctx.key(), vec![iteration]);
        if !ctx.validate_children(&search) || !ctx.validate_values(&search) {
            debug!(
                "template '{}': rejected match '{}'",
                ctx.key(),
                search.found().unwrap_or_default()
            );
            return Ok(None);
        }
        Ok(search.iterations.into_iter().next())
    }
}

/// Inbound operations of one placeholder, in source order.
///
/// `defines(…)` attaches to the include operation right before it.
fn variable_operations(template: &Template, var: &TemplateVariable) -> Result<Vec<InboundOperation>> {
    let invalid = |message: String| {
        WeaveError::new(
            ErrorCode::INVALID_TEMPLATE,
            format!("template '{}', variable '{}': {message}", template.key(), var.name),
        )
    };

    let mut operations: Vec<InboundOperation> = Vec::new();
    let mut after_include = false;
    for op in &var.operations {
        if op.name == DEFINES {
            if op.negated {
                return Err(invalid(format!("'{DEFINES}' cannot be negated")));
            }
            match operations.last_mut() {
                Some(last) if after_include => last.define(&op.args),
                _ => {
                    return Err(invalid(format!(
                        "'{DEFINES}' must follow a template operation such as 'includes'"
                    )))
                }
            }
            after_include = false;
            continue;
        }

        let mode = IncludeMode::from_name(&op.name)
            .ok_or_else(|| invalid(format!("unknown operation '{}'", op.name)))?;
        if op.args.is_empty() || (mode == IncludeMode::Single && op.args.len() != 1) {
            return Err(invalid(format!(
                "'{}' takes {} template name{}",
                mode.as_str(),
                if mode == IncludeMode::Single { "exactly one" } else { "at least one" },
                if mode == IncludeMode::Single { "" } else { "s" },
            )));
        }
        let include = InboundOperation::Includes {
            variable: var.name.clone(),
            mode,
            templates: op.args.clone(),
            definitions: Vec::new(),
        };
        operations.push(if op.negated {
            InboundOperation::Not(Box::new(include))
        } else {
            include
        });
        after_include = true;
    }
    Ok(operations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(entries: &[(&str, &str)]) -> TemplateSet {
        TemplateSet::parse(entries.iter().copied()).unwrap()
    }

    #[test]
    fn test_context_is_memoized() {
        let s = set(&[("T", "(drop %v%)")]);
        let a = s.context("T").unwrap();
        let b = s.context("T").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_unknown_template() {
        let err = set(&[]).context("Missing").unwrap_err();
        assert_eq!(err.code, ErrorCode::UNKNOWN_TEMPLATE);
    }

    #[test]
    fn test_unknown_operation() {
        let err = set(&[("T", "(drop %v:wraps(T)%)")]).context("T").unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_TEMPLATE);
    }

    #[test]
    fn test_includes_takes_one_template() {
        let s = set(&[("A", "(nop)"), ("B", "(unreachable)"), ("T", "(drop %v:includes(A, B)%)")]);
        assert_eq!(s.context("T").unwrap_err().code, ErrorCode::INVALID_TEMPLATE);
    }

    #[test]
    fn test_defines_must_follow_include() {
        let s = set(&[("T", "(drop %v:defines(x)%)")]);
        assert_eq!(s.context("T").unwrap_err().code, ErrorCode::INVALID_TEMPLATE);
    }

    #[test]
    fn test_defines_must_be_known() {
        let s = set(&[("C", "(local.get %n%)"), ("T", "(drop %v:includes(C):defines(n)%)")]);
        assert!(s.context("T").is_ok());
        let s = set(&[("C", "(local.get %n%)"), ("T", "(drop %v:includes(C):defines(m)%)")]);
        assert_eq!(s.context("T").unwrap_err().code, ErrorCode::INVALID_TEMPLATE);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let s = set(&[("A", "(drop %v:includes(B)%)"), ("B", "(drop %w:includes(A)%)")]);
        let err = s.context("A").unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_TEMPLATE);
        assert!(err.message.contains("A -> B -> A"));
    }

    #[test]
    fn test_validate_values_rejects_different_bindings() {
        let s = set(&[("Same", "(i32.add %x% %x%)")]);
        assert_eq!(
            s.search("Same", "(i32.add (local.get 0) (local.get 0))").unwrap().len(),
            1
        );
        assert!(s
            .search("Same", "(i32.add (local.get 0) (local.get 1))")
            .unwrap()
            .is_empty());
    }
}
