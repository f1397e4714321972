//! Template results gathered while a pointcut runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use weave_keyword::{template_keywords, KeywordMap, KeywordStack};
use weave_module::NodeId;
use weave_template::{SearchIteration, SearchValue, TemplateSet};

/// Outcome of [`TemplateManager::get_results`].
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateKeywords {
    /// No template matched inside the function.
    NoResults,
    Keywords(KeywordMap),
    /// Every result was ruled out by the keyword stack; the advice must
    /// not be applied at this site.
    Aborted,
}

/// Template definitions, shared, plus the results recorded per function
/// symbol and template name.
///
/// Results are keyed by the node of the block they were found at, so a
/// site only ever sees the captures of its own match.
#[derive(Debug, Clone)]
pub struct TemplateManager {
    templates: Arc<TemplateSet>,
    results: DashMap<String, BTreeMap<String, BTreeMap<NodeId, Vec<SearchValue>>>>,
}

impl TemplateManager {
    pub fn new(templates: Arc<TemplateSet>) -> Self {
        Self {
            templates,
            results: DashMap::new(),
        }
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    /// Record the results of `templ` at the block starting at `node` in
    /// `function`, replacing earlier ones for that block.
    pub fn add_result(&self, function: &str, templ: &str, node: NodeId, results: Vec<SearchValue>) {
        self.results
            .entry(function.to_string())
            .or_default()
            .entry(templ.to_string())
            .or_default()
            .insert(node, results);
    }

    /// Results of `templ` in `function`, over every block, in node order.
    pub fn results(&self, function: &str, templ: &str) -> Vec<SearchValue> {
        self.results
            .get(function)
            .and_then(|r| r.get(templ).map(|by_node| by_node.values().flatten().cloned().collect()))
            .unwrap_or_default()
    }

    /// Add the results of `other` for blocks this manager has none for.
    pub fn merge(&self, other: &TemplateManager) {
        for entry in other.results.iter() {
            let mut mine = self.results.entry(entry.key().clone()).or_default();
            for (templ, by_node) in entry.value() {
                let mine = mine.entry(templ.clone()).or_default();
                for (node, values) in by_node {
                    mine.entry(*node).or_insert_with(|| values.clone());
                }
            }
        }
    }

    /// Template keywords for a block of `function`.
    ///
    /// `scope` is the block's node followed by its ancestors (see
    /// [`ModuleContext::block_scope`](weave_module::ModuleContext::block_scope)).
    /// Each template contributes the results of the innermost block in
    /// `scope` it matched, narrowed by the string values of `stack`: an
    /// iteration survives only when its key is unbound or bound to exactly
    /// the text it found.
    pub fn get_results(&self, function: &str, scope: &[NodeId], stack: &KeywordStack<'_>) -> TemplateKeywords {
        let Some(current) = self.results.get(function) else {
            return TemplateKeywords::NoResults;
        };
        let mut matched = false;
        let mut kept: Vec<SearchValue> = Vec::new();
        for by_node in current.values() {
            let Some(values) = scope.iter().find_map(|node| by_node.get(node)) else {
                continue;
            };
            matched = true;
            kept.extend(filter_with_keywords(values, stack));
        }
        if !matched {
            return TemplateKeywords::NoResults;
        }
        if kept.is_empty() {
            return TemplateKeywords::Aborted;
        }
        TemplateKeywords::Keywords(template_keywords(&kept))
    }
}

fn bound_text(stack: &KeywordStack<'_>, key: &str) -> Option<String> {
    stack.lookup(key).and_then(|v| v.as_str().map(str::to_string))
}

/// Drop the iterations the keyword stack rules out, recursively. An
/// iteration with nested values needs at least one of them to survive.
fn filter_with_keywords(values: &[SearchValue], stack: &KeywordStack<'_>) -> Vec<SearchValue> {
    let mut out = Vec::new();
    for value in values {
        let bound = bound_text(stack, &value.key);
        let iterations: Vec<SearchIteration> = value
            .iterations
            .iter()
            .filter(|it| bound.as_ref().map_or(true, |b| *b == it.found))
            .filter_map(|it| {
                if it.values.is_empty() {
                    return Some(it.clone());
                }
                let children = filter_with_keywords(&it.values, stack);
                (!children.is_empty()).then(|| SearchIteration::new(it.found.clone(), children))
            })
            .collect();
        if !iterations.is_empty() {
            out.push(SearchValue::new(value.key.clone(), value.templ.clone(), iterations));
        }
    }
    out
}
