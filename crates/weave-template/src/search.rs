//! Search results.

use serde::Serialize;

/// A keyed match site with one iteration per match.
///
/// At the top level the key is the template name. Below it, each value is
/// keyed by a placeholder name and `templ` names the template whose pattern
/// produced it, so a placeholder searched with a nested template appears
/// once with the outer template and once per nested template that matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchValue {
    pub key: String,
    #[serde(rename = "template")]
    pub templ: String,
    pub iterations: Vec<SearchIteration>,
}

/// The matched text of one match, and what was found inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchIteration {
    pub found: String,
    pub values: Vec<SearchValue>,
}

impl SearchValue {
    pub fn new(key: impl Into<String>, templ: impl Into<String>, iterations: Vec<SearchIteration>) -> Self {
        Self {
            key: key.into(),
            templ: templ.into(),
            iterations,
        }
    }

    /// The first value keyed `key`, searching depth first from `self`.
    pub fn get(&self, key: &str) -> Option<&SearchValue> {
        if self.key == key {
            return Some(self);
        }
        self.iterations
            .iter()
            .flat_map(|it| it.values.iter())
            .find_map(|v| v.get(key))
    }

    /// Text of the first iteration.
    pub fn found(&self) -> Option<&str> {
        self.iterations.first().map(|it| it.found.as_str())
    }

    /// `true` when `variable` (at any depth) holds a match of template `templ`.
    pub fn includes_variable(&self, variable: &str, templ: &str) -> bool {
        self.iterations
            .iter()
            .flat_map(|it| it.values.iter())
            .any(|v| v.templ == templ || (v.key == variable && v.includes_variable(variable, templ)))
    }
}

impl SearchIteration {
    pub fn new(found: impl Into<String>, values: Vec<SearchValue>) -> Self {
        Self {
            found: found.into(),
            values,
        }
    }
}
