//! Inbound operations: constraints a placeholder puts on nested templates.

use crate::search::SearchValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeMode {
    /// `includes(T)`: exactly one template.
    Single,
    /// `includes_one(T1, …)`: at least one of them.
    One,
    /// `includes_all(T1, …)`: every one of them.
    All,
}

impl IncludeMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "includes" => Some(Self::Single),
            "includes_one" => Some(Self::One),
            "includes_all" => Some(Self::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "includes",
            Self::One => "includes_one",
            Self::All => "includes_all",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOperation {
    Includes {
        variable: String,
        mode: IncludeMode,
        templates: Vec<String>,
        /// Names the nested templates must define, from a following `defines`.
        definitions: Vec<String>,
    },
    Not(Box<InboundOperation>),
}

impl InboundOperation {
    /// The placeholder this operation constrains.
    pub fn variable(&self) -> &str {
        match self {
            Self::Includes { variable, .. } => variable,
            Self::Not(inner) => inner.variable(),
        }
    }

    pub fn definitions(&self) -> &[String] {
        match self {
            Self::Includes { definitions, .. } => definitions,
            Self::Not(inner) => inner.definitions(),
        }
    }

    pub(crate) fn define(&mut self, names: &[String]) {
        match self {
            Self::Includes { definitions, .. } => definitions.extend(names.iter().cloned()),
            Self::Not(inner) => inner.define(names),
        }
    }

    /// Nested templates searched inside the placeholder, each with whether
    /// it has to be found (`true`) or has to be absent (`false`).
    pub fn children(&self) -> Vec<(String, bool)> {
        match self {
            Self::Includes { templates, .. } => {
                templates.iter().map(|t| (t.clone(), true)).collect()
            }
            Self::Not(inner) => inner
                .children()
                .into_iter()
                .map(|(t, included)| (t, !included))
                .collect(),
        }
    }

    /// `true` when the match `search` satisfies the operation.
    pub fn validate(&self, search: &SearchValue) -> bool {
        match self {
            Self::Includes {
                variable,
                mode,
                templates,
                ..
            } => {
                let mut found = templates.iter().map(|t| search.includes_variable(variable, t));
                match mode {
                    IncludeMode::Single | IncludeMode::One => found.any(|f| f),
                    IncludeMode::All => found.all(|f| f),
                }
            }
            Self::Not(inner) => !inner.validate(search),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Includes {
                variable,
                mode,
                templates,
                ..
            } => format!("%{variable}:{}({})%", mode.as_str(), templates.join(",")),
            Self::Not(inner) => format!("not {}", inner.describe()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchIteration;

    fn includes(mode: IncludeMode, templates: &[&str]) -> InboundOperation {
        InboundOperation::Includes {
            variable: "v".into(),
            mode,
            templates: templates.iter().map(|t| t.to_string()).collect(),
            definitions: vec![],
        }
    }

    /// A match whose placeholder `v` contains a match of `A` only.
    fn search_with_a() -> SearchValue {
        let child = SearchValue::new("v", "A", vec![SearchIteration::new("(nop)", vec![])]);
        let var = SearchValue::new("v", "T", vec![SearchIteration::new("(nop)", vec![child])]);
        SearchValue::new("T", "T", vec![SearchIteration::new("(drop (nop))", vec![var])])
    }

    #[test]
    fn test_includes_modes() {
        let s = search_with_a();
        assert!(includes(IncludeMode::Single, &["A"]).validate(&s));
        assert!(includes(IncludeMode::One, &["B", "A"]).validate(&s));
        assert!(!includes(IncludeMode::All, &["A", "B"]).validate(&s));
    }

    #[test]
    fn test_not_inverts() {
        let s = search_with_a();
        let op = InboundOperation::Not(Box::new(includes(IncludeMode::Single, &["B"])));
        assert!(op.validate(&s));
        assert_eq!(op.children(), vec![("B".to_string(), false)]);
        assert_eq!(op.variable(), "v");
    }

    #[test]
    fn test_mode_names() {
        for mode in [IncludeMode::Single, IncludeMode::One, IncludeMode::All] {
            assert_eq!(IncludeMode::from_name(mode.as_str()), Some(mode));
        }
        assert_eq!(IncludeMode::from_name("defines"), None);
    }
}
