use std::fmt;

use serde::Serialize;
use weave_types::text::capitalize;

/// A keyword value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum KeywordValue {
    Str(String),
    /// Named fields in insertion order.
    Object(Vec<(String, KeywordValue)>),
    Array(Vec<KeywordValue>),
    /// A template match: the matched text plus one field per placeholder.
    Template {
        found: String,
        fields: Vec<(String, KeywordValue)>,
    },
}

impl KeywordValue {
    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, KeywordValue)>) -> Self {
        Self::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::Template { .. } => "template",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Field `name`, matched exactly first and then with a capitalized
    /// first letter.
    pub fn field(&self, name: &str) -> Option<&KeywordValue> {
        let fields = match self {
            Self::Object(fields) => fields,
            Self::Template { fields, .. } => fields,
            _ => return None,
        };
        let find = |key: &str| fields.iter().find(|(k, _)| k == key).map(|(_, v)| v);
        find(name).or_else(|| find(&capitalize(name)))
    }

    pub fn index(&self, i: usize) -> Option<&KeywordValue> {
        match self {
            Self::Array(items) => items.get(i),
            _ => None,
        }
    }

    /// Element count: array items, object fields or the characters of a
    /// string or template match.
    pub fn count(&self) -> usize {
        match self {
            Self::Str(s) => s.chars().count(),
            Self::Object(fields) => fields.len(),
            Self::Array(items) => items.len(),
            Self::Template { found, .. } => found.chars().count(),
        }
    }

    /// Text is true unless empty or `false`; collections are true when
    /// non-empty.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Str(s) | Self::Template { found: s, .. } => !s.is_empty() && s != "false",
            Self::Object(fields) => !fields.is_empty(),
            Self::Array(items) => !items.is_empty(),
        }
    }
}

impl fmt::Display for KeywordValue {
    /// Strings print as-is, templates as their matched text, arrays as
    /// space-separated items and objects as `{key:value,…}`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Template { found, .. } => f.write_str(found),
            Self::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Self::Object(fields) => {
                f.write_str("{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for KeywordValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for KeywordValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<serde_json::Value> for KeywordValue {
    /// Scalars become strings, `null` the empty string.
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Str(String::new()),
            Value::Bool(b) => Self::Str(b.to_string()),
            Value::Number(n) => Self::Str(n.to_string()),
            Value::String(s) => Self::Str(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(fields) => {
                Self::Object(fields.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}
