//! Serde model of a transformation description.
//!
//! A description is read from TOML or JSON. Every section is optional.
//! Sections that map names to entries keep the order in which the entries
//! appear in the document, since advice order falls back to input order.

use crate::{ErrorCode, Result, WeaveError};
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use std::marker::PhantomData;

// ── Ordered map ───────────────────────────────────────────────────────────────

/// A string-keyed map that preserves document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert or replace an entry. A replaced entry keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct OrderedMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = OrderedMap<V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of named entries")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
        let mut map = OrderedMap::new();
        while let Some((k, v)) = access.next_entry::<String, V>()? {
            map.insert(k, v);
        }
        Ok(map)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

// ── Description ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TransformDescription {
    /// template name → template body
    pub templates: OrderedMap<String>,
    /// pointcut name → pointcut body (without-context grammar)
    pub pointcuts: OrderedMap<String>,
    pub aspects: Aspects,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Aspects {
    /// Code appended to the module's start function.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    pub context: ContextSection,
    pub advices: OrderedMap<AdviceSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ContextSection {
    /// user name → `type [= value]` of a new global
    pub variables: OrderedMap<String>,
    pub functions: OrderedMap<FunctionSpec>,
}

/// A function added to the module by the context section.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FunctionSpec {
    /// local user name → `type [= value]`
    pub variables: OrderedMap<String>,
    pub args: Vec<FunctionArg>,
    /// Result type; empty or absent for void.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imported: Option<ImportSpec>,
    /// Export name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exported: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionArg {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ImportSpec {
    pub module: String,
    pub field: String,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AdviceSpec {
    /// local user name → `type [= value]`
    pub variables: OrderedMap<String>,
    pub pointcut: String,
    pub advice: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    pub all: bool,
    pub smart: bool,
}

/// Document formats a description can be read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionFormat {
    Toml,
    Json,
}

impl DescriptionFormat {
    /// Pick the format from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

impl TransformDescription {
    pub fn parse(text: &str, format: DescriptionFormat) -> Result<Self> {
        match format {
            DescriptionFormat::Toml => Self::from_toml(text),
            DescriptionFormat::Json => Self::from_json(text),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| {
            WeaveError::new(
                ErrorCode::INVALID_DESCRIPTION,
                format!("invalid TOML description: {e}"),
            )
        })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| {
            WeaveError::new(
                ErrorCode::INVALID_DESCRIPTION,
                format!("invalid JSON description: {e}"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_defaults() {
        let d = TransformDescription::from_json("{}").unwrap();
        assert!(d.templates.is_empty());
        assert!(d.aspects.advices.is_empty());
        assert!(d.aspects.start.is_none());
    }

    #[test]
    fn test_json_advices_keep_document_order() {
        let d = TransformDescription::from_json(
            r#"{"aspects": {"advices": {
                "zeta": {"pointcut": "() => func(* *(..))", "advice": "%this%"},
                "alpha": {"pointcut": "() => func(* *(..))", "advice": "%this%", "order": 2},
                "mid": {"pointcut": "", "advice": ""}
            }}}"#,
        )
        .unwrap();
        let names: Vec<&str> = d.aspects.advices.keys().collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(d.aspects.advices.get("alpha").unwrap().order, Some(2));
    }

    #[test]
    fn test_toml_full_description() {
        let d = TransformDescription::from_toml(
            r#"
[templates]
add = "(i32.add %x% %y%)"

[aspects]
start = "(call $init)"

[aspects.context.variables]
counter = "i32 = 0"

[aspects.context.functions.log]
args = [{ name = "v", type = "i32" }]
imported = { module = "env", field = "log" }

[aspects.advices.count]
variables = { tmp = "i32" }
pointcut = "() => func(* *(..), exported)"
advice = "%this%"
smart = true
"#,
        )
        .unwrap();
        assert_eq!(d.templates.get("add").unwrap(), "(i32.add %x% %y%)");
        assert_eq!(d.aspects.start.as_deref(), Some("(call $init)"));
        let log = d.aspects.context.functions.get("log").unwrap();
        assert_eq!(log.args[0].ty, "i32");
        assert_eq!(log.imported.as_ref().unwrap().field, "log");
        let count = d.aspects.advices.get("count").unwrap();
        assert!(count.smart);
        assert!(!count.all);
        assert_eq!(count.variables.get("tmp").unwrap(), "i32");
    }

    #[test]
    fn test_invalid_description_is_description_error() {
        let err = TransformDescription::from_json("{\"templates\": 3}").unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_DESCRIPTION);
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            DescriptionFormat::from_extension("TOML"),
            Some(DescriptionFormat::Toml)
        );
        assert_eq!(DescriptionFormat::from_extension("yml"), None);
    }
}
