//! Keyword maps and the lookup stack.

use std::collections::{BTreeMap, HashMap};

use weave_types::text::capitalize;

use crate::value::KeywordValue;

/// Anything that can resolve a keyword name.
pub trait KeywordSource {
    fn lookup(&self, name: &str) -> Option<KeywordValue>;
}

/// Function index lookup, used by the `order` method.
pub trait FunctionOrders {
    fn order_of(&self, name: &str) -> Option<u32>;
}

impl FunctionOrders for HashMap<String, u32> {
    fn order_of(&self, name: &str) -> Option<u32> {
        self.get(name).copied()
    }
}

impl FunctionOrders for BTreeMap<String, u32> {
    fn order_of(&self, name: &str) -> Option<u32> {
        self.get(name).copied()
    }
}

/// An insertion-ordered keyword map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordMap {
    entries: Vec<(String, KeywordValue)>,
}

impl KeywordMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `name`; a replaced entry keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<KeywordValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&KeywordValue> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<KeywordValue> {
        let pos = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeywordValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add every entry of `other` whose name is not present yet.
    pub fn join(&mut self, other: &KeywordMap) {
        for (k, v) in &other.entries {
            if !self.contains(k) {
                self.entries.push((k.clone(), v.clone()));
            }
        }
    }

    /// The map as a JSON object, for diagnostics.
    pub fn to_json(&self) -> String {
        let object: serde_json::Map<String, serde_json::Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or_default()))
            .collect();
        serde_json::Value::Object(object).to_string()
    }
}

impl KeywordSource for KeywordMap {
    fn lookup(&self, name: &str) -> Option<KeywordValue> {
        self.get(name).cloned()
    }
}

impl<K: Into<String>, V: Into<KeywordValue>> FromIterator<(K, V)> for KeywordMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// Ordered keyword sources; the first one that knows a name wins.
#[derive(Default)]
pub struct KeywordStack<'a> {
    layers: Vec<&'a dyn KeywordSource>,
}

impl<'a> KeywordStack<'a> {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub fn push(&mut self, layer: &'a dyn KeywordSource) {
        self.layers.push(layer);
    }

    pub fn with(mut self, layer: &'a dyn KeywordSource) -> Self {
        self.push(layer);
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Resolve `name`. Each layer is asked for the name as written and then
    /// with a capitalized first letter, which is how filters store their
    /// bindings.
    pub fn lookup(&self, name: &str) -> Option<KeywordValue> {
        let capitalized = capitalize(name);
        self.layers.iter().find_map(|layer| {
            layer
                .lookup(name)
                .or_else(|| (capitalized != name).then(|| layer.lookup(&capitalized)).flatten())
        })
    }
}

impl KeywordSource for KeywordStack<'_> {
    fn lookup(&self, name: &str) -> Option<KeywordValue> {
        KeywordStack::lookup(self, name)
    }
}
