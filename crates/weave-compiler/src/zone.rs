//! Context variable zones.
//!
//! A zone maps user names from the description to module symbols. Zones
//! form a chain: the global zone holds context globals and functions,
//! each context function has a zone for its params and locals, and each
//! woven join point gets a short-lived zone for the advice locals.
//!
//! The global and function zones live in a [`ZoneArena`] and link to
//! their parent by index. The arena is complete before any advice runs,
//! so weaving tasks share it read-only.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use weave_keyword::{KeywordSource, KeywordValue};

// ══════════════════════════════════════════════════════════════════════════════
// Zone
// ══════════════════════════════════════════════════════════════════════════════

/// Index of a zone in its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZoneId(usize);

/// A function registered in a zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntry {
    pub index: u32,
    pub symbol: String,
}

#[derive(Debug, Clone, Default)]
pub struct Zone {
    parent: Option<ZoneId>,
    variables: BTreeMap<String, String>,
    functions: BTreeMap<String, FunctionEntry>,
}

impl Zone {
    /// An empty zone under `parent`.
    pub fn child(parent: ZoneId) -> Self {
        Self {
            parent: Some(parent),
            ..Self::default()
        }
    }

    pub fn parent(&self) -> Option<ZoneId> {
        self.parent
    }

    pub fn add_variable(&mut self, name: impl Into<String>, symbol: impl Into<String>) {
        self.variables.insert(name.into(), symbol.into());
    }

    pub fn add_function(&mut self, name: impl Into<String>, entry: FunctionEntry) {
        self.functions.insert(name.into(), entry);
    }

    /// Symbol bound to `name` in this zone alone. Variables shadow
    /// functions of the same name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables
            .get(name)
            .map(String::as_str)
            .or_else(|| self.functions.get(name).map(|f| f.symbol.as_str()))
    }

    pub fn function(&self, name: &str) -> Option<&FunctionEntry> {
        self.functions.get(name)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// ZoneArena
// ══════════════════════════════════════════════════════════════════════════════

/// Zones addressed by [`ZoneId`]. The first zone is the global one.
#[derive(Debug, Clone)]
pub struct ZoneArena {
    zones: Vec<Zone>,
}

impl ZoneArena {
    pub fn new() -> Self {
        Self {
            zones: vec![Zone::default()],
        }
    }

    pub fn global(&self) -> ZoneId {
        ZoneId(0)
    }

    pub fn push(&mut self, zone: Zone) -> ZoneId {
        self.zones.push(zone);
        ZoneId(self.zones.len() - 1)
    }

    pub fn get(&self, id: ZoneId) -> &Zone {
        &self.zones[id.0]
    }

    pub fn get_mut(&mut self, id: ZoneId) -> &mut Zone {
        &mut self.zones[id.0]
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Resolve `name` from zone `from` outwards.
    pub fn value(&self, from: ZoneId, name: &str) -> Option<&str> {
        let mut current = Some(from);
        while let Some(id) = current {
            let zone = self.get(id);
            if let Some(symbol) = zone.get(name) {
                return Some(symbol);
            }
            current = zone.parent;
        }
        None
    }
}

impl Default for ZoneArena {
    fn default() -> Self {
        Self::new()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// ContextVariables
// ══════════════════════════════════════════════════════════════════════════════

/// Keyword view over a zone chain. The innermost zone is owned so that a
/// weaving task can fill it without touching the shared arena; resolved
/// names are cached.
#[derive(Debug)]
pub struct ContextVariables<'a> {
    arena: &'a ZoneArena,
    zone: Zone,
    cache: Mutex<HashMap<String, String>>,
}

impl<'a> ContextVariables<'a> {
    pub fn new(arena: &'a ZoneArena, zone: Zone) -> Self {
        Self {
            arena,
            zone,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// A view that starts at zone `id` of the arena.
    pub fn over(arena: &'a ZoneArena, id: ZoneId) -> Self {
        Self::new(arena, Zone::child(id))
    }

    /// Symbol bound to `name`, from the innermost zone outwards.
    pub fn value(&self, name: &str) -> Option<String> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = cache.get(name) {
            return Some(hit.clone());
        }
        let found = self
            .zone
            .get(name)
            .or_else(|| self.zone.parent.and_then(|p| self.arena.value(p, name)))?
            .to_string();
        cache.insert(name.to_string(), found.clone());
        Some(found)
    }
}

impl KeywordSource for ContextVariables<'_> {
    fn lookup(&self, name: &str) -> Option<KeywordValue> {
        self.value(name).map(KeywordValue::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena() -> (ZoneArena, ZoneId) {
        let mut arena = ZoneArena::new();
        let global = arena.global();
        arena.get_mut(global).add_variable("counter", "$wmr_g0");
        arena.get_mut(global).add_function(
            "log",
            FunctionEntry {
                index: 0,
                symbol: "$wmr_f2".into(),
            },
        );
        let mut zone = Zone::child(global);
        zone.add_variable("v", "0");
        zone.add_variable("counter", "$wmr_l1");
        let inner = arena.push(zone);
        (arena, inner)
    }

    #[test]
    fn test_lookup_walks_parents() {
        let (arena, inner) = arena();
        assert_eq!(arena.value(inner, "v"), Some("0"));
        assert_eq!(arena.value(inner, "log"), Some("$wmr_f2"));
        assert_eq!(arena.value(arena.global(), "v"), None);
    }

    #[test]
    fn test_inner_zone_shadows_outer() {
        let (arena, inner) = arena();
        assert_eq!(arena.value(inner, "counter"), Some("$wmr_l1"));
        assert_eq!(arena.value(arena.global(), "counter"), Some("$wmr_g0"));
    }

    #[test]
    fn test_context_variables_owned_zone_first() {
        let (arena, inner) = arena();
        let mut zone = Zone::child(inner);
        zone.add_variable("tmp", "$wmr_l3");
        let vars = ContextVariables::new(&arena, zone);
        assert_eq!(vars.value("tmp").as_deref(), Some("$wmr_l3"));
        assert_eq!(vars.value("v").as_deref(), Some("0"));
        assert_eq!(vars.lookup("log"), Some(KeywordValue::from("$wmr_f2")));
        assert!(vars.lookup("missing").is_none());
    }

    #[test]
    fn test_cached_lookup_is_stable() {
        let (arena, inner) = arena();
        let vars = ContextVariables::over(&arena, inner);
        let first = vars.value("counter");
        assert_eq!(vars.value("counter"), first);
    }
}
