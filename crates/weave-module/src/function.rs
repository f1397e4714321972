//! Function definitions.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::instr;
use crate::tree::{NodeId, Tree};

/// A parameter or local: its symbol and value type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub symbol: String,
    pub ty: String,
}

impl Variable {
    pub fn new(symbol: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ty: ty.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportName {
    pub module: String,
    pub field: String,
}

/// One function of the module.
///
/// The signature is fixed once the function exists. The instruction tree,
/// the locals and the alias map sit behind the function's own lock so
/// that weaving tasks on distinct functions never contend.
#[derive(Debug)]
pub struct Function {
    pub(crate) symbol: String,
    pub(crate) import: Option<ImportName>,
    pub(crate) exports: Vec<String>,
    pub(crate) params: Vec<Variable>,
    pub(crate) result: Option<String>,
    pub(crate) body: Mutex<FunctionBody>,
}

#[derive(Debug)]
pub(crate) struct FunctionBody {
    pub tree: Tree,
    /// The module field: the `func` list, or the `import` list around it.
    pub root: NodeId,
    pub func: NodeId,
    pub locals: Vec<Variable>,
    /// symbol → user name
    pub aliases: BTreeMap<String, String>,
}

impl FunctionBody {
    /// Instruction nodes after the header.
    pub fn body_nodes(&self) -> Vec<NodeId> {
        let start = instr::header_len(&self.tree, self.func);
        self.tree.children(self.func)[start..].to_vec()
    }

    pub fn body_text(&self) -> String {
        self.tree.text_of(&self.body_nodes())
    }

    pub fn has_variable(&self, params: &[Variable], symbol: &str) -> bool {
        params.iter().chain(&self.locals).any(|v| v.symbol == symbol)
    }
}

impl Function {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn import(&self) -> Option<&ImportName> {
        self.import.as_ref()
    }

    pub fn exports(&self) -> &[String] {
        &self.exports
    }

    pub fn is_imported(&self) -> bool {
        self.import.is_some()
    }

    pub fn is_exported(&self) -> bool {
        !self.exports.is_empty()
    }

    pub fn params(&self) -> &[Variable] {
        &self.params
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    /// Export name, else `module.field` for imports, else the symbol
    /// without its `$`.
    pub fn visible_name(&self) -> String {
        if let Some(export) = self.exports.first() {
            return export.clone();
        }
        if let Some(import) = &self.import {
            return format!("{}.{}", import.module, import.field);
        }
        self.symbol.trim_start_matches('$').to_string()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, FunctionBody> {
        self.body.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn locals(&self) -> Vec<Variable> {
        self.lock().locals.clone()
    }

    /// Body instructions as compact text.
    pub fn code(&self) -> String {
        self.lock().body_text()
    }

    /// Type of a param or local, by symbol.
    pub fn variable_type(&self, symbol: &str) -> Option<String> {
        if let Some(p) = self.params.iter().find(|p| p.symbol == symbol) {
            return Some(p.ty.clone());
        }
        self.lock()
            .locals
            .iter()
            .find(|l| l.symbol == symbol)
            .map(|l| l.ty.clone())
    }

    /// User name registered for `symbol`.
    pub fn alias_value(&self, symbol: &str) -> Option<String> {
        self.lock().aliases.get(symbol).cloned()
    }

    /// Symbol registered under the user name `name`.
    pub fn alias_key(&self, name: &str) -> Option<String> {
        self.lock()
            .aliases
            .iter()
            .find(|(_, v)| *v == name)
            .map(|(k, _)| k.clone())
    }

    /// Register `name` as the user name of `symbol`. Any previous entry
    /// for either side is dropped so the map stays one-to-one.
    pub fn add_alias(&self, symbol: impl Into<String>, name: impl Into<String>) {
        let symbol = symbol.into();
        let name = name.into();
        let mut body = self.lock();
        body.aliases.retain(|k, v| *k != symbol && *v != name);
        body.aliases.insert(symbol, name);
    }

    pub fn aliases(&self) -> BTreeMap<String, String> {
        self.lock().aliases.clone()
    }
}
