//! The module context: fields, functions, types and globals.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use crate::error::{ModuleError, ModuleResult};
use crate::function::{Function, FunctionBody, ImportName, Variable};
use crate::info::FunctionInfo;
use crate::instr;
use crate::sexpr::{self, SExpr};
use crate::runtime::RuntimeImport;
use crate::transform::RuntimeTransform;
use crate::tree::Tree;

#[derive(Debug, Clone)]
pub(crate) enum Field {
    /// Index into `ModuleContext::functions`.
    Function(usize),
    Other(SExpr),
}

/// A `(type …)` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    pub symbol: Option<String>,
    pub params: Vec<String>,
    pub result: Option<String>,
}

impl TypeDef {
    pub(crate) fn matches(&self, params: &[String], result: Option<&str>) -> bool {
        self.params == params && self.result.as_deref() == result
    }
}

/// A global, declared or imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalDef {
    pub symbol: String,
    pub ty: String,
    pub mutable: bool,
    pub import: Option<ImportName>,
}

/// In-memory WebAssembly text module.
#[derive(Debug)]
pub struct ModuleContext {
    pub(crate) name: Option<String>,
    pub(crate) fields: Vec<Field>,
    pub(crate) functions: Vec<Function>,
    pub(crate) by_symbol: HashMap<String, usize>,
    /// Positions in `functions`, in function index order.
    pub(crate) order: Vec<usize>,
    pub(crate) types: Vec<TypeDef>,
    pub(crate) globals: Vec<GlobalDef>,
    pub(crate) export_names: BTreeSet<String>,
    pub(crate) function_aliases: BTreeMap<String, String>,
    pub(crate) global_aliases: BTreeMap<String, String>,
    pub(crate) start: Option<String>,
    pub(crate) synthesized_start: Option<String>,
    pub(crate) transforms: Vec<RuntimeTransform>,
    /// Host runtime import families already added.
    pub(crate) runtime: BTreeSet<RuntimeImport>,
}

impl ModuleContext {
    /// Parse module text. A leading `(module …)` wrapper is optional.
    pub fn parse(text: &str) -> ModuleResult<Self> {
        let exprs = sexpr::parse(text)?;
        let (name, items) = if exprs.len() == 1 && exprs[0].head() == Some("module") {
            let items = &exprs[0].items()[1..];
            match items.first().and_then(SExpr::as_atom) {
                Some(n) if n.starts_with('$') => (Some(n.to_string()), items[1..].to_vec()),
                _ => (None, items.to_vec()),
            }
        } else {
            (None, exprs)
        };

        let mut ctx = Self {
            name,
            fields: Vec::new(),
            functions: Vec::new(),
            by_symbol: HashMap::new(),
            order: Vec::new(),
            types: Vec::new(),
            globals: Vec::new(),
            export_names: BTreeSet::new(),
            function_aliases: BTreeMap::new(),
            global_aliases: BTreeMap::new(),
            start: None,
            synthesized_start: None,
            transforms: Vec::new(),
            runtime: BTreeSet::new(),
        };

        for item in &items {
            if !matches!(item, SExpr::List(_)) {
                return Err(ModuleError::Malformed(format!(
                    "expected a module field, found `{item}`"
                )));
            }
            if item.head() == Some("type") {
                ctx.types.push(parse_type(item));
            }
        }

        // Function symbols depend on indices, and imports come first.
        let imported: Vec<&SExpr> = items.iter().filter(|e| is_func_import(e)).collect();
        let defined: Vec<&SExpr> = items
            .iter()
            .filter(|e| e.head() == Some("func") && !is_func_import(e))
            .collect();
        let index_of = |e: &SExpr| -> usize {
            imported
                .iter()
                .chain(&defined)
                .position(|x| std::ptr::eq(*x, e))
                .unwrap_or(0)
        };

        let mut pending_exports = Vec::new();
        for item in &items {
            match item.head() {
                Some("func") => {
                    let function = ctx.build_function(item, index_of(item))?;
                    ctx.push_function(function);
                }
                Some("import") if is_func_import(item) => {
                    let function = ctx.build_function(item, index_of(item))?;
                    ctx.push_function(function);
                }
                Some("import") => {
                    if let (Some(module), Some(field), Some(desc)) = (
                        item.items().get(1).and_then(SExpr::as_str_literal),
                        item.items().get(2).and_then(SExpr::as_str_literal),
                        item.items().get(3),
                    ) {
                        if desc.head() == Some("global") {
                            let mut global = ctx.parse_global(desc);
                            global.import = Some(ImportName {
                                module: module.to_string(),
                                field: field.to_string(),
                            });
                            ctx.globals.push(global);
                        }
                    }
                    ctx.fields.push(Field::Other(item.clone()));
                }
                Some("global") => {
                    let global = ctx.parse_global(item);
                    ctx.collect_inline_exports(item);
                    ctx.globals.push(global);
                    ctx.fields.push(Field::Other(item.clone()));
                }
                Some("export") => {
                    if let Some(name) = item.items().get(1).and_then(SExpr::as_str_literal) {
                        ctx.export_names.insert(name.to_string());
                        let target = item.items().get(2);
                        if target.and_then(SExpr::head) == Some("func") {
                            if let Some(r) = target.and_then(|t| t.items().get(1)) {
                                pending_exports.push((r.to_string(), name.to_string()));
                            }
                        }
                    }
                    ctx.fields.push(Field::Other(item.clone()));
                }
                Some("start") => {
                    ctx.start = item.items().get(1).map(ToString::to_string);
                    ctx.fields.push(Field::Other(item.clone()));
                }
                _ => {
                    ctx.collect_inline_exports(item);
                    ctx.fields.push(Field::Other(item.clone()));
                }
            }
        }
        ctx.reindex();

        for (reference, name) in pending_exports {
            let pos = ctx
                .resolve_position(&reference)
                .ok_or_else(|| ModuleError::Malformed(format!("export of unknown function {reference}")))?;
            ctx.functions[pos].exports.push(name);
        }
        if let Some(reference) = ctx.start.take() {
            let pos = ctx
                .resolve_position(&reference)
                .ok_or_else(|| ModuleError::Malformed(format!("start of unknown function {reference}")))?;
            ctx.start = Some(ctx.functions[pos].symbol.clone());
        }
        Ok(ctx)
    }

    fn collect_inline_exports(&mut self, item: &SExpr) {
        for export in item.items().iter().filter(|i| i.head() == Some("export")) {
            if let Some(name) = export.items().get(1).and_then(SExpr::as_str_literal) {
                self.export_names.insert(name.to_string());
            }
        }
    }

    fn parse_global(&self, item: &SExpr) -> GlobalDef {
        let items = item.items();
        let symbol = match items.get(1).and_then(SExpr::as_atom) {
            Some(s) if s.starts_with('$') => s.to_string(),
            _ => self.globals.len().to_string(),
        };
        let mut ty = String::new();
        let mut mutable = false;
        for i in &items[1..] {
            match i {
                SExpr::Atom(a) if !a.starts_with('$') => {
                    ty = a.clone();
                    break;
                }
                SExpr::List(inner) if i.head() == Some("mut") => {
                    mutable = true;
                    ty = inner.get(1).map(ToString::to_string).unwrap_or_default();
                    break;
                }
                _ => {}
            }
        }
        GlobalDef {
            symbol,
            ty,
            mutable,
            import: None,
        }
    }

    /// Build a function from a `func` field or an `import` field holding
    /// one. `index` names functions that carry no symbol.
    pub(crate) fn build_function(&mut self, item: &SExpr, index: usize) -> ModuleResult<Function> {
        let (func, mut import) = if item.head() == Some("import") {
            let module = item.items().get(1).and_then(SExpr::as_str_literal);
            let field = item.items().get(2).and_then(SExpr::as_str_literal);
            let func = item
                .items()
                .get(3)
                .ok_or_else(|| ModuleError::Malformed(format!("import without descriptor: {item}")))?;
            let name = module.zip(field).map(|(m, f)| ImportName {
                module: m.to_string(),
                field: f.to_string(),
            });
            (func, name)
        } else {
            (item, None)
        };

        let items = func.items();
        let symbol = match items.get(1).and_then(SExpr::as_atom) {
            Some(s) if s.starts_with('$') => s.to_string(),
            _ => index.to_string(),
        };

        let mut exports = Vec::new();
        let mut params = Vec::new();
        let mut result = None;
        let mut locals = Vec::new();
        let mut type_ref = None;
        let mut saw_signature = false;
        for part in &items[1..] {
            match part.head() {
                Some("export") => {
                    if let Some(name) = part.items().get(1).and_then(SExpr::as_str_literal) {
                        self.export_names.insert(name.to_string());
                        exports.push(name.to_string());
                    }
                }
                Some("import") => {
                    let module = part.items().get(1).and_then(SExpr::as_str_literal);
                    let field = part.items().get(2).and_then(SExpr::as_str_literal);
                    import = module.zip(field).map(|(m, f)| ImportName {
                        module: m.to_string(),
                        field: f.to_string(),
                    });
                }
                Some("type") => type_ref = part.items().get(1).map(ToString::to_string),
                Some("param") => {
                    saw_signature = true;
                    push_variables(&mut params, part, 0);
                }
                Some("result") => {
                    saw_signature = true;
                    result = part.items().get(1).map(ToString::to_string);
                }
                Some("local") => {
                    let base = params.len();
                    push_variables(&mut locals, part, base);
                }
                _ => {}
            }
        }
        if !saw_signature {
            if let Some(def) = type_ref.as_deref().and_then(|r| self.type_def(r)) {
                params = def
                    .params
                    .iter()
                    .enumerate()
                    .map(|(i, ty)| Variable::new(i.to_string(), ty.clone()))
                    .collect();
                result = def.result.clone();
            }
        }

        let (tree, root) = Tree::from_sexpr(item);
        let func_node = if import.is_some() && item.head() == Some("import") {
            tree.children(root).get(3).copied().unwrap_or(root)
        } else {
            root
        };
        Ok(Function {
            symbol,
            import,
            exports,
            params,
            result,
            body: Mutex::new(FunctionBody {
                tree,
                root,
                func: func_node,
                locals,
                aliases: BTreeMap::new(),
            }),
        })
    }

    pub(crate) fn push_function(&mut self, function: Function) -> usize {
        let pos = self.functions.len();
        self.functions.push(function);
        self.fields.push(Field::Function(pos));
        pos
    }

    /// Rebuild the index order and the symbol table from the fields.
    pub(crate) fn reindex(&mut self) {
        let in_fields: Vec<usize> = self
            .fields
            .iter()
            .filter_map(|f| match f {
                Field::Function(i) => Some(*i),
                Field::Other(_) => None,
            })
            .collect();
        let (imports, defined): (Vec<usize>, Vec<usize>) = in_fields
            .into_iter()
            .partition(|i| self.functions[*i].is_imported());
        self.order = imports.into_iter().chain(defined).collect();
        self.by_symbol = self
            .order
            .iter()
            .map(|i| (self.functions[*i].symbol.clone(), *i))
            .collect();
    }

    fn type_def(&self, reference: &str) -> Option<&TypeDef> {
        if reference.starts_with('$') {
            return self
                .types
                .iter()
                .find(|t| t.symbol.as_deref() == Some(reference));
        }
        reference.parse::<usize>().ok().and_then(|i| self.types.get(i))
    }

    /// Position in `functions` of a `$symbol`, a function index or a
    /// `%name%` keyword naming a user alias.
    pub(crate) fn resolve_position(&self, reference: &str) -> Option<usize> {
        if let Some(pos) = self.by_symbol.get(reference) {
            return Some(*pos);
        }
        if let Ok(index) = reference.parse::<usize>() {
            return self.order.get(index).copied();
        }
        let name = reference.strip_prefix('%')?.strip_suffix('%')?;
        let symbol = self.alias_key(name)?;
        self.by_symbol.get(&symbol).copied()
    }

    // ── Lookups ─────────────────────────────────────────────────────────

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Functions in index order: imports first.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.order.iter().map(|i| &self.functions[*i])
    }

    pub fn function(&self, symbol: &str) -> Option<&Function> {
        self.by_symbol.get(symbol).map(|i| &self.functions[*i])
    }

    /// Function named by a symbol, an index or a `%alias%` keyword.
    pub fn resolve_function(&self, reference: &str) -> Option<&Function> {
        self.resolve_position(reference).map(|i| &self.functions[i])
    }

    pub fn function_index(&self, symbol: &str) -> Option<u32> {
        let pos = *self.by_symbol.get(symbol)?;
        self.order.iter().position(|i| *i == pos).map(|i| i as u32)
    }

    pub fn function_count(&self) -> usize {
        self.order.len()
    }

    pub fn start_function(&self) -> Option<&str> {
        self.start.as_deref()
    }

    pub fn types(&self) -> &[TypeDef] {
        &self.types
    }

    pub fn globals(&self) -> &[GlobalDef] {
        &self.globals
    }

    pub fn global_type(&self, symbol: &str) -> Option<&str> {
        self.globals
            .iter()
            .find(|g| g.symbol == symbol)
            .map(|g| g.ty.as_str())
    }

    pub fn has_imports(&self) -> bool {
        self.functions().any(Function::is_imported) || self.globals.iter().any(|g| g.import.is_some())
    }

    /// Snapshot of a function for search predicates.
    pub fn function_info(&self, symbol: &str) -> Option<FunctionInfo> {
        let f = self.function(symbol)?;
        let body = f.lock();
        Some(FunctionInfo {
            symbol: f.symbol.clone(),
            index: self.function_index(symbol).unwrap_or_default(),
            name: f.visible_name(),
            params: f.params.clone(),
            locals: body.locals.clone(),
            result: f.result.clone(),
            code: body.body_text(),
            imported: f.is_imported(),
            exported: f.is_exported(),
            start: self.start.as_deref() == Some(symbol),
        })
    }

    // ── Aliases ─────────────────────────────────────────────────────────

    /// Register `name` as the user name of the function `symbol`.
    pub fn set_function_alias(&mut self, symbol: impl Into<String>, name: impl Into<String>) {
        let symbol = symbol.into();
        let name = name.into();
        self.function_aliases.retain(|k, v| *k != symbol && *v != name);
        self.function_aliases.insert(symbol, name);
    }

    /// Register `name` as the user name of the global `symbol`.
    pub fn set_global_alias(&mut self, symbol: impl Into<String>, name: impl Into<String>) {
        let symbol = symbol.into();
        let name = name.into();
        self.global_aliases.retain(|k, v| *k != symbol && *v != name);
        self.global_aliases.insert(symbol, name);
    }

    pub fn function_aliases(&self) -> &BTreeMap<String, String> {
        &self.function_aliases
    }

    /// User name of a global or function symbol.
    pub fn alias_value(&self, symbol: &str) -> Option<&str> {
        self.global_aliases
            .get(symbol)
            .or_else(|| self.function_aliases.get(symbol))
            .map(String::as_str)
    }

    /// Symbol registered under a global or function user name.
    pub fn alias_key(&self, name: &str) -> Option<String> {
        self.global_aliases
            .iter()
            .chain(&self.function_aliases)
            .find(|(_, v)| *v == name)
            .map(|(k, _)| k.clone())
    }

    /// Function index of every symbol and function alias.
    pub fn order_map(&self) -> BTreeMap<String, u32> {
        let mut map: BTreeMap<String, u32> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, pos)| (self.functions[*pos].symbol.clone(), i as u32))
            .collect();
        for (symbol, alias) in &self.function_aliases {
            if let Some(index) = self.function_index(symbol) {
                map.insert(alias.clone(), index);
            }
        }
        map
    }

    // ── Printing ────────────────────────────────────────────────────────

    fn field_exprs(&self) -> Vec<SExpr> {
        self.fields
            .iter()
            .map(|f| match f {
                Field::Function(i) => {
                    let body = self.functions[*i].lock();
                    body.tree.to_sexpr(body.root)
                }
                Field::Other(e) => e.clone(),
            })
            .collect()
    }

    fn module_head(&self) -> String {
        match &self.name {
            Some(n) => format!("(module {n}"),
            None => "(module".to_string(),
        }
    }

    /// Compact module text.
    pub fn to_text(&self) -> String {
        let mut out = self.module_head();
        for field in self.field_exprs() {
            out.push(' ');
            out.push_str(&field.to_string());
        }
        out.push(')');
        out
    }

    /// One field per line, one body instruction per line.
    pub fn to_pretty(&self) -> String {
        let mut out = self.module_head();
        for field in &self.fields {
            out.push_str("\n  ");
            match field {
                Field::Function(i) => out.push_str(&pretty_function(&self.functions[*i].lock())),
                Field::Other(e) => out.push_str(&e.to_string()),
            }
        }
        out.push_str(")\n");
        out
    }
}

fn pretty_function(body: &FunctionBody) -> String {
    if body.root != body.func {
        return body.tree.text(body.root);
    }
    let tree = &body.tree;
    let children = tree.children(body.func);
    let header = instr::header_len(tree, body.func);
    let mut out = format!("({}", tree.text_of(&children[..header]));
    let nodes = &children[header..];
    for unit in instr::units(tree, nodes) {
        out.push_str("\n    ");
        out.push_str(&tree.text_of(&nodes[unit]));
    }
    out.push(')');
    out
}

fn is_func_import(e: &SExpr) -> bool {
    e.head() == Some("import") && e.items().get(3).and_then(SExpr::head) == Some("func")
        || e.head() == Some("func") && e.items().iter().any(|i| i.head() == Some("import"))
}

fn parse_type(item: &SExpr) -> TypeDef {
    let items = item.items();
    let symbol = items
        .get(1)
        .and_then(SExpr::as_atom)
        .filter(|s| s.starts_with('$'))
        .map(str::to_string);
    let func = items.iter().find(|i| i.head() == Some("func"));
    let mut params = Vec::new();
    let mut result = None;
    for part in func.map(SExpr::items).unwrap_or_default() {
        match part.head() {
            Some("param") => params.extend(
                part.items()[1..]
                    .iter()
                    .filter_map(SExpr::as_atom)
                    .filter(|a| !a.starts_with('$'))
                    .map(str::to_string),
            ),
            Some("result") => result = part.items().get(1).map(ToString::to_string),
            _ => {}
        }
    }
    TypeDef {
        symbol,
        params,
        result,
    }
}

/// Read `(param $a i32)` or `(param i32 i64)` into `out`. Unnamed entries
/// get their wasm local index, which starts at `base + out.len()`.
fn push_variables(out: &mut Vec<Variable>, part: &SExpr, base: usize) {
    let rest = &part.items()[1..];
    match rest.first().and_then(SExpr::as_atom) {
        Some(name) if name.starts_with('$') => {
            let ty = rest.get(1).map(ToString::to_string).unwrap_or_default();
            out.push(Variable::new(name, ty));
        }
        _ => {
            for ty in rest {
                let symbol = (base + out.len()).to_string();
                out.push(Variable::new(symbol, ty.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULE: &str = r#"
(module $m
  (type $t0 (func (param i32) (result i32)))
  (import "env" "log" (func $log (param i32)))
  (func $id (export "id") (type $t0) local.get 0)
  (func (param $x i32) (local i64)
    (call $log (local.get $x)))
  (global $g (mut i32) (i32.const 0))
  (export "second" (func 2)))
"#;

    fn module() -> ModuleContext {
        ModuleContext::parse(MODULE).unwrap()
    }

    #[test]
    fn test_functions_in_index_order() {
        let m = module();
        let symbols: Vec<&str> = m.functions().map(Function::symbol).collect();
        assert_eq!(symbols, vec!["$log", "$id", "2"]);
        assert_eq!(m.function_index("$id"), Some(1));
    }

    #[test]
    fn test_signatures_and_names() {
        let m = module();
        let id = m.function("$id").unwrap();
        assert_eq!(id.params(), &[Variable::new("0", "i32")]);
        assert_eq!(id.result(), Some("i32"));
        assert_eq!(id.visible_name(), "id");
        assert_eq!(m.function("$log").unwrap().visible_name(), "env.log");
        let second = m.function("2").unwrap();
        assert_eq!(second.visible_name(), "second");
        assert_eq!(second.locals(), vec![Variable::new("1", "i64")]);
    }

    #[test]
    fn test_globals_and_types() {
        let m = module();
        assert_eq!(m.global_type("$g"), Some("i32"));
        assert!(m.globals()[0].mutable);
        assert_eq!(m.types()[0].symbol.as_deref(), Some("$t0"));
        assert!(m.has_imports());
    }

    #[test]
    fn test_print_parse_round_trip() {
        let m = module();
        let text = m.to_text();
        let again = ModuleContext::parse(&text).unwrap();
        assert_eq!(again.to_text(), text);
        let pretty = ModuleContext::parse(&m.to_pretty()).unwrap();
        assert_eq!(pretty.to_text(), text);
    }

    #[test]
    fn test_pretty_puts_instructions_on_lines() {
        let m = ModuleContext::parse("(module (func $f local.get 0 drop))").unwrap();
        assert_eq!(m.to_pretty(), "(module\n  (func $f\n    local.get 0\n    drop))\n");
    }

    #[test]
    fn test_order_map_includes_aliases() {
        let mut m = module();
        m.set_function_alias("$id", "identity");
        let map = m.order_map();
        assert_eq!(map.get("$log"), Some(&0));
        assert_eq!(map.get("identity"), Some(&1));
        assert_eq!(m.alias_key("identity").as_deref(), Some("$id"));
    }

    #[test]
    fn test_resolve_keyword_reference() {
        let mut m = module();
        m.set_function_alias("$log", "log");
        assert_eq!(m.resolve_function("%log%").map(Function::symbol), Some("$log"));
        assert_eq!(m.resolve_function("1").map(Function::symbol), Some("$id"));
    }

    #[test]
    fn test_stray_atom_is_malformed() {
        assert!(matches!(
            ModuleContext::parse("(module func)"),
            Err(ModuleError::Malformed(_))
        ));
    }
}
