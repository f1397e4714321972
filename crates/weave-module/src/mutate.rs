//! Module-level mutations: new types, globals, functions, imports,
//! exports, locals and the start function.
//!
//! Generated entities are named `$wmr_gN`, `$wmr_fN`, `$wmr_tN` and
//! `$wmr_lN`; `N` starts at the size of the table and is bumped until the
//! symbol is unused.

use weave_types::ast::VariableDecl;
use weave_types::description::FunctionSpec;
use weave_types::WasmType;

use crate::error::{ModuleError, ModuleResult};
use crate::function::Variable;
use crate::instr;
use crate::module::{Field, GlobalDef, ModuleContext, TypeDef};
use crate::sexpr::{self, SExpr};
use crate::transform::RuntimeTransform;

/// Canonical field order of a module.
fn rank_of(head: Option<&str>) -> u8 {
    match head {
        Some("type") => 0,
        Some("import") => 1,
        Some("func") => 2,
        Some("table") => 3,
        Some("memory") => 4,
        Some("global") => 5,
        Some("export") => 6,
        Some("start") => 7,
        Some("elem") => 8,
        Some("data") => 9,
        _ => 10,
    }
}

pub(crate) fn fresh(prefix: &str, mut n: usize, taken: impl Fn(&str) -> bool) -> String {
    loop {
        let symbol = format!("$wmr_{prefix}{n}");
        if !taken(&symbol) {
            return symbol;
        }
        n += 1;
    }
}

pub(crate) fn signature_text(params: &[String], result: Option<&str>) -> String {
    let mut out = String::new();
    if !params.is_empty() {
        out.push_str(&format!(" (param {})", params.join(" ")));
    }
    if let Some(r) = result {
        out.push_str(&format!(" (result {r})"));
    }
    out
}

fn check_type(ty: &str, fail: impl Fn(String) -> ModuleError) -> ModuleResult<String> {
    ty.trim()
        .parse::<WasmType>()
        .map(|t| t.as_str().to_string())
        .map_err(|()| fail(format!("unknown value type `{ty}`")))
}

pub(crate) fn parse_one(text: &str, fail: impl Fn(String) -> ModuleError) -> ModuleResult<SExpr> {
    let mut exprs = sexpr::parse(text).map_err(|e| fail(e.to_string()))?;
    match exprs.len() {
        1 => Ok(exprs.remove(0)),
        _ => Err(fail(format!("expected one field, found `{text}`"))),
    }
}

impl ModuleContext {
    fn field_rank(&self, field: &Field) -> u8 {
        match field {
            Field::Function(i) if self.functions[*i].is_imported() => 1,
            Field::Function(_) => 2,
            Field::Other(e) => rank_of(e.head()),
        }
    }

    /// Insert after the last field of the same or a lower rank.
    pub(crate) fn insert_field(&mut self, field: Field) {
        let rank = self.field_rank(&field);
        let at = self
            .fields
            .iter()
            .rposition(|f| self.field_rank(f) <= rank)
            .map_or(0, |i| i + 1);
        self.fields.insert(at, field);
        self.reindex();
    }

    /// Reference to a function type with this signature, creating
    /// `$wmr_tN` when the module has none.
    pub fn add_type(&mut self, params: &[String], result: Option<&str>) -> ModuleResult<String> {
        if let Some((i, def)) = self
            .types
            .iter()
            .enumerate()
            .find(|(_, t)| t.matches(params, result))
        {
            return Ok(def.symbol.clone().unwrap_or_else(|| i.to_string()));
        }
        let symbol = fresh("t", self.types.len(), |s| {
            self.types.iter().any(|t| t.symbol.as_deref() == Some(s))
        });
        let text = format!("(type {symbol} (func{}))", signature_text(params, result));
        let expr = parse_one(&text, ModuleError::AddType)?;
        self.types.push(TypeDef {
            symbol: Some(symbol.clone()),
            params: params.to_vec(),
            result: result.map(str::to_string),
        });
        self.insert_field(Field::Other(expr));
        Ok(symbol)
    }

    /// Add a mutable global initialised from `decl`.
    /// Composite types are held by the host runtime instead, see
    /// [`ModuleContext::composite_global_code`].
    pub fn add_global(&mut self, decl: &VariableDecl) -> ModuleResult<String> {
        let ty = decl.ty.wasm().ok_or_else(|| {
            ModuleError::AddGlobal(format!("{} global has no WebAssembly type", decl.ty))
        })?;
        let value = decl.init_or_zero();
        if value.starts_with('"') {
            return Err(ModuleError::AddGlobal(format!(
                "{ty} global cannot hold the string {value}"
            )));
        }
        let symbol = fresh("g", self.globals.len(), |s| self.globals.iter().any(|g| g.symbol == s));
        let text = format!("(global {symbol} (mut {ty}) {init})", init = ty.const_instr(value));
        let expr = parse_one(&text, ModuleError::AddGlobal)?;
        self.globals.push(GlobalDef {
            symbol: symbol.clone(),
            ty: ty.to_string(),
            mutable: true,
            import: None,
        });
        self.insert_field(Field::Other(expr));
        log::debug!("added global {symbol}: {ty}");
        Ok(symbol)
    }

    fn spec_signature(
        spec: &FunctionSpec,
        fail: impl Fn(String) -> ModuleError + Copy,
    ) -> ModuleResult<(Vec<String>, Option<String>)> {
        let params = spec
            .args
            .iter()
            .map(|a| check_type(&a.ty, fail))
            .collect::<ModuleResult<Vec<_>>>()?;
        let result = match spec.result.as_deref().map(str::trim) {
            None | Some("") | Some("void") => None,
            Some(r) => Some(check_type(r, fail)?),
        };
        Ok((params, result))
    }

    fn fresh_function_symbol(&self) -> String {
        fresh("f", self.functions.len(), |s| self.by_symbol.contains_key(s))
    }

    /// Add a function from a context description. Imported specs become
    /// imports; an export name adds an export.
    pub fn add_function(&mut self, spec: &FunctionSpec) -> ModuleResult<String> {
        if spec.imported.is_some() {
            return self.add_import_function(spec);
        }
        let (params, result) = Self::spec_signature(spec, ModuleError::AddFunction)?;
        let type_ref = self.add_type(&params, result.as_deref())?;
        let symbol = self.fresh_function_symbol();
        let code = spec.code.trim();
        let text = format!(
            "(func {symbol} (type {type_ref}){}{}{code})",
            signature_text(&params, result.as_deref()),
            if code.is_empty() { "" } else { " " }
        );
        let expr = parse_one(&text, ModuleError::AddFunction)?;
        let function = self.build_function(&expr, 0)?;
        let pos = self.functions.len();
        self.functions.push(function);
        self.insert_field(Field::Function(pos));
        if let Some(name) = &spec.exported {
            self.add_export(&symbol, name)?;
        }
        log::debug!("added function {symbol}");
        Ok(symbol)
    }

    /// Add an imported function. Its import field is hoisted ahead of the
    /// function definitions before the module is printed.
    pub fn add_import_function(&mut self, spec: &FunctionSpec) -> ModuleResult<String> {
        let import = spec
            .imported
            .as_ref()
            .ok_or_else(|| ModuleError::AddImport("function has no import name".into()))?;
        let duplicate = self.functions().any(|f| {
            f.import()
                .is_some_and(|i| i.module == import.module && i.field == import.field)
        });
        if duplicate {
            return Err(ModuleError::AddImport(format!(
                "\"{}\" \"{}\" is already imported",
                import.module, import.field
            )));
        }
        let (params, result) = Self::spec_signature(spec, ModuleError::AddImport)?;
        let type_ref = self.add_type(&params, result.as_deref())?;
        let symbol = self.fresh_function_symbol();
        let text = format!(
            "(import \"{}\" \"{}\" (func {symbol} (type {type_ref}){}))",
            import.module,
            import.field,
            signature_text(&params, result.as_deref())
        );
        let expr = parse_one(&text, ModuleError::AddImport)?;
        let function = self.build_function(&expr, 0)?;
        let pos = self.functions.len();
        self.functions.push(function);
        self.insert_field(Field::Function(pos));
        self.queue_transform(RuntimeTransform::HoistImports);
        if let Some(name) = &spec.exported {
            self.add_export(&symbol, name)?;
        }
        log::debug!("imported {}.{} as {symbol}", import.module, import.field);
        Ok(symbol)
    }

    /// Export the function `symbol` under `name`.
    pub fn add_export(&mut self, symbol: &str, name: &str) -> ModuleResult<()> {
        if self.export_names.contains(name) {
            return Err(ModuleError::AddExport(format!("duplicate export name \"{name}\"")));
        }
        let pos = *self
            .by_symbol
            .get(symbol)
            .ok_or_else(|| ModuleError::UnknownFunction(symbol.to_string()))?;
        let expr = parse_one(&format!("(export \"{name}\" (func {symbol}))"), ModuleError::AddExport)?;
        self.export_names.insert(name.to_string());
        self.functions[pos].exports.push(name.to_string());
        self.insert_field(Field::Other(expr));
        Ok(())
    }

    /// Add a local to `function`. A non-zero initializer is stored by a
    /// `local.set` at the start of the body.
    pub fn add_local(&self, function: &str, decl: &VariableDecl) -> ModuleResult<String> {
        let fail = |message: String| ModuleError::AddLocal {
            function: function.to_string(),
            message,
        };
        let f = self
            .function(function)
            .ok_or_else(|| ModuleError::UnknownFunction(function.to_string()))?;
        if f.is_imported() {
            return Err(fail("imported functions have no locals".into()));
        }
        let Some(wasm) = decl.ty.wasm() else {
            return Err(fail(format!("{} locals are not supported", decl.ty)));
        };
        if decl.value.as_deref().is_some_and(|v| v.starts_with('"')) {
            return Err(fail(format!("{wasm} local cannot hold a string")));
        }

        let mut body = f.lock();
        let symbol = fresh("l", body.locals.len(), |s| body.has_variable(&f.params, s));
        let ty = wasm.as_str();
        let local = parse_one(&format!("(local {symbol} {ty})"), fail)?;
        let init = match &decl.value {
            Some(v) => Some(parse_one(
                &format!("(local.set {symbol} {})", wasm.const_instr(v)),
                fail,
            )?),
            None => None,
        };

        let func = body.func;
        let header = instr::header_len(&body.tree, func);
        let local = body.tree.graft(&local);
        body.tree.insert_children(func, header, &[local]);
        if let Some(init) = init {
            let init = body.tree.graft(&init);
            body.tree.insert_children(func, header + 1, &[init]);
        }
        body.locals.push(Variable::new(symbol.clone(), ty));
        Ok(symbol)
    }

    /// The start function, creating an empty one when the module has none.
    /// A created start function that is still empty when the runtime
    /// transforms run is removed again.
    pub fn add_start_function(&mut self) -> ModuleResult<String> {
        if let Some(start) = &self.start {
            return Ok(start.clone());
        }
        let symbol = self.add_function(&FunctionSpec::default())?;
        self.insert_field(Field::Other(SExpr::list([
            SExpr::atom("start"),
            SExpr::atom(symbol.clone()),
        ])));
        self.start = Some(symbol.clone());
        self.synthesized_start = Some(symbol.clone());
        self.queue_transform(RuntimeTransform::DropEmptyStart);
        Ok(symbol)
    }

    /// Insert instructions at the start of a function body, after its
    /// locals.
    pub fn prepend_code(&self, function: &str, code: &str) -> ModuleResult<()> {
        let fail = |message: String| ModuleError::Apply {
            function: function.to_string(),
            message,
        };
        let f = self
            .function(function)
            .ok_or_else(|| ModuleError::UnknownFunction(function.to_string()))?;
        if f.is_imported() {
            return Err(fail("imported functions have no body".into()));
        }
        let exprs = sexpr::parse(code).map_err(|e| fail(e.to_string()))?;
        let mut body = f.lock();
        let func = body.func;
        let header = instr::header_len(&body.tree, func);
        let ids: Vec<_> = exprs.iter().map(|e| body.tree.graft(e)).collect();
        body.tree.insert_children(func, header, &ids);
        Ok(())
    }

    /// Append instructions to the end of a function body.
    pub fn append_code(&self, function: &str, code: &str) -> ModuleResult<()> {
        let fail = |message: String| ModuleError::Apply {
            function: function.to_string(),
            message,
        };
        let f = self
            .function(function)
            .ok_or_else(|| ModuleError::UnknownFunction(function.to_string()))?;
        if f.is_imported() {
            return Err(fail("imported functions have no body".into()));
        }
        let exprs = sexpr::parse(code).map_err(|e| fail(e.to_string()))?;
        let mut body = f.lock();
        let func = body.func;
        for expr in &exprs {
            let id = body.tree.graft(expr);
            body.tree.push_child(func, id);
        }
        Ok(())
    }
}
