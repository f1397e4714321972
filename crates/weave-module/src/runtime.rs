//! Imports of the host runtime that holds composite variables.
//!
//! Strings, maps and arrays have no WebAssembly representation. Their
//! values live in the host, and the module talks to it through five import
//! families. Text crosses the boundary as big-endian `i32` words (see
//! [`pack_words`]).
//!
//! A composite global is created at start-up by:
//!
//! ```text
//! (call $zone.new (i32.const <type code>))
//! (call $zone.write_name (i32.const <word>))    ;; one per name word
//! (call $zone.write_value (i32.const <word>))   ;; one per JSON value word
//! (call $zone.set_global)
//! ```

use weave_types::ast::VariableDecl;
use weave_types::WasmType::{self, F32, F64, I32};

use crate::error::{ModuleError, ModuleResult};
use crate::module::{Field, ModuleContext};
use crate::mutate::{fresh, parse_one, signature_text};
use crate::transform::RuntimeTransform;

/// One family of host runtime imports; the import module name is
/// [`RuntimeImport::module`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuntimeImport {
    Operations,
    Args,
    Zone,
    Returns,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeFunction {
    pub field: &'static str,
    pub params: &'static [WasmType],
    pub result: Option<WasmType>,
}

const fn func(field: &'static str, params: &'static [WasmType], result: Option<WasmType>) -> RuntimeFunction {
    RuntimeFunction { field, params, result }
}

const OPERATIONS: &[RuntimeFunction] = &[
    func("clear", &[], None),
    func("new_code", &[I32], None),
    func("write", &[I32], None),
    func("write_f32", &[F32], None),
    func("write_f64", &[F64], None),
    func("read", &[I32], Some(I32)),
    func("read_f32", &[I32], Some(F32)),
    func("read_f64", &[I32], Some(F64)),
    func("evaluate", &[], Some(I32)),
];

const ARGS: &[RuntimeFunction] = &[
    func("push", &[], None),
    func("pop", &[], None),
    func("new", &[I32], None),
    func("write", &[I32], None),
    func("write_f32", &[F32], None),
    func("write_f64", &[F64], None),
    func("new_copy", &[], None),
    func("copy_index", &[I32], None),
    func("copy_operation", &[I32], None),
];

const ZONE: &[RuntimeFunction] = &[
    func("push", &[], None),
    func("pop", &[], None),
    func("new", &[I32], None),
    func("write_name", &[I32], None),
    func("write_key", &[I32], None),
    func("write_value", &[I32], None),
    func("write_value_f32", &[F32], None),
    func("write_value_f64", &[F64], None),
    func("new_copy", &[], None),
    func("copy_name", &[I32], None),
    func("copy_key", &[I32], None),
    func("copy_arg", &[I32], None),
    func("copy_operation", &[I32], None),
    func("copy_operation_global", &[I32], None),
    func("set", &[], None),
    func("set_global", &[], None),
];

const RETURNS: &[RuntimeFunction] = &[
    func("new_copy", &[], None),
    func("copy_name", &[I32], None),
    func("copy_key", &[I32], None),
    func("copy_var", &[], None),
    func("copy_operation", &[I32], None),
];

const ERROR: &[RuntimeFunction] = &[
    func("new", &[], None),
    func("set", &[I32], None),
    func("print", &[], None),
];

impl RuntimeImport {
    pub const ALL: [RuntimeImport; 5] = [Self::Operations, Self::Args, Self::Zone, Self::Returns, Self::Error];

    pub fn module(self) -> &'static str {
        match self {
            Self::Operations => "operations",
            Self::Args => "args",
            Self::Zone => "zone",
            Self::Returns => "returns",
            Self::Error => "error",
        }
    }

    pub fn from_module(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.module() == name)
    }

    pub fn functions(self) -> &'static [RuntimeFunction] {
        match self {
            Self::Operations => OPERATIONS,
            Self::Args => ARGS,
            Self::Zone => ZONE,
            Self::Returns => RETURNS,
            Self::Error => ERROR,
        }
    }

    /// Symbol of an import of this family, e.g. `$zone.set_global`.
    pub fn symbol(self, field: &str) -> String {
        format!("${}.{field}", self.module())
    }
}

/// Pack text into big-endian `i32` words, zero-padded to a whole word.
pub fn pack_words(text: &str) -> Vec<i32> {
    text.as_bytes()
        .chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            i32::from_be_bytes(word)
        })
        .collect()
}

fn write_words(out: &mut String, call: &str, text: &str) {
    for word in pack_words(text) {
        out.push_str(&format!("(call {call} (i32.const {word}))"));
    }
}

impl ModuleContext {
    /// Import every function of `family`, once. Functions the module
    /// already imports under the same module and field are kept.
    pub fn require_runtime(&mut self, family: RuntimeImport) -> ModuleResult<()> {
        if !self.runtime.insert(family) {
            return Ok(());
        }
        for def in family.functions() {
            let present = self.functions().any(|f| {
                f.import()
                    .is_some_and(|i| i.module == family.module() && i.field == def.field)
            });
            if present {
                continue;
            }
            let params: Vec<String> = def.params.iter().map(|t| t.to_string()).collect();
            let result = def.result.map(WasmType::as_str);
            let type_ref = self.add_type(&params, result)?;
            let mut symbol = family.symbol(def.field);
            if self.by_symbol.contains_key(&symbol) {
                symbol = fresh("f", self.functions.len(), |s| self.by_symbol.contains_key(s));
            }
            let text = format!(
                "(import \"{}\" \"{}\" (func {symbol} (type {type_ref}){}))",
                family.module(),
                def.field,
                signature_text(&params, result)
            );
            let expr = parse_one(&text, ModuleError::AddImport)?;
            let function = self.build_function(&expr, 0)?;
            let pos = self.functions.len();
            self.functions.push(function);
            self.insert_field(Field::Function(pos));
        }
        self.queue_transform(RuntimeTransform::HoistImports);
        log::debug!("imported the {} runtime", family.module());
        Ok(())
    }

    /// Runtime import families the module uses.
    pub fn runtime_imports(&self) -> impl Iterator<Item = RuntimeImport> + '_ {
        self.runtime.iter().copied()
    }

    /// Code creating the composite global `name` in the host runtime. The
    /// zone imports are added when missing.
    pub fn composite_global_code(&mut self, name: &str, decl: &VariableDecl) -> ModuleResult<String> {
        if decl.ty.is_primitive() {
            return Err(ModuleError::AddGlobal(format!(
                "{} is not a composite type",
                decl.ty
            )));
        }
        let code = decl
            .ty
            .code()
            .ok_or_else(|| ModuleError::AddGlobal(format!("{} has no runtime type code", decl.ty)))?;
        self.require_runtime(RuntimeImport::Zone)?;

        let zone = RuntimeImport::Zone;
        let mut out = format!("(call {} (i32.const {code}))", zone.symbol("new"));
        write_words(&mut out, &zone.symbol("write_name"), name);
        if let Some(value) = &decl.value {
            write_words(&mut out, &zone.symbol("write_value"), value);
        }
        out.push_str(&format!("(call {})", zone.symbol("set_global")));
        log::debug!("composite global '{name}': {}", decl.ty);
        Ok(out)
    }
}
