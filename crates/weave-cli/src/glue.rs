//! JavaScript glue for a woven module.
//!
//! The glue is an ES module exporting `imports`, one logging stub per
//! imported function, and `instantiate(bytes)`. Imports of the host
//! runtime families get a working implementation backed by `runtime`.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::Serialize;
use weave_module::{ModuleContext, RuntimeImport};

/// Decoding helpers and state shared by the runtime imports.
const RUNTIME_PRELUDE: &str = r#"const decoder = new TextDecoder();

function unpack(words) {
  const view = new DataView(new ArrayBuffer(words.length * 4));
  words.forEach((word, i) => view.setInt32(i * 4, word));
  const bytes = new Uint8Array(view.buffer);
  const end = bytes.indexOf(0);
  return decoder.decode(end < 0 ? bytes : bytes.subarray(0, end));
}

export const runtime = { globals: new Map(), zones: [new Map()], error: [] };
const pending = { code: 0, name: [], key: [], value: [] };

function pendingEntry() {
  const value = pending.value.length > 0 ? JSON.parse(unpack(pending.value)) : null;
  return [unpack(pending.name), { code: pending.code, value }];
}
"#;

/// Runtime import bodies; any other runtime field logs its call.
fn runtime_body(family: RuntimeImport, field: &str) -> Option<&'static str> {
    let body = match (family, field) {
        (RuntimeImport::Zone, "new") => {
            "(code) => { Object.assign(pending, { code, name: [], key: [], value: [] }); }"
        }
        (RuntimeImport::Zone, "write_name") => "(word) => { pending.name.push(word); }",
        (RuntimeImport::Zone, "write_key") => "(word) => { pending.key.push(word); }",
        (RuntimeImport::Zone, "write_value") => "(word) => { pending.value.push(word); }",
        (RuntimeImport::Zone, "set_global") => "() => { runtime.globals.set(...pendingEntry()); }",
        (RuntimeImport::Zone, "set") => "() => { runtime.zones[runtime.zones.length - 1].set(...pendingEntry()); }",
        (RuntimeImport::Zone, "push") => "() => { runtime.zones.push(new Map()); }",
        (RuntimeImport::Zone, "pop") => "() => { runtime.zones.pop(); }",
        (RuntimeImport::Error, "new") => "() => { runtime.error = []; }",
        (RuntimeImport::Error, "set") => "(word) => { runtime.error.push(word); }",
        (RuntimeImport::Error, "print") => "() => { console.error(unpack(runtime.error)); }",
        _ => return None,
    };
    Some(body)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportDescriptor {
    pub module: String,
    pub field: String,
}

/// A module function as the glue sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionDescriptor {
    pub symbol: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import: Option<ImportDescriptor>,
    pub exports: Vec<String>,
    pub params: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Descriptors of every function, in index order.
pub fn descriptors(module: &ModuleContext) -> Vec<FunctionDescriptor> {
    module
        .functions()
        .map(|f| FunctionDescriptor {
            symbol: f.symbol().to_string(),
            name: f.visible_name(),
            import: f.import().map(|i| ImportDescriptor {
                module: i.module.clone(),
                field: i.field.clone(),
            }),
            exports: f.exports().to_vec(),
            params: f.params().iter().map(|p| p.ty.clone()).collect(),
            result: f.result().map(str::to_string),
        })
        .collect()
}

/// The glue is written when asked for, or when the module imports
/// anything the host has to provide.
pub fn needed(module: &ModuleContext, print_js: bool) -> bool {
    print_js || module.has_imports()
}

fn quoted(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

pub fn render(functions: &[FunctionDescriptor]) -> String {
    let mut imports: BTreeMap<&str, Vec<&FunctionDescriptor>> = BTreeMap::new();
    for f in functions {
        if let Some(import) = &f.import {
            imports.entry(import.module.as_str()).or_default().push(f);
        }
    }

    let mut out = String::from("// Generated by wasm-weaver.\n\n");
    let table = serde_json::to_string_pretty(functions).unwrap_or_else(|_| "[]".to_string());
    let _ = writeln!(out, "export const functions = {table};\n");
    if imports.keys().any(|m| RuntimeImport::from_module(m).is_some()) {
        out.push_str(RUNTIME_PRELUDE);
        out.push('\n');
    }

    out.push_str("export const imports = {\n");
    for (module, fields) in &imports {
        let family = RuntimeImport::from_module(module);
        let _ = writeln!(out, "  {}: {{", quoted(module));
        for f in fields {
            let Some(import) = &f.import else { continue };
            let body = match family.and_then(|r| runtime_body(r, &import.field)) {
                Some(body) => body.to_string(),
                None => {
                    let label = quoted(&format!("{}.{}", import.module, import.field));
                    format!("(...args) => {{ console.log({label}, ...args); }}")
                }
            };
            let _ = writeln!(out, "    {}: {body},", quoted(&import.field));
        }
        out.push_str("  },\n");
    }
    out.push_str("};\n\n");

    out.push_str(
        "export async function instantiate(bytes) {\n  \
         const { instance } = await WebAssembly.instantiate(bytes, imports);\n  \
         return instance.exports;\n}\n",
    );
    out
}
