//! Module context tests: mutations, searches and application, checked
//! against the reference text assembler and validator.

use weave_keyword::KeywordMap;
use weave_module::{pack_words, JoinPointBlock, ModuleContext, ModuleError, RuntimeImport};
use weave_types::ast::VariableDecl;
use weave_types::description::{FunctionArg, FunctionSpec, ImportSpec};
use weave_types::WasmType;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

const MODULE: &str = r#"
(module
  (type $binary (func (param i32 i32) (result i32)))
  (import "env" "log" (func $log (param i32)))
  (memory 1)
  (func $add (export "add") (type $binary) (param $a i32) (param $b i32) (result i32)
    (i32.add (local.get $a) (local.get $b)))
  (func $main (export "main") (result i32)
    (local $r i32)
    (local.set $r (call $add (i32.const 2) (i32.const 3)))
    (call $log (local.get $r))
    local.get $r)
)
"#;

fn module() -> ModuleContext {
    ModuleContext::parse(MODULE).expect("sample module parses")
}

fn assert_valid(m: &ModuleContext) {
    let text = m.to_pretty();
    let bytes = wat::parse_str(&text).unwrap_or_else(|e| panic!("{e}\n{text}"));
    wasmparser::validate(&bytes).unwrap_or_else(|e| panic!("{e}\n{text}"));
}

fn decl(ty: WasmType, value: Option<&str>) -> VariableDecl {
    VariableDecl {
        ty: ty.into(),
        value: value.map(str::to_string),
    }
}

fn calls(m: &ModuleContext, symbol: &str) -> Vec<JoinPointBlock> {
    let block = m.function_block(symbol).unwrap();
    m.find_calls(&block, |_| Some(KeywordMap::new()))
}

// ─────────────────────────────────────────────────────────────────────
// Reading and printing
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_sample_module_is_valid() {
    assert_valid(&module());
}

#[test]
fn test_printing_is_stable() {
    let m = module();
    let again = ModuleContext::parse(&m.to_text()).unwrap();
    assert_eq!(again.to_text(), m.to_text());
    assert_eq!(again.to_pretty(), m.to_pretty());
}

#[test]
fn test_comments_are_dropped() {
    let m = ModuleContext::parse("(module ;; line\n (func $f (; block ;) nop))").unwrap();
    assert_eq!(m.to_text(), "(module (func $f nop))");
}

#[test]
fn test_function_info() {
    let m = module();
    let info = m.function_info("$main").unwrap();
    assert_eq!(info.index, 2);
    assert_eq!(info.name, "main");
    assert_eq!(info.result.as_deref(), Some("i32"));
    assert_eq!(info.locals.len(), 1);
    assert!(info.exported);
    assert!(!info.imported);
    let log = m.function_info("$log").unwrap();
    assert!(log.imported);
    assert_eq!(log.name, "env.log");
}

// ─────────────────────────────────────────────────────────────────────
// Mutations
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_added_entities_assemble() {
    let mut m = module();
    m.add_global(&decl(WasmType::I32, Some("5"))).unwrap();
    let spec = FunctionSpec {
        args: vec![FunctionArg {
            name: "v".into(),
            ty: "i32".into(),
        }],
        result: Some("i32".into()),
        code: "(i32.mul (local.get 0) (i32.const 2))".into(),
        exported: Some("double".into()),
        ..FunctionSpec::default()
    };
    m.add_function(&spec).unwrap();
    let import = FunctionSpec {
        args: vec![FunctionArg {
            name: "code".into(),
            ty: "i32".into(),
        }],
        imported: Some(ImportSpec {
            module: "env".into(),
            field: "trace".into(),
        }),
        ..FunctionSpec::default()
    };
    m.add_function(&import).unwrap();
    m.add_local("$main", &decl(WasmType::F64, Some("0.5"))).unwrap();
    m.apply_runtime_transforms();
    assert_valid(&m);
}

#[test]
fn test_import_after_definitions_is_hoisted() {
    let mut m = ModuleContext::parse("(module (func $f) (global $g i32 (i32.const 0)))").unwrap();
    let import = FunctionSpec {
        imported: Some(ImportSpec {
            module: "env".into(),
            field: "tick".into(),
        }),
        ..FunctionSpec::default()
    };
    m.add_function(&import).unwrap();
    m.apply_runtime_transforms();
    assert_valid(&m);
}

#[test]
fn test_duplicate_export_is_rejected() {
    let mut m = module();
    let err = m.add_export("$main", "add").unwrap_err();
    assert!(matches!(err, ModuleError::AddExport(_)));
}

#[test]
fn test_start_function_round_trip() {
    let mut m = module();
    let start = m.add_start_function().unwrap();
    m.append_code(&start, "(call $log (i32.const 0))").unwrap();
    m.apply_runtime_transforms();
    assert_eq!(m.start_function(), Some(start.as_str()));
    assert_valid(&m);
}

// ─────────────────────────────────────────────────────────────────────
// Host runtime
// ─────────────────────────────────────────────────────────────────────

/// Sorted fields imported from `module`.
fn imports_of(m: &ModuleContext, module: &str) -> Vec<String> {
    let mut fields: Vec<String> = m
        .functions()
        .filter_map(|f| f.import().filter(|i| i.module == module).map(|i| i.field.clone()))
        .collect();
    fields.sort();
    fields
}

#[test]
fn test_runtime_imports_are_added_once() {
    let mut m = module();
    m.require_runtime(RuntimeImport::Zone).unwrap();
    m.require_runtime(RuntimeImport::Zone).unwrap();
    m.require_runtime(RuntimeImport::Error).unwrap();

    let zone = imports_of(&m, "zone");
    assert_eq!(zone.len(), RuntimeImport::Zone.functions().len());
    assert!(zone.iter().any(|f| f == "set_global"));
    assert_eq!(imports_of(&m, "error"), vec!["new", "print", "set"]);
    assert!(imports_of(&m, "args").is_empty());
    assert_eq!(
        m.runtime_imports().collect::<Vec<_>>(),
        vec![RuntimeImport::Zone, RuntimeImport::Error]
    );
    assert!(m.function("$zone.write_value_f64").is_some());

    m.apply_runtime_transforms();
    assert_valid(&m);
}

#[test]
fn test_runtime_keeps_existing_import() {
    let mut m = ModuleContext::parse(
        r#"(module (import "error" "print" (func $report)) (func $f (call $report)))"#,
    )
    .unwrap();
    m.require_runtime(RuntimeImport::Error).unwrap();
    assert_eq!(imports_of(&m, "error"), vec!["new", "print", "set"]);
    assert!(m.function("$error.print").is_none());
    m.apply_runtime_transforms();
    assert_valid(&m);
}

#[test]
fn test_composite_global_initialised_in_start() {
    let mut m = module();
    let decl = VariableDecl {
        ty: "map[string]i32".parse().unwrap(),
        value: Some(r#"{"a":1}"#.to_string()),
    };
    let code = m.composite_global_code("hits", &decl).unwrap();
    let start = m.add_start_function().unwrap();
    m.prepend_code(&start, &code).unwrap();
    m.append_code(&start, "(call $log (i32.const 1))").unwrap();
    m.apply_runtime_transforms();
    assert_valid(&m);

    let text = m.to_text();
    let name = pack_words("hits")[0];
    // map_string (9) over i32 (2)
    assert!(text.contains("(call $zone.new (i32.const 146))"), "{text}");
    assert!(text.contains(&format!("(call $zone.write_name (i32.const {name}))")), "{text}");
    assert_eq!(text.matches("(call $zone.write_value ").count(), pack_words(r#"{"a":1}"#).len());
    let set = text.find("(call $zone.set_global)").unwrap();
    assert!(set < text.find("(call $log (i32.const 1))").unwrap(), "{text}");
}

#[test]
fn test_composite_rejected_as_wasm_variable() {
    let mut m = module();
    let text = VariableDecl {
        ty: "string".parse().unwrap(),
        value: None,
    };
    assert!(matches!(m.add_global(&text), Err(ModuleError::AddGlobal(_))));
    assert!(matches!(m.add_local("$main", &text), Err(ModuleError::AddLocal { .. })));
    assert!(m.composite_global_code("n", &decl(WasmType::I32, None)).is_err());
}

// ─────────────────────────────────────────────────────────────────────
// Searching and applying
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_call_metadata() {
    let m = module();
    let found = calls(&m, "$main");
    assert_eq!(found.len(), 2);
    let call = found[0].metadata.get("Call").unwrap();
    let callee = call.field("Callee").unwrap();
    assert_eq!(callee.field("Name").map(ToString::to_string).as_deref(), Some("add"));
    assert_eq!(call.field("TotalArgs").map(ToString::to_string).as_deref(), Some("2"));
}

#[test]
fn test_wrap_call_stays_valid() {
    let m = module();
    let found = calls(&m, "$main");
    let this = m.block_text(&found[0]);
    assert_eq!(this, "(call $add (i32.const 2) (i32.const 3))");
    assert!(m.apply(&found[0], &format!("(block (result i32) {this})"), false).unwrap());
    assert_valid(&m);
}

#[test]
fn test_smart_apply_keeps_stack_balanced() {
    let m = module();
    let found = calls(&m, "$main");
    let block = &found[0];
    let this = m.block_text(block);
    m.apply(block, &format!("(call $log (i32.const 1)) {this}"), true).unwrap();
    assert_valid(&m);
    let code = m.function("$main").unwrap().code();
    assert!(code.starts_with("(call $log (i32.const 1)) (local.set $r"));
}

#[test]
fn test_parallel_work_on_distinct_functions() {
    let m = module();
    std::thread::scope(|s| {
        for symbol in ["$add", "$main"] {
            let m = &m;
            s.spawn(move || {
                m.add_local(symbol, &decl(WasmType::I64, None)).unwrap();
                let block = m.function_block(symbol).unwrap();
                let body = m.block_text(&block);
                m.apply(&block, &format!("nop {body}"), false).unwrap();
            });
        }
    });
    assert_valid(&m);
}

// ─────────────────────────────────────────────────────────────────────
// Determinism
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_determinism_100_iterations() {
    let run = || {
        let mut m = module();
        m.add_global(&decl(WasmType::I32, None)).unwrap();
        let found = calls(&m, "$main");
        m.apply(&found[1], "(nop)", false).unwrap();
        m.to_pretty()
    };
    let first = run();
    for i in 0..100 {
        assert_eq!(run(), first, "Run {i} differs");
    }
}
