//! Whole-tool runs against files in a scratch directory.

use std::fs;
use std::path::{Path, PathBuf};

use weave_cli::config::{ConfigLayer, ToolConfig};
use weave_cli::run;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

const MODULE: &str = r#"
(module
  (func $inc (export "inc") (param i32) (result i32) (i32.add (local.get 0) (i32.const 1))))
"#;

const TRACE: &str = r#"
[aspects.context.functions.log]
args = [{ name = "v", type = "i32" }]
imported = { module = "env", field = "log" }

[aspects.advices.trace]
pointcut = "() => func(* *(..), exported)"
advice = "(call %log% (local.get 0)) %this%"
"#;

/// Fresh directory under the system temp dir.
fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("wasm-weaver-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn config(dir: &Path, layer: ConfigLayer) -> ToolConfig {
    ToolConfig::from(ConfigLayer {
        dependencies_dir: Some(dir.to_path_buf()),
        data_dir: Some(dir.to_path_buf()),
        ..layer
    })
}

fn valid(bytes: &[u8]) {
    wasmparser::validate(bytes).unwrap_or_else(|e| panic!("invalid output: {e}"));
}

// ─────────────────────────────────────────────────────────────────────
// Runs
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_weave_text_to_binary_with_glue() {
    let dir = scratch("glue");
    fs::write(dir.join("input.wat"), MODULE).unwrap();
    fs::write(dir.join("input.toml"), TRACE).unwrap();

    let report = run(&config(&dir, ConfigLayer::default())).unwrap();
    assert!(report.summary.applied);
    assert!(report.summary.changed);
    assert_eq!(report.summary.advices[0].join_points, 1);
    assert!(report.wrote_module);
    assert!(report.wrote_js);

    valid(&fs::read(dir.join("output.wasm")).unwrap());
    let js = fs::read_to_string(dir.join("output.js")).unwrap();
    assert!(js.contains("\"log\": (...args)"));
}

#[test]
fn test_identity_run() {
    let dir = scratch("identity");
    let module = r#"(module (func $id (export "id") (param i32) (result i32) local.get 0))"#;
    fs::write(dir.join("input.wat"), module).unwrap();
    fs::write(dir.join("input.toml"), "").unwrap();

    let layer = ConfigLayer {
        allow_empty: Some(true),
        ..ConfigLayer::default()
    };
    let report = run(&config(&dir, layer)).unwrap();
    assert!(report.summary.applied);
    assert!(!report.summary.changed);
    assert!(!report.wrote_js);
    assert_eq!(
        fs::read(dir.join("output.wasm")).unwrap(),
        wat::parse_str(module).unwrap()
    );
}

#[test]
fn test_no_glue_without_imports() {
    let dir = scratch("noglue");
    fs::write(dir.join("input.wat"), MODULE).unwrap();
    fs::write(
        dir.join("input.toml"),
        r#"
[aspects.advices.twice]
pointcut = "() => func(* *(..), exported)"
advice = "(i32.mul %this% (i32.const 2))"
"#,
    )
    .unwrap();

    let report = run(&config(&dir, ConfigLayer::default())).unwrap();
    assert!(report.wrote_module);
    assert!(!report.wrote_js);
    assert!(!dir.join("output.js").exists());

    let layer = ConfigLayer {
        print_js: Some(true),
        ..ConfigLayer::default()
    };
    assert!(run(&config(&dir, layer)).unwrap().wrote_js);
}

#[test]
fn test_binary_input_and_text_output() {
    let dir = scratch("binary");
    fs::write(dir.join("in.wasm"), wat::parse_str(MODULE).unwrap()).unwrap();
    fs::write(dir.join("in.json"), r#"{"aspects": {"advices": {"twice": {
        "pointcut": "() => func(* *(..), exported)",
        "advice": "(i32.mul %this% (i32.const 2))"}}}}"#)
        .unwrap();

    let layer = ConfigLayer {
        in_module: Some("in.wasm".into()),
        in_transform: Some("in.json".into()),
        out_module: Some("out.wat".into()),
        out_module_orig: Some("orig.wasm".into()),
        ..ConfigLayer::default()
    };
    let report = run(&config(&dir, layer)).unwrap();
    assert!(report.summary.changed);

    let text = fs::read_to_string(dir.join("out.wat")).unwrap();
    assert!(text.contains("i32.mul"), "{text}");
    valid(&wat::parse_str(&text).unwrap());
    valid(&fs::read(dir.join("orig.wasm")).unwrap());
}

#[test]
fn test_exclude_everything_writes_nothing() {
    let dir = scratch("empty");
    fs::write(dir.join("input.wat"), MODULE).unwrap();
    fs::write(dir.join("input.toml"), TRACE).unwrap();

    let layer = ConfigLayer {
        exclude: Some(vec!["trace".into()]),
        ..ConfigLayer::default()
    };
    let report = run(&config(&dir, layer)).unwrap();
    assert!(!report.summary.applied);
    assert!(!report.wrote_module);
    assert!(!dir.join("output.wasm").exists());
}

#[test]
fn test_allow_empty_applies_context_only() {
    let dir = scratch("allow");
    fs::write(dir.join("input.wat"), MODULE).unwrap();
    fs::write(dir.join("input.toml"), TRACE).unwrap();

    let layer = ConfigLayer {
        exclude: Some(vec!["trace".into()]),
        allow_empty: Some(true),
        ..ConfigLayer::default()
    };
    let report = run(&config(&dir, layer)).unwrap();
    assert!(report.summary.applied);
    assert!(report.summary.advices.is_empty());
    // The context added an import, so glue is required.
    assert!(report.wrote_js);
    valid(&fs::read(dir.join("output.wasm")).unwrap());
}

// ─────────────────────────────────────────────────────────────────────
// Failures
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_bad_pointcut_fails_the_run() {
    let dir = scratch("bad");
    fs::write(dir.join("input.wat"), MODULE).unwrap();
    fs::write(
        dir.join("input.toml"),
        "[aspects.advices.bad]\npointcut = \"() => func(\"\nadvice = \"%this%\"\n",
    )
    .unwrap();
    let err = run(&config(&dir, ConfigLayer::default())).unwrap_err();
    assert!(format!("{err:#}").contains("advice 'bad'"), "{err:#}");
    assert!(!dir.join("output.wasm").exists());
}

#[test]
fn test_unknown_module_extension() {
    let dir = scratch("ext");
    fs::write(dir.join("input.txt"), MODULE).unwrap();
    let layer = ConfigLayer {
        in_module: Some("input.txt".into()),
        ..ConfigLayer::default()
    };
    let err = run(&config(&dir, layer)).unwrap_err();
    assert!(err.to_string().contains("unknown input file extension"), "{err}");
}

#[test]
fn test_config_file_layer() {
    let dir = scratch("configfile");
    let toml = dir.join("weaver.toml");
    fs::write(&toml, "out_module = \"woven.wat\"\ninclude = [\"a\"]\nverbose = true\n").unwrap();
    let json = dir.join("weaver.json");
    fs::write(&json, r#"{"out_module": "woven.wat", "include": ["a"], "verbose": true}"#).unwrap();

    let from_toml = ConfigLayer::from_file(&toml).unwrap();
    assert_eq!(from_toml, ConfigLayer::from_file(&json).unwrap());
    let config = ToolConfig::from(from_toml);
    assert_eq!(config.out_js, PathBuf::from("woven.js"));
    assert!(config.verbose);

    fs::write(&toml, "out_modul = \"typo\"\n").unwrap();
    assert!(ConfigLayer::from_file(&toml).is_err());
}
