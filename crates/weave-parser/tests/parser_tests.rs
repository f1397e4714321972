//! Parser tests for both pointcut forms.
//!
//! Covers: heads with and without context, every method, function
//! definition patterns, operator precedence and grouping, grammar errors
//! and determinism.

use weave_parser::{parse_context_pointcut, parse_plain_pointcut};
use weave_types::ast::*;
use weave_types::{ErrorCode, WasmType};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn parse_ok(source: &str) -> ContextPointcut {
    match parse_context_pointcut(source) {
        Ok(p) => p,
        Err(e) => panic!("unexpected parse error for {source:?}: {e}"),
    }
}

fn error_code(source: &str) -> ErrorCode {
    parse_context_pointcut(source)
        .expect_err("expected a parse error")
        .code
}

/// The method of a single-method pointcut body.
fn single_method(source: &str) -> MethodKind {
    match parse_ok(source).body {
        Expr::Method(m) => m.kind,
        other => panic!("expected a single method, got {other:?}"),
    }
}

fn func_def(source: &str) -> FuncDef {
    match single_method(source) {
        MethodKind::Func(def) | MethodKind::Call(def) => def,
        other => panic!("expected func or call, got {other:?}"),
    }
}

/// Method names of an expression in a compact prefix notation.
fn shape(expr: &Expr) -> String {
    match expr {
        Expr::Method(m) => m.kind.name().to_string(),
        Expr::And(l, r) => format!("and({},{})", shape(l), shape(r)),
        Expr::Or(l, r) => format!("or({},{})", shape(l), shape(r)),
    }
}

// ─────────────────────────────────────────────────────────────────────
// Heads
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_empty_context_head() {
    let p = parse_ok("() => func(* *(..))");
    assert!(p.args.is_empty());
}

#[test]
fn test_context_args() {
    let p = parse_ok("(i32.param[$x] p, i32.local[$y] q, local[2] r, param[?] s, param[count] t) => args(p)");
    assert_eq!(p.args.len(), 5);
    assert_eq!(p.args[0].ty, Some(WasmType::I32));
    assert_eq!(p.args[0].locality, Locality::Param);
    assert_eq!(p.args[0].index, ArgIndex::Symbol("$x".into()));
    assert_eq!(p.args[0].name, "p");
    assert_eq!(p.args[1].locality, Locality::Local);
    assert_eq!(p.args[2].ty, None);
    assert_eq!(p.args[2].index, ArgIndex::Ordinal(2));
    assert_eq!(p.args[3].index, ArgIndex::Unbound);
    assert_eq!(p.args[4].index, ArgIndex::Alias("count".into()));
}

#[test]
fn test_plain_head() {
    let p = parse_plain_pointcut("(i32 v, w) => func(* *(..))").unwrap();
    assert_eq!(p.args.len(), 2);
    assert_eq!(p.args[0].ty, Some(WasmType::I32));
    assert_eq!(p.args[0].name, "v");
    assert_eq!(p.args[1].ty, None);
}

#[test]
fn test_plain_head_rejects_context_args() {
    assert!(parse_plain_pointcut("(i32.param[0] v) => func(* *(..))").is_err());
}

// ─────────────────────────────────────────────────────────────────────
// Methods
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_func_any() {
    let def = func_def("() => func(* *(..))");
    assert_eq!(def.ret, ReturnPattern::Any);
    assert_eq!(def.name.matcher, NameMatcher::Any);
    assert_eq!(def.params, ParamsPattern::Any);
    assert_eq!(def.scope, FunctionScope::Any);
}

#[test]
fn test_func_scope() {
    assert_eq!(func_def("() => func(* *(..), exported)").scope, FunctionScope::Exported);
    assert_eq!(func_def("() => func(* *(..), imported)").scope, FunctionScope::Imported);
    assert_eq!(func_def("() => func(* *(..), internal)").scope, FunctionScope::Internal);
    assert_eq!(func_def("() => func(* *(..), start)").scope, FunctionScope::Start);
}

#[test]
fn test_unknown_scope_is_error() {
    assert_eq!(error_code("() => func(* *(..), public)"), ErrorCode::UNEXPECTED_TOKEN);
}

#[test]
fn test_name_matchers() {
    assert_eq!(
        func_def("() => func(* main())").name.matcher,
        NameMatcher::Literal("main".into())
    );
    assert_eq!(
        func_def("() => func(* env.log(..))").name.matcher,
        NameMatcher::Literal("env.log".into())
    );
    assert_eq!(
        func_def("() => func(* $f(..))").name.matcher,
        NameMatcher::Symbol("$f".into())
    );
    assert_eq!(
        func_def("() => func(* [3](..))").name.matcher,
        NameMatcher::Ordinal(3)
    );
    assert_eq!(
        func_def("() => func(* /^get_.*/(..))").name.matcher,
        NameMatcher::Regex("^get_.*".into())
    );
}

#[test]
fn test_name_bindings() {
    let def = func_def("() => call(* %f%(..))");
    assert_eq!(def.name.var.as_deref(), Some("f"));
    assert_eq!(def.name.matcher, NameMatcher::Any);

    let def = func_def("() => call(* %f:$target%(..))");
    assert_eq!(def.name.var.as_deref(), Some("f"));
    assert_eq!(def.name.matcher, NameMatcher::Symbol("$target".into()));

    let def = func_def("() => call(* %f:[0]%(..))");
    assert_eq!(def.name.matcher, NameMatcher::Ordinal(0));

    let def = func_def("() => call(* %f:/log/%(..))");
    assert_eq!(def.name.matcher, NameMatcher::Regex("log".into()));
}

#[test]
fn test_bare_name_short_form() {
    let def = func_def("() => call($target)");
    assert_eq!(def.ret, ReturnPattern::Any);
    assert_eq!(def.name.matcher, NameMatcher::Symbol("$target".into()));
    assert_eq!(def.params, ParamsPattern::Any);

    let def = func_def("() => func(main, exported)");
    assert_eq!(def.name.matcher, NameMatcher::Literal("main".into()));
    assert_eq!(def.scope, FunctionScope::Exported);
}

#[test]
fn test_return_patterns() {
    assert_eq!(func_def("() => func(void *(..))").ret, ReturnPattern::Void);
    assert_eq!(
        func_def("() => func(f64 *(..))").ret,
        ReturnPattern::Type(WasmType::F64)
    );
    assert_eq!(
        func_def("() => func(%r% *(..))").ret,
        ReturnPattern::Var("r".into())
    );
    assert_eq!(
        func_def("() => func(%r:i32% *(..))").ret,
        ReturnPattern::VarType("r".into(), WasmType::I32)
    );
}

#[test]
fn test_param_patterns() {
    assert_eq!(func_def("() => func(* *())").params, ParamsPattern::List(vec![]));
    let def = func_def("() => func(* *(i32 %a%, *, f64 *))");
    assert_eq!(
        def.params,
        ParamsPattern::List(vec![
            ParamPattern { ty: Some(WasmType::I32), var: Some("a".into()) },
            ParamPattern { ty: None, var: None },
            ParamPattern { ty: Some(WasmType::F64), var: None },
        ])
    );
}

#[test]
fn test_args_method() {
    assert_eq!(
        single_method("(param[0] p, local[0] q) => args(p, q)"),
        MethodKind::Args(vec!["p".into(), "q".into()])
    );
    assert_eq!(single_method("() => args()"), MethodKind::Args(vec![]));
}

#[test]
fn test_returns_method() {
    assert_eq!(single_method("() => returns(*)"), MethodKind::Returns(ReturnsFilter::Any));
    assert_eq!(single_method("() => returns(void)"), MethodKind::Returns(ReturnsFilter::Void));
    assert_eq!(
        single_method("() => returns(i64)"),
        MethodKind::Returns(ReturnsFilter::Type(WasmType::I64))
    );
}

#[test]
fn test_template_method() {
    assert_eq!(
        single_method("() => template(T)"),
        MethodKind::Template { name: "T".into(), just_check: false }
    );
    assert_eq!(
        single_method("() => template(T, true)"),
        MethodKind::Template { name: "T".into(), just_check: true }
    );
    assert_eq!(error_code("() => template(T, maybe)"), ErrorCode::UNEXPECTED_TOKEN);
}

#[test]
fn test_user_method() {
    assert_eq!(
        single_method("(param[0] p) => exportedWith(p)"),
        MethodKind::User { name: "exportedWith".into(), args: vec!["p".into()] }
    );
}

// ─────────────────────────────────────────────────────────────────────
// Precedence
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_and_binds_tighter_than_or() {
    let p = parse_ok("() => func(* *(..)) || returns(i32) && args()");
    assert_eq!(shape(&p.body), "or(func,and(returns,args))");
}

#[test]
fn test_left_associativity() {
    let p = parse_ok("() => returns(*) && args() && func(* *(..))");
    assert_eq!(shape(&p.body), "and(and(returns,args),func)");
    let p = parse_ok("() => returns(*) || args() || func(* *(..))");
    assert_eq!(shape(&p.body), "or(or(returns,args),func)");
}

#[test]
fn test_grouping_overrides_precedence() {
    let p = parse_ok("() => (func(* *(..)) || returns(i32)) && args()");
    assert_eq!(shape(&p.body), "and(or(func,returns),args)");
}

// ─────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_missing_arrow() {
    assert_eq!(error_code("() func(* *(..))"), ErrorCode::UNEXPECTED_TOKEN);
}

#[test]
fn test_adjacent_methods_without_operator() {
    assert_eq!(error_code("() => returns(*) args()"), ErrorCode::UNEXPECTED_TOKEN);
}

#[test]
fn test_empty_body() {
    assert_eq!(error_code("() =>"), ErrorCode::UNEXPECTED_TOKEN);
}

#[test]
fn test_invalid_regex() {
    assert_eq!(error_code("() => func(* /([a-z/(..))"), ErrorCode::INVALID_REGEX);
}

#[test]
fn test_unclosed_group() {
    assert_eq!(error_code("() => (returns(*)"), ErrorCode::UNEXPECTED_TOKEN);
}

#[test]
fn test_error_reports_position() {
    let err = parse_context_pointcut("() => func(* *(..), nowhere)").unwrap_err();
    assert!(err.message.contains("nowhere"));
    assert!(err.span.is_some());
}

// ─────────────────────────────────────────────────────────────────────
// Determinism
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_parser_determinism_100_iterations() {
    let source = "(i32.param[$x] p) => call(%r:i32% %f:/^a/%(i32 %v%, *)) || func(* *(..), start) && args(p)";
    let first = parse_ok(source);
    for i in 0..100 {
        assert_eq!(first, parse_ok(source), "Determinism failure at iteration {i}");
    }
}
