//! Advice pointcut parameters resolved inside one function.

use std::collections::BTreeMap;

use weave_keyword::{KeywordSource, KeywordValue};
use weave_module::{Function, Variable};
use weave_pointcut::PointcutParam;
use weave_types::ast::{ArgIndex, Locality};
use weave_types::{ErrorCode, Result, WeaveError};

/// Parameter name → symbol of the param or local it designates in a
/// function. Resolving registers each name as an alias of its symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointcutParameters {
    resolved: BTreeMap<String, String>,
}

impl PointcutParameters {
    /// Resolve `params` against `function`.
    ///
    /// An ordinal index counts within the params or within the locals. A
    /// `$` index names a symbol, any other index a previously registered
    /// alias. Unbound (`?`) parameters are left to the bindings of the
    /// `args` filter.
    pub fn resolve(function: &Function, params: &[PointcutParam]) -> Result<Self> {
        let mut resolved = BTreeMap::new();
        for param in params {
            let Some(symbol) = resolve_one(function, param)? else {
                continue;
            };
            function.add_alias(symbol.clone(), param.name.clone());
            resolved.insert(param.name.clone(), symbol);
        }
        Ok(Self { resolved })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.resolved.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

impl KeywordSource for PointcutParameters {
    fn lookup(&self, name: &str) -> Option<KeywordValue> {
        self.get(name).map(KeywordValue::from)
    }
}

fn resolve_one(function: &Function, param: &PointcutParam) -> Result<Option<String>> {
    let (pool, kind, missing) = match param.locality {
        Locality::Param => (function.params().to_vec(), "parameter", ErrorCode::UNKNOWN_PARAMETER),
        Locality::Local => (function.locals(), "local", ErrorCode::UNKNOWN_LOCAL),
    };
    let fail = |code: ErrorCode, message: String| {
        Err(WeaveError::new(code, message).within(format!("function {}", function.symbol())))
    };
    let find = |symbol: &str| pool.iter().find(|v| v.symbol == symbol).map(|v: &Variable| v.symbol.clone());

    match &param.index {
        ArgIndex::Ordinal(n) => match pool.get(*n as usize) {
            Some(v) => Ok(Some(v.symbol.clone())),
            None => fail(
                ErrorCode::INDEX_OUT_OF_RANGE,
                format!(
                    "{kind} index out of range for '{}' (index: {n}, count: {})",
                    param.name,
                    pool.len()
                ),
            ),
        },
        ArgIndex::Symbol(symbol) => match find(symbol) {
            Some(found) => Ok(Some(found)),
            None => fail(missing, format!("{kind} {symbol} not found for '{}'", param.name)),
        },
        ArgIndex::Alias(alias) => match function.alias_key(alias).as_deref().and_then(find) {
            Some(found) => Ok(Some(found)),
            None => fail(missing, format!("{kind} named {alias} not found for '{}'", param.name)),
        },
        ArgIndex::Unbound => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_module::ModuleContext;
    use weave_types::WasmType;

    fn param(name: &str, locality: Locality, index: ArgIndex) -> PointcutParam {
        PointcutParam {
            name: name.into(),
            ty: Some(WasmType::I32),
            locality,
            index,
        }
    }

    fn module() -> ModuleContext {
        ModuleContext::parse("(module (func $f (param $x i32) (param i32) (local $y i32) (local i32) nop))").unwrap()
    }

    #[test]
    fn test_resolve_ordinals_within_each_pool() {
        let m = module();
        let f = m.function("$f").unwrap();
        let params = PointcutParameters::resolve(
            f,
            &[
                param("p", Locality::Param, ArgIndex::Ordinal(1)),
                param("q", Locality::Local, ArgIndex::Ordinal(0)),
            ],
        )
        .unwrap();
        assert_eq!(params.get("p"), Some("1"));
        assert_eq!(params.get("q"), Some("$y"));
        assert_eq!(f.alias_value("$y").as_deref(), Some("q"));
    }

    #[test]
    fn test_resolve_symbol_and_alias() {
        let m = module();
        let f = m.function("$f").unwrap();
        f.add_alias("$x", "input");
        let params = PointcutParameters::resolve(
            f,
            &[
                param("a", Locality::Param, ArgIndex::Alias("input".into())),
                param("b", Locality::Local, ArgIndex::Symbol("$y".into())),
                param("c", Locality::Param, ArgIndex::Unbound),
            ],
        )
        .unwrap();
        assert_eq!(params.lookup("a"), Some(KeywordValue::from("$x")));
        assert_eq!(params.get("b"), Some("$y"));
        assert!(params.get("c").is_none());
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_out_of_range_and_unknown_names() {
        let m = module();
        let f = m.function("$f").unwrap();
        let err = PointcutParameters::resolve(f, &[param("p", Locality::Local, ArgIndex::Ordinal(2))]).unwrap_err();
        assert_eq!(err.code, ErrorCode::INDEX_OUT_OF_RANGE);
        let err =
            PointcutParameters::resolve(f, &[param("p", Locality::Param, ArgIndex::Symbol("$y".into()))]).unwrap_err();
        assert_eq!(err.code, ErrorCode::UNKNOWN_PARAMETER);
        let err =
            PointcutParameters::resolve(f, &[param("p", Locality::Local, ArgIndex::Alias("nope".into()))]).unwrap_err();
        assert_eq!(err.code, ErrorCode::UNKNOWN_LOCAL);
        assert_eq!(err.context.as_deref(), Some("function $f"));
    }
}
