//! Function predicates of `func(...)` and `call(...)`, and the
//! `returns(...)` filter.

use regex::Regex;
use weave_keyword::{KeywordMap, KeywordValue};
use weave_module::{FunctionInfo, ReturnInfo};
use weave_types::ast::{FuncDef, FunctionScope, NameMatcher, ParamsPattern, ReturnPattern, ReturnsFilter};
use weave_types::{ErrorCode, Result, Span, WeaveError};

/// A compiled function definition pattern.
#[derive(Debug, Clone)]
pub(crate) struct FuncPredicate {
    def: FuncDef,
    regex: Option<Regex>,
}

impl FuncPredicate {
    pub(crate) fn compile(def: &FuncDef, span: Span) -> Result<Self> {
        let regex = match &def.name.matcher {
            NameMatcher::Regex(source) => Some(Regex::new(source).map_err(|e| {
                WeaveError::new(ErrorCode::INVALID_REGEX, format!("invalid regex /{source}/: {e}")).at(span)
            })?),
            _ => None,
        };
        Ok(Self {
            def: def.clone(),
            regex,
        })
    }

    fn name_matches(&self, info: &FunctionInfo) -> bool {
        match &self.def.name.matcher {
            NameMatcher::Any => true,
            NameMatcher::Literal(name) => info.name == *name,
            NameMatcher::Symbol(symbol) => info.symbol == *symbol,
            NameMatcher::Ordinal(index) => info.index == *index,
            NameMatcher::Regex(_) => self.regex.as_ref().is_some_and(|r| r.is_match(&info.name)),
        }
    }

    fn result_matches(&self, info: &FunctionInfo) -> bool {
        let result = info.result.as_deref();
        match &self.def.ret {
            ReturnPattern::Any | ReturnPattern::Var(_) => true,
            ReturnPattern::Void => result.is_none(),
            ReturnPattern::Type(ty) | ReturnPattern::VarType(_, ty) => result == Some(ty.as_str()),
        }
    }

    fn params_match(&self, info: &FunctionInfo) -> bool {
        match &self.def.params {
            ParamsPattern::Any => true,
            ParamsPattern::List(list) => {
                list.len() == info.params.len()
                    && list
                        .iter()
                        .zip(&info.params)
                        .all(|(p, actual)| p.ty.map_or(true, |ty| ty.as_str() == actual.ty))
            }
        }
    }

    fn scope_matches(&self, info: &FunctionInfo) -> bool {
        match self.def.scope {
            FunctionScope::Any => true,
            FunctionScope::Internal => !info.imported && !info.exported,
            FunctionScope::Imported => info.imported,
            FunctionScope::Exported => info.exported,
            FunctionScope::Start => info.start,
        }
    }

    /// The `%var%` bindings of a matching function.
    fn environment(&self, info: &FunctionInfo) -> KeywordMap {
        let mut env = KeywordMap::new();
        if let Some(var) = &self.def.name.var {
            env.insert(var.clone(), info.name.as_str());
        }
        if let ReturnPattern::Var(var) | ReturnPattern::VarType(var, _) = &self.def.ret {
            env.insert(var.clone(), info.result.clone().unwrap_or_default());
        }
        if let ParamsPattern::List(list) = &self.def.params {
            for (pattern, param) in list.iter().zip(&info.params) {
                if let Some(var) = &pattern.var {
                    env.insert(
                        var.clone(),
                        KeywordValue::object([
                            ("Name", KeywordValue::from(param.symbol.as_str())),
                            ("Type", KeywordValue::from(param.ty.as_str())),
                        ]),
                    );
                }
            }
        }
        env
    }

    /// The bindings of `info` when it satisfies the pattern.
    pub(crate) fn matches(&self, info: &FunctionInfo) -> Option<KeywordMap> {
        let accepted = self.name_matches(info)
            && self.result_matches(info)
            && self.params_match(info)
            && self.scope_matches(info);
        accepted.then(|| self.environment(info))
    }
}

pub(crate) fn returns_matches(filter: ReturnsFilter, ret: &ReturnInfo) -> bool {
    match filter {
        ReturnsFilter::Any => true,
        ReturnsFilter::Void => ret.ty.is_none(),
        ReturnsFilter::Type(ty) => ret.ty.as_deref() == Some(ty.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_module::Variable;
    use weave_types::ast::{NamePattern, ParamPattern};
    use weave_types::WasmType;

    fn info() -> FunctionInfo {
        FunctionInfo {
            symbol: "$add".into(),
            index: 1,
            name: "add".into(),
            params: vec![Variable::new("$a", "i32"), Variable::new("$b", "i32")],
            locals: vec![],
            result: Some("i32".into()),
            code: String::new(),
            imported: false,
            exported: true,
            start: false,
        }
    }

    fn def(matcher: NameMatcher) -> FuncDef {
        FuncDef {
            ret: ReturnPattern::Any,
            name: NamePattern { var: None, matcher },
            params: ParamsPattern::Any,
            scope: FunctionScope::Any,
        }
    }

    fn compile(def: &FuncDef) -> FuncPredicate {
        FuncPredicate::compile(def, Span::point(1, 1)).unwrap()
    }

    #[test]
    fn test_name_matchers() {
        let f = info();
        assert!(compile(&def(NameMatcher::Literal("add".into()))).matches(&f).is_some());
        assert!(compile(&def(NameMatcher::Symbol("$add".into()))).matches(&f).is_some());
        assert!(compile(&def(NameMatcher::Ordinal(1))).matches(&f).is_some());
        assert!(compile(&def(NameMatcher::Ordinal(0))).matches(&f).is_none());
        assert!(compile(&def(NameMatcher::Regex("^a.d$".into()))).matches(&f).is_some());
    }

    #[test]
    fn test_invalid_regex_is_grammar_error() {
        let err = FuncPredicate::compile(&def(NameMatcher::Regex("(".into())), Span::point(1, 1)).unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_REGEX);
    }

    #[test]
    fn test_params_and_bindings() {
        let mut d = def(NameMatcher::Any);
        d.name.var = Some("fname".into());
        d.ret = ReturnPattern::VarType("res".into(), WasmType::I32);
        d.params = ParamsPattern::List(vec![
            ParamPattern {
                ty: Some(WasmType::I32),
                var: Some("first".into()),
            },
            ParamPattern { ty: None, var: None },
        ]);
        let env = compile(&d).matches(&info()).unwrap();
        assert_eq!(env.get("fname").map(ToString::to_string).as_deref(), Some("add"));
        assert_eq!(env.get("res").map(ToString::to_string).as_deref(), Some("i32"));
        let first = env.get("first").unwrap();
        assert_eq!(first.field("Name").map(ToString::to_string).as_deref(), Some("$a"));
    }

    #[test]
    fn test_scope_and_void() {
        let mut d = def(NameMatcher::Any);
        d.scope = FunctionScope::Internal;
        assert!(compile(&d).matches(&info()).is_none());
        d.scope = FunctionScope::Exported;
        d.ret = ReturnPattern::Void;
        assert!(compile(&d).matches(&info()).is_none());
    }
}
