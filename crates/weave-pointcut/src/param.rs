//! Pointcut parameters: the `(i32.param[$x] p, ...)` list of an advice.

use weave_keyword::KeywordValue;
use weave_module::{CallInfo, FunctionInfo, ModuleContext, Variable};
use weave_types::ast::{ArgIndex, ContextArg, Locality};
use weave_types::WasmType;

/// A declared parameter of an advice pointcut.
#[derive(Debug, Clone, PartialEq)]
pub struct PointcutParam {
    pub name: String,
    pub ty: Option<WasmType>,
    pub locality: Locality,
    pub index: ArgIndex,
}

impl From<&ContextArg> for PointcutParam {
    fn from(arg: &ContextArg) -> Self {
        Self {
            name: arg.name.clone(),
            ty: arg.ty,
            locality: arg.locality,
            index: arg.index.clone(),
        }
    }
}

impl PointcutParam {
    /// The variables of `caller` this parameter may stand for, paired with
    /// their wasm local index.
    fn candidates(&self, module: &ModuleContext, caller: &FunctionInfo) -> Vec<(usize, Variable)> {
        let (offset, pool) = match self.locality {
            Locality::Param => (0, &caller.params),
            Locality::Local => (caller.params.len(), &caller.locals),
        };
        let all = pool.iter().cloned().enumerate().map(|(i, v)| (offset + i, v));
        match &self.index {
            ArgIndex::Ordinal(n) => all.skip(*n as usize).take(1).collect(),
            ArgIndex::Symbol(symbol) => all.filter(|(_, v)| v.symbol == *symbol).collect(),
            ArgIndex::Alias(alias) => {
                let key = module
                    .function(&caller.symbol)
                    .and_then(|f| f.alias_key(alias));
                match key {
                    Some(key) => all.filter(|(_, v)| v.symbol == key).collect(),
                    None => Vec::new(),
                }
            }
            ArgIndex::Unbound => all.collect(),
        }
    }

    /// The caller variable read by `immediate` (a `local.get` operand), if
    /// it is one this parameter accepts.
    pub fn resolve(&self, module: &ModuleContext, caller: &FunctionInfo, immediate: &str) -> Option<Variable> {
        self.candidates(module, caller)
            .into_iter()
            .find(|(index, v)| v.symbol == immediate || index.to_string() == immediate)
            .map(|(_, v)| v)
            .filter(|v| self.ty.map_or(true, |ty| ty.as_str() == v.ty))
    }

    /// The keyword bound for this parameter when it matched `variable`:
    /// `ElType` is the value type, `Type` the locality (`param`/`local`).
    pub fn keyword(&self, variable: &Variable) -> KeywordValue {
        KeywordValue::object([
            ("ElType", KeywordValue::from(variable.ty.as_str())),
            ("Index", KeywordValue::from(variable.symbol.as_str())),
            ("Type", KeywordValue::from(self.locality.as_str())),
        ])
    }
}

/// Match the operands of `call` against `params`, in order. Every operand
/// must be a `local.get` of the variable its parameter resolves to.
pub(crate) fn match_args(
    module: &ModuleContext,
    params: &[PointcutParam],
    call: &CallInfo,
) -> Option<Vec<(String, KeywordValue)>> {
    let mut bound = Vec::with_capacity(params.len());
    for (i, param) in params.iter().enumerate() {
        let (instr, immediate) = call.args.get(i)?.access.as_ref()?;
        if instr != "local.get" {
            return None;
        }
        let variable = param.resolve(module, &call.caller, immediate)?;
        bound.push((param.name.clone(), param.keyword(&variable)));
    }
    Some(bound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(locality: Locality, index: ArgIndex, ty: Option<WasmType>) -> PointcutParam {
        PointcutParam {
            name: "p".into(),
            ty,
            locality,
            index,
        }
    }

    fn module() -> ModuleContext {
        ModuleContext::parse("(module (func $f (param $a i32) (param $b f64) (local $t i32) nop))").unwrap()
    }

    #[test]
    fn test_resolve_by_symbol_and_ordinal() {
        let m = module();
        let caller = m.function_info("$f").unwrap();
        let by_symbol = param(Locality::Param, ArgIndex::Symbol("$b".into()), Some(WasmType::F64));
        assert_eq!(by_symbol.resolve(&m, &caller, "$b").unwrap().symbol, "$b");
        assert_eq!(by_symbol.resolve(&m, &caller, "1").unwrap().symbol, "$b");
        let by_ordinal = param(Locality::Param, ArgIndex::Ordinal(0), None);
        assert_eq!(by_ordinal.resolve(&m, &caller, "$a").unwrap().symbol, "$a");
        assert!(by_ordinal.resolve(&m, &caller, "$b").is_none());
    }

    #[test]
    fn test_local_index_counts_params() {
        let m = module();
        let caller = m.function_info("$f").unwrap();
        let local = param(Locality::Local, ArgIndex::Ordinal(0), Some(WasmType::I32));
        assert_eq!(local.resolve(&m, &caller, "2").unwrap().symbol, "$t");
        assert!(local.resolve(&m, &caller, "0").is_none());
    }

    #[test]
    fn test_type_mismatch_rejects() {
        let m = module();
        let caller = m.function_info("$f").unwrap();
        let wrong = param(Locality::Param, ArgIndex::Symbol("$b".into()), Some(WasmType::I32));
        assert!(wrong.resolve(&m, &caller, "$b").is_none());
    }

    #[test]
    fn test_keyword_fields() {
        let m = module();
        let caller = m.function_info("$f").unwrap();
        let local = param(Locality::Local, ArgIndex::Unbound, None);
        let kw = local.keyword(&local.resolve(&m, &caller, "$t").unwrap());
        assert_eq!(kw.field("ElType").map(ToString::to_string).as_deref(), Some("i32"));
        assert_eq!(kw.field("Type").map(ToString::to_string).as_deref(), Some("local"));
        assert_eq!(kw.field("Index").map(ToString::to_string).as_deref(), Some("$t"));
    }

    #[test]
    fn test_unbound_takes_any_param() {
        let m = module();
        let caller = m.function_info("$f").unwrap();
        let any = param(Locality::Param, ArgIndex::Unbound, None);
        assert_eq!(any.resolve(&m, &caller, "$b").unwrap().ty, "f64");
        assert!(any.resolve(&m, &caller, "$t").is_none());
    }
}
