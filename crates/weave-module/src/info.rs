//! Snapshots handed to search predicates and stored in block metadata.

use weave_keyword::KeywordValue;

use crate::function::Variable;

fn strings<'a>(items: impl Iterator<Item = &'a str>) -> KeywordValue {
    KeywordValue::Array(items.map(KeywordValue::from).collect())
}

fn flag(b: bool) -> KeywordValue {
    KeywordValue::from(b.to_string())
}

/// A function as seen by `func` predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub symbol: String,
    pub index: u32,
    pub name: String,
    pub params: Vec<Variable>,
    pub locals: Vec<Variable>,
    pub result: Option<String>,
    pub code: String,
    pub imported: bool,
    pub exported: bool,
    pub start: bool,
}

impl FunctionInfo {
    pub fn to_keyword(&self) -> KeywordValue {
        KeywordValue::object([
            ("Index", KeywordValue::from(self.symbol.as_str())),
            ("Order", KeywordValue::from(self.index.to_string())),
            ("Name", KeywordValue::from(self.name.as_str())),
            ("Params", strings(self.params.iter().map(|p| p.symbol.as_str()))),
            ("ParamTypes", strings(self.params.iter().map(|p| p.ty.as_str()))),
            ("TotalParams", KeywordValue::from(self.params.len().to_string())),
            ("Locals", strings(self.locals.iter().map(|l| l.symbol.as_str()))),
            ("LocalTypes", strings(self.locals.iter().map(|l| l.ty.as_str()))),
            ("TotalLocals", KeywordValue::from(self.locals.len().to_string())),
            ("ResultType", KeywordValue::from(self.result.clone().unwrap_or_default())),
            ("Code", KeywordValue::from(self.code.as_str())),
            ("IsImported", flag(self.imported)),
            ("IsExported", flag(self.exported)),
            ("IsStart", flag(self.start)),
        ])
    }
}

/// One operand of a folded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgInfo {
    /// Declared type of the callee parameter.
    pub ty: String,
    pub order: usize,
    pub instr: String,
    /// For `(local.get x)` style operands: the instruction name and its
    /// immediate.
    pub access: Option<(String, String)>,
}

impl ArgInfo {
    fn to_keyword(&self) -> KeywordValue {
        KeywordValue::object([
            ("Type", KeywordValue::from(self.ty.as_str())),
            ("Order", KeywordValue::from(self.order.to_string())),
            ("Instr", KeywordValue::from(self.instr.as_str())),
        ])
    }
}

/// A call site, for `call` and `args` predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInfo {
    pub callee: FunctionInfo,
    pub caller: FunctionInfo,
    pub args: Vec<ArgInfo>,
}

impl CallInfo {
    pub fn to_keyword(&self) -> KeywordValue {
        KeywordValue::object([
            ("Callee", self.callee.to_keyword()),
            ("Caller", self.caller.to_keyword()),
            ("Args", KeywordValue::Array(self.args.iter().map(ArgInfo::to_keyword).collect())),
            ("TotalArgs", KeywordValue::from(self.args.len().to_string())),
        ])
    }
}

/// A return site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnInfo {
    pub func: FunctionInfo,
    pub instr: String,
    pub ty: Option<String>,
}

impl ReturnInfo {
    pub fn to_keyword(&self) -> KeywordValue {
        KeywordValue::object([
            ("Func", self.func.to_keyword()),
            ("Instr", KeywordValue::from(self.instr.as_str())),
            ("Type", KeywordValue::from(self.ty.clone().unwrap_or_default())),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_keyword_fields() {
        let info = FunctionInfo {
            symbol: "$add".into(),
            index: 2,
            name: "add".into(),
            params: vec![Variable::new("$a", "i32"), Variable::new("$b", "i32")],
            locals: vec![],
            result: Some("i32".into()),
            code: "(i32.add (local.get $a) (local.get $b))".into(),
            imported: false,
            exported: true,
            start: false,
        };
        let kw = info.to_keyword();
        assert_eq!(kw.field("index").map(ToString::to_string).as_deref(), Some("$add"));
        assert_eq!(kw.field("order").map(ToString::to_string).as_deref(), Some("2"));
        assert_eq!(kw.field("params").map(ToString::to_string).as_deref(), Some("$a $b"));
        assert_eq!(kw.field("isExported").map(ToString::to_string).as_deref(), Some("true"));
        assert_eq!(kw.field("resultType").map(ToString::to_string).as_deref(), Some("i32"));
    }
}
