//! Variable declarations: `type [= value]`.

use serde_json::Value;
use weave_types::ast::VariableDecl;
use weave_types::{ErrorCode, Result, VarType, WeaveError};

/// Parse a variable declaration such as `i32`, `i64 = 10`, `f32 = 0.5`,
/// `string = "abc"` or `map[string]i32 = {"a": 1}`.
///
/// A zero or empty value is treated like a missing initializer. Numbers
/// are normalized (`1.0` becomes `1`). Composite initializers are kept as
/// compact JSON.
pub fn parse_variable(source: &str) -> Result<VariableDecl> {
    let (ty_text, value_text) = match source.split_once('=') {
        Some((ty, value)) => (ty.trim(), Some(value.trim())),
        None => (source.trim(), None),
    };

    let ty = ty_text.parse::<VarType>().map_err(|reason| {
        WeaveError::new(
            ErrorCode::INVALID_TYPE,
            format!("unknown variable type '{ty_text}' in '{source}': {reason}"),
        )
    })?;
    if ty.code().is_none() {
        return Err(WeaveError::new(
            ErrorCode::INVALID_TYPE,
            format!("variable type '{ty}' is nested too deeply"),
        ));
    }

    let value = match value_text {
        None => None,
        Some(text) => parse_value(&ty, text).ok_or_else(|| {
            WeaveError::new(
                ErrorCode::INVALID_VARIABLE,
                format!("invalid {ty} initializer '{text}' in '{source}'"),
            )
        })?,
    };

    Ok(VariableDecl { ty, value })
}

/// `Some(None)` for a zero or empty value, `Some(Some(v))` for any other
/// valid value.
fn parse_value(ty: &VarType, text: &str) -> Option<Option<String>> {
    match ty {
        VarType::Number(_) => parse_number(text),
        VarType::String | VarType::Identifier => {
            let inner = text.strip_prefix('"')?.strip_suffix('"')?;
            let inner = inner.replace("\\\"", "\"");
            Some((!inner.is_empty()).then(|| Value::from(inner).to_string()))
        }
        VarType::Map { .. } => match serde_json::from_str::<Value>(text).ok()? {
            Value::Object(map) => Some((!map.is_empty()).then(|| Value::Object(map).to_string())),
            _ => None,
        },
        VarType::Array(_) => match serde_json::from_str::<Value>(text).ok()? {
            Value::Array(items) => Some((!items.is_empty()).then(|| Value::Array(items).to_string())),
            _ => None,
        },
    }
}

fn parse_number(text: &str) -> Option<Option<String>> {
    if let Ok(int) = text.parse::<i64>() {
        return Some((int != 0).then(|| int.to_string()));
    }
    let float = text.parse::<f64>().ok().filter(|f| f.is_finite())?;
    Some((float != 0.0).then(|| format!("{float}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_types::WasmType;

    #[test]
    fn test_type_only() {
        let decl = parse_variable("i32").unwrap();
        assert_eq!(decl.ty, VarType::Number(WasmType::I32));
        assert_eq!(decl.value, None);
        assert_eq!(decl.init_or_zero(), "0");
    }

    #[test]
    fn test_integer_initializer() {
        let decl = parse_variable(" i64 =  42 ").unwrap();
        assert_eq!(decl.ty.wasm(), Some(WasmType::I64));
        assert_eq!(decl.value.as_deref(), Some("42"));
    }

    #[test]
    fn test_zero_means_no_initializer() {
        assert_eq!(parse_variable("i32 = 0").unwrap().value, None);
        assert_eq!(parse_variable("f64 = 0.0").unwrap().value, None);
    }

    #[test]
    fn test_float_is_normalized() {
        assert_eq!(parse_variable("f32 = 1.50").unwrap().value.as_deref(), Some("1.5"));
        assert_eq!(parse_variable("f64 = 2.0").unwrap().value.as_deref(), Some("2"));
    }

    #[test]
    fn test_negative_initializer() {
        assert_eq!(parse_variable("i32 = -7").unwrap().value.as_deref(), Some("-7"));
    }

    #[test]
    fn test_number_rejects_text() {
        let err = parse_variable("i32 = \"abc\"").unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_VARIABLE);
    }

    #[test]
    fn test_string_initializer() {
        let decl = parse_variable("string = \"say \\\"hi\\\"\"").unwrap();
        assert_eq!(decl.ty, VarType::String);
        assert_eq!(decl.value.as_deref(), Some(r#""say \"hi\"""#));
        assert_eq!(parse_variable("string = \"\"").unwrap().value, None);
        assert!(parse_variable("string = 3").is_err());
    }

    #[test]
    fn test_composite_initializers() {
        let map = parse_variable("map[string]i32 = { \"a\": 1, \"b\": 2 }").unwrap();
        assert_eq!(map.ty.to_string(), "map[string]i32");
        assert_eq!(map.value.as_deref(), Some(r#"{"a":1,"b":2}"#));

        let array = parse_variable("[]f64 = [1.5, 2]").unwrap();
        assert_eq!(array.value.as_deref(), Some("[1.5,2]"));
        assert_eq!(parse_variable("[]i32 = []").unwrap().value, None);

        assert!(parse_variable("[]i32 = {\"a\": 1}").is_err());
        assert!(parse_variable("map[i32]i32 = [1]").is_err());
    }

    #[test]
    fn test_unknown_type() {
        let err = parse_variable("v128 = 3").unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_TYPE);
        let err = parse_variable("map[[]i32]i32").unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_TYPE);
    }

    #[test]
    fn test_bad_initializer() {
        let err = parse_variable("i32 = twelve").unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_VARIABLE);
    }
}
