//! Variable types: WebAssembly numbers plus the composite types that live
//! in the host runtime (`string`, `identifier`, `map[K]V`, `[]T`).

use std::fmt;
use std::str::FromStr;

use crate::WasmType;

/// Labels with a runtime type code, numbered from 1 in this order. A label
/// that is not listed (`i64`, `map_i64`, `map_identifier`) has code 0.
const TYPE_LABELS: [&str; 10] = [
    "identifier",
    "i32",
    "f32",
    "f64",
    "string",
    "map_i32",
    "map_f32",
    "map_f64",
    "map_string",
    "array",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VarType {
    Number(WasmType),
    String,
    Identifier,
    /// The key is always a simple type.
    Map { key: Box<VarType>, value: Box<VarType> },
    Array(Box<VarType>),
}

impl VarType {
    /// The WebAssembly type, for number types only.
    pub fn wasm(&self) -> Option<WasmType> {
        match self {
            Self::Number(ty) => Some(*ty),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        self.wasm().is_some()
    }

    fn is_simple(&self) -> bool {
        matches!(self, Self::Number(_) | Self::String | Self::Identifier)
    }

    /// `map_<key>` for maps, `array` for arrays, the type itself otherwise.
    pub fn label(&self) -> String {
        match self {
            Self::Number(ty) => ty.as_str().to_string(),
            Self::String => "string".to_string(),
            Self::Identifier => "identifier".to_string(),
            Self::Map { key, .. } => format!("map_{}", key.label()),
            Self::Array(_) => "array".to_string(),
        }
    }

    /// The code the host runtime uses to rebuild a value of this type.
    ///
    /// A composite code is its own label code shifted left past the code of
    /// its element type. The shift is the element code's bit length rounded
    /// up to a multiple of the bit length of the label count. `None` when
    /// the code does not fit in 32 bits.
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::Map { value, .. } => composite_code(&self.label(), value.code()?),
            Self::Array(item) => composite_code(&self.label(), item.code()?),
            simple => Some(label_code(&simple.label())),
        }
    }
}

fn label_code(label: &str) -> u32 {
    TYPE_LABELS
        .iter()
        .position(|l| *l == label)
        .map_or(0, |i| i as u32 + 1)
}

fn bit_len(n: u32) -> u32 {
    (u32::BITS - n.leading_zeros()).max(1)
}

fn composite_code(label: &str, item: u32) -> Option<u32> {
    let step = bit_len(TYPE_LABELS.len() as u32);
    let shift = bit_len(item).div_ceil(step) * step;
    let high = u64::from(label_code(label)) << shift.max(step);
    u32::try_from(high | u64::from(item)).ok()
}

impl FromStr for VarType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix("map[") {
            let (key, value) = rest
                .split_once(']')
                .ok_or_else(|| format!("map type '{s}' has no closing ']'"))?;
            let key: VarType = key.parse()?;
            if !key.is_simple() {
                return Err(format!("key type '{key}' is invalid for map"));
            }
            let value: VarType = value
                .parse()
                .map_err(|e| format!("value type is invalid for map: {e}"))?;
            return Ok(Self::Map {
                key: Box::new(key),
                value: Box::new(value),
            });
        }
        if let Some(item) = s.strip_prefix("[]") {
            let item: VarType = item
                .parse()
                .map_err(|e| format!("value type is invalid for array: {e}"))?;
            return Ok(Self::Array(Box::new(item)));
        }
        match s {
            "string" => Ok(Self::String),
            "identifier" => Ok(Self::Identifier),
            other => other
                .parse::<WasmType>()
                .map(Self::Number)
                .map_err(|()| format!("type '{other}' is not valid")),
        }
    }
}

impl From<WasmType> for VarType {
    fn from(ty: WasmType) -> Self {
        Self::Number(ty)
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(ty) => write!(f, "{ty}"),
            Self::String => f.write_str("string"),
            Self::Identifier => f.write_str("identifier"),
            Self::Map { key, value } => write!(f, "map[{key}]{value}"),
            Self::Array(item) => write!(f, "[]{item}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(s: &str) -> VarType {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        for text in ["i32", "f64", "string", "identifier", "[]i32", "map[string]f64", "[]map[i32][]string"] {
            assert_eq!(ty(text).to_string(), text);
        }
        assert_eq!(ty(" i64 "), VarType::Number(WasmType::I64));
        assert!(ty("map[i32]i32").wasm().is_none());
        assert!(ty("f32").is_primitive());
    }

    #[test]
    fn test_invalid_types() {
        assert!("v128".parse::<VarType>().is_err());
        assert!("map[[]i32]i32".parse::<VarType>().is_err());
        assert!("map[i32".parse::<VarType>().is_err());
        assert!("[]".parse::<VarType>().is_err());
        assert!("map[string]".parse::<VarType>().is_err());
    }

    #[test]
    fn test_labels() {
        assert_eq!(ty("map[string][]i32").label(), "map_string");
        assert_eq!(ty("[]f32").label(), "array");
        assert_eq!(ty("string").label(), "string");
    }

    #[test]
    fn test_type_codes() {
        assert_eq!(ty("identifier").code(), Some(1));
        assert_eq!(ty("string").code(), Some(5));
        assert_eq!(ty("i64").code(), Some(0));
        // array (10) over i32 (2): 10 << 4 | 2
        assert_eq!(ty("[]i32").code(), Some(162));
        // map_string (9) over f64 (4)
        assert_eq!(ty("map[string]f64").code(), Some(148));
        // map_i32 (6) over string (5) is 101, seven bits wide, so the
        // array label is shifted by eight.
        assert_eq!(ty("[]map[i32]string").code(), Some((10 << 8) | 101));
    }

    #[test]
    fn test_deep_nesting_overflows() {
        let deep = format!("{}i32", "[]".repeat(12));
        assert_eq!(ty(&deep).code(), None);
    }
}
