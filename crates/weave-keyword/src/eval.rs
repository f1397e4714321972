//! Keyword expression evaluation.

use weave_types::text::{capitalize, tidy_code};

use crate::expr::{Arg, BinOp, Expr, Lambda, Segment};
use crate::map::{FunctionOrders, KeywordMap, KeywordSource, KeywordStack};
use crate::value::KeywordValue;

/// Why a keyword produced no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Failure {
    /// A name, field or method did not resolve; the keyword stays as written.
    Unresolved,
    /// An `assert` lambda rejected its value; the keyword prints nothing.
    Assertion,
}

type Eval<T> = Result<T, Failure>;

pub(crate) struct Evaluator<'k> {
    keywords: &'k dyn KeywordSource,
    orders: &'k dyn FunctionOrders,
}

impl<'k> Evaluator<'k> {
    pub(crate) fn new(keywords: &'k dyn KeywordSource, orders: &'k dyn FunctionOrders) -> Self {
        Self { keywords, orders }
    }

    pub(crate) fn eval(&self, expr: &Expr) -> Eval<KeywordValue> {
        match expr {
            Expr::Ident(name) => self.keywords.lookup(name).ok_or(Failure::Unresolved),
            Expr::Number(text) => Ok(KeywordValue::Str(text.clone())),
            Expr::Quoted(segments) => {
                let mut text = String::new();
                for segment in segments {
                    match segment {
                        Segment::Text(s) => text.push_str(s),
                        Segment::Keyword(inner) => match self.eval(inner) {
                            Ok(value) => text.push_str(&value.to_string()),
                            Err(Failure::Assertion) => {}
                            Err(e) => return Err(e),
                        },
                    }
                }
                Ok(KeywordValue::Str(text))
            }
            Expr::Not(inner) => Ok(boolean(!self.eval(inner)?.is_truthy())),
            Expr::Binary(op, left, right) => self.binary(*op, left, right),
            Expr::Union(parts) => {
                let mut text = String::new();
                for part in parts {
                    text.push_str(&self.eval(part)?.to_string());
                }
                Ok(KeywordValue::Str(text))
            }
            Expr::Field(inner, name) => {
                let value = self.eval(inner)?;
                value.field(name).cloned().ok_or(Failure::Unresolved)
            }
            Expr::Index(inner, i) => index(self.eval(inner)?, *i),
            Expr::Method(inner, name, args) => {
                let value = self.eval(inner)?;
                self.method(value, name, args)
            }
        }
    }

    fn binary(&self, op: BinOp, left: &Expr, right: &Expr) -> Eval<KeywordValue> {
        match op {
            BinOp::And | BinOp::Or => {
                let l = self.eval(left)?.is_truthy();
                if l == (op == BinOp::Or) {
                    return Ok(boolean(l));
                }
                Ok(boolean(self.eval(right)?.is_truthy()))
            }
            BinOp::Eq | BinOp::Ne => {
                let same = self.eval(left)?.to_string() == self.eval(right)?.to_string();
                Ok(boolean(same == (op == BinOp::Eq)))
            }
            _ => {
                let l = number(&self.eval(left)?)?;
                let r = number(&self.eval(right)?)?;
                arithmetic(op, l, r)
            }
        }
    }

    /// Evaluate `lambda` with its keys bound to `item` and `position`.
    fn call(&self, lambda: &Lambda, item: KeywordValue, position: usize) -> Eval<KeywordValue> {
        let mut bindings = KeywordMap::new();
        if let Some(key) = lambda.keys.first() {
            bindings.insert(key.clone(), item);
        }
        if let Some(key) = lambda.keys.get(1) {
            bindings.insert(key.clone(), position.to_string());
        }
        let scope = KeywordStack::new().with(&bindings).with(self.keywords);
        Evaluator::new(&scope, self.orders).eval(&lambda.body)
    }

    fn text_arg(&self, args: &[Arg], i: usize) -> Eval<Option<String>> {
        match args.get(i) {
            None => Ok(None),
            Some(Arg::Expr(expr)) => Ok(Some(self.eval(expr)?.to_string())),
            Some(Arg::Lambda(_)) => Err(Failure::Unresolved),
        }
    }

    /// A bare identifier stands for itself; anything else is evaluated.
    fn name_or_text(&self, args: &[Arg], i: usize) -> Eval<(String, bool)> {
        match args.get(i) {
            Some(arg) => match arg.reference() {
                Some(name) => Ok((name.to_string(), true)),
                None => Ok((self.text_arg(args, i)?.ok_or(Failure::Unresolved)?, false)),
            },
            None => Err(Failure::Unresolved),
        }
    }

    fn int_arg(&self, args: &[Arg], i: usize) -> Eval<Option<usize>> {
        let Some(text) = self.text_arg(args, i)? else {
            return Ok(None);
        };
        let n: f64 = text.trim().parse().map_err(|_| Failure::Unresolved)?;
        if n < 0.0 || n.fract() != 0.0 {
            return Err(Failure::Unresolved);
        }
        Ok(Some(n as usize))
    }

    fn lambda_arg<'a>(&self, args: &'a [Arg]) -> Eval<&'a Lambda> {
        match args {
            [Arg::Lambda(lambda)] => Ok(lambda),
            _ => Err(Failure::Unresolved),
        }
    }

    fn method(&self, value: KeywordValue, name: &str, args: &[Arg]) -> Eval<KeywordValue> {
        let result = match name {
            "string" => KeywordValue::Str(value.to_string()),
            "type" => KeywordValue::from(value.type_name()),
            "count" => KeywordValue::Str(value.count().to_string()),
            "order" => {
                let index = self
                    .orders
                    .order_of(&value.to_string())
                    .ok_or(Failure::Unresolved)?;
                KeywordValue::Str(index.to_string())
            }
            "join" => {
                let sep = self.text_arg(args, 0)?.unwrap_or_default();
                match elements(&value) {
                    Some(items) => KeywordValue::Str(
                        items
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(&sep),
                    ),
                    None => KeywordValue::Str(value.to_string()),
                }
            }
            "split" => {
                if matches!(value, KeywordValue::Array(_)) {
                    return Err(Failure::Unresolved);
                }
                let text = value.to_string();
                let parts: Vec<KeywordValue> = match self.text_arg(args, 0)?.as_deref() {
                    None | Some(" ") => text.split_whitespace().map(KeywordValue::from).collect(),
                    Some("") => text.chars().map(|c| KeywordValue::Str(c.to_string())).collect(),
                    Some(sep) => text.split(sep).map(KeywordValue::from).collect(),
                };
                KeywordValue::Array(parts)
            }
            "contains" => {
                let needle = self.text_arg(args, 0)?.ok_or(Failure::Unresolved)?;
                let found = match &value {
                    KeywordValue::Array(items) => items.iter().any(|item| item.to_string() == needle),
                    KeywordValue::Object(fields) => fields
                        .iter()
                        .any(|(k, _)| *k == needle || *k == capitalize(&needle)),
                    other => other.to_string().contains(&needle),
                };
                boolean(found)
            }
            "repeat" => {
                let times = self.int_arg(args, 0)?.ok_or(Failure::Unresolved)?;
                let unit = match value {
                    KeywordValue::Array(items) => items,
                    other => vec![KeywordValue::Str(other.to_string())],
                };
                KeywordValue::Array(unit.iter().cloned().cycle().take(unit.len() * times).collect())
            }
            "reverse" => match value {
                KeywordValue::Array(mut items) => {
                    items.reverse();
                    KeywordValue::Array(items)
                }
                KeywordValue::Object(_) => return Err(Failure::Unresolved),
                other => KeywordValue::Str(other.to_string().chars().rev().collect()),
            },
            "slice" | "splice" => {
                let start = self.int_arg(args, 0)?.ok_or(Failure::Unresolved)?;
                let end = self.int_arg(args, 1)?;
                cut(value, start, end, name == "splice")?
            }
            "map" => {
                let lambda = self.lambda_arg(args)?;
                match value {
                    KeywordValue::Array(items) => KeywordValue::Array(
                        items
                            .into_iter()
                            .enumerate()
                            .map(|(i, item)| self.call(lambda, item, i))
                            .collect::<Eval<_>>()?,
                    ),
                    other => self.call(lambda, other, 0)?,
                }
            }
            "filter" => {
                let lambda = self.lambda_arg(args)?;
                match value {
                    KeywordValue::Array(_) | KeywordValue::Object(_) => {
                        let items = elements(&value).unwrap_or_default();
                        let mut kept = Vec::new();
                        for (i, item) in items.into_iter().enumerate() {
                            if self.call(lambda, item.clone(), i)?.is_truthy() {
                                kept.push(item);
                            }
                        }
                        KeywordValue::Array(kept)
                    }
                    other => {
                        let mut kept = String::new();
                        for (i, c) in other.to_string().chars().enumerate() {
                            let item = KeywordValue::Str(c.to_string());
                            if self.call(lambda, item, i)?.is_truthy() {
                                kept.push(c);
                            }
                        }
                        KeywordValue::Str(kept)
                    }
                }
            }
            "assert" => {
                let lambda = self.lambda_arg(args)?;
                let verdict = self.call(lambda, value.clone(), 0)?;
                let holds = match &verdict {
                    KeywordValue::Array(items) => items.iter().all(KeywordValue::is_truthy),
                    other => other.is_truthy(),
                };
                if !holds {
                    return Err(Failure::Assertion);
                }
                value
            }
            "select" => {
                let [arg] = args else {
                    return Err(Failure::Unresolved);
                };
                let key = arg.reference().ok_or(Failure::Unresolved)?;
                match &value {
                    KeywordValue::Template { fields, .. } => {
                        select(fields, key).ok_or(Failure::Unresolved)?
                    }
                    _ => return Err(Failure::Unresolved),
                }
            }
            "remove" => {
                let (target, _) = self.name_or_text(args, 0)?;
                remove(value, &target)
            }
            "replace" => {
                let (old, old_is_ref) = self.name_or_text(args, 0)?;
                let (new, new_is_ref) = self.name_or_text(args, 1)?;
                replace(value, (&old, old_is_ref), (&new, new_is_ref))
            }
            _ => return Err(Failure::Unresolved),
        };
        Ok(result)
    }
}

fn boolean(b: bool) -> KeywordValue {
    KeywordValue::Str(b.to_string())
}

fn number(value: &KeywordValue) -> Eval<f64> {
    value
        .to_string()
        .trim()
        .parse()
        .map_err(|_| Failure::Unresolved)
}

/// Comparisons and arithmetic. Shifts and remainder work on integers,
/// everything else on floats printed in their shortest form.
fn arithmetic(op: BinOp, l: f64, r: f64) -> Eval<KeywordValue> {
    let int = |n: Option<i64>| {
        n.map(|n| KeywordValue::Str(n.to_string()))
            .ok_or(Failure::Unresolved)
    };
    let float = |n: f64| {
        if n.is_finite() {
            Ok(KeywordValue::Str(n.to_string()))
        } else {
            Err(Failure::Unresolved)
        }
    };
    let (li, ri) = (l as i64, r as i64);
    match op {
        BinOp::Ge => Ok(boolean(l >= r)),
        BinOp::Gt => Ok(boolean(l > r)),
        BinOp::Le => Ok(boolean(l <= r)),
        BinOp::Lt => Ok(boolean(l < r)),
        BinOp::Shl => int(u32::try_from(ri).ok().and_then(|s| li.checked_shl(s))),
        BinOp::Shr => int(u32::try_from(ri).ok().and_then(|s| li.checked_shr(s))),
        BinOp::Rem => int(li.checked_rem(ri)),
        BinOp::Add => float(l + r),
        BinOp::Sub => float(l - r),
        BinOp::Mul => float(l * r),
        BinOp::Div => float(l / r),
        BinOp::Or | BinOp::And | BinOp::Eq | BinOp::Ne => Err(Failure::Unresolved),
    }
}

/// Items of an array, or the field values of an object.
fn elements(value: &KeywordValue) -> Option<Vec<KeywordValue>> {
    match value {
        KeywordValue::Array(items) => Some(items.clone()),
        KeywordValue::Object(fields) => Some(fields.iter().map(|(_, v)| v.clone()).collect()),
        _ => None,
    }
}

fn index(value: KeywordValue, i: usize) -> Eval<KeywordValue> {
    match value {
        KeywordValue::Array(mut items) if i < items.len() => Ok(items.swap_remove(i)),
        KeywordValue::Str(s) | KeywordValue::Template { found: s, .. } => s
            .chars()
            .nth(i)
            .map(|c| KeywordValue::Str(c.to_string()))
            .ok_or(Failure::Unresolved),
        _ => Err(Failure::Unresolved),
    }
}

/// `slice` keeps `start..end`; `splice` drops it. A missing end means the
/// end of the value.
fn cut(value: KeywordValue, start: usize, end: Option<usize>, splice: bool) -> Eval<KeywordValue> {
    fn pick<T: Clone>(items: &[T], start: usize, end: Option<usize>, splice: bool) -> Option<Vec<T>> {
        let end = end.unwrap_or(items.len());
        if start > end || end > items.len() {
            return None;
        }
        Some(if splice {
            items[..start].iter().chain(&items[end..]).cloned().collect()
        } else {
            items[start..end].to_vec()
        })
    }
    let kept = match value {
        KeywordValue::Array(items) => pick(&items, start, end, splice).map(KeywordValue::Array),
        KeywordValue::Object(_) => None,
        other => {
            let chars: Vec<char> = other.to_string().chars().collect();
            pick(&chars, start, end, splice).map(|kept| KeywordValue::Str(kept.into_iter().collect()))
        }
    };
    kept.ok_or(Failure::Unresolved)
}

// ─────────────────────────────────────────────────────────────────────
// Template values
// ─────────────────────────────────────────────────────────────────────

/// The first field named `key`, searched depth first.
fn select(fields: &[(String, KeywordValue)], key: &str) -> Option<KeywordValue> {
    fields.iter().find_map(|(name, value)| {
        if name == key {
            return Some(value.clone());
        }
        match value {
            KeywordValue::Template { fields, .. } => select(fields, key),
            _ => None,
        }
    })
}

/// Byte range of each field's text inside `found`, located left to right.
fn locate(found: &str, fields: &[(String, KeywordValue)]) -> Vec<Option<(usize, usize)>> {
    let mut from = 0;
    fields
        .iter()
        .map(|(_, value)| {
            let text = value.to_string();
            let at = found.get(from..)?.find(&text)? + from;
            from = at + text.len();
            Some((at, from))
        })
        .collect()
}

/// Drop the field named `key` together with its text.
fn remove_field(found: &mut String, fields: &mut Vec<(String, KeywordValue)>, key: &str) -> bool {
    let spans = locate(found, fields);
    for (i, span) in spans.into_iter().enumerate() {
        let Some((at, end)) = span else { continue };
        if fields[i].0 == key {
            found.replace_range(at..end, "");
            *found = tidy_code(found);
            fields.remove(i);
            return true;
        }
        if let KeywordValue::Template {
            found: inner,
            fields: nested,
        } = &mut fields[i].1
        {
            if remove_field(inner, nested, key) {
                found.replace_range(at..end, inner);
                *found = tidy_code(found);
                return true;
            }
        }
    }
    false
}

/// Give the field named `key` the text `new`.
fn replace_field(found: &mut String, fields: &mut [(String, KeywordValue)], key: &str, new: &str) -> bool {
    let spans = locate(found, fields);
    let mut changed = false;
    // Right to left, so earlier spans stay valid.
    for (i, span) in spans.into_iter().enumerate().rev() {
        let Some((at, end)) = span else { continue };
        let (name, value) = &mut fields[i];
        let hit = if name.as_str() == key {
            *value = KeywordValue::Str(new.to_string());
            true
        } else if let KeywordValue::Template {
            found: inner,
            fields: nested,
        } = &mut *value
        {
            replace_field(inner, nested, key, new)
        } else {
            false
        };
        if hit {
            found.replace_range(at..end, &value.to_string());
            changed = true;
        }
    }
    changed
}

/// Replace `old` with `new` inside the placeholder texts only.
fn replace_text(found: &mut String, fields: &mut [(String, KeywordValue)], old: &str, new: &str) -> bool {
    if fields.is_empty() {
        let replaced = found.replace(old, new);
        let changed = replaced != *found;
        *found = replaced;
        return changed;
    }
    let spans = locate(found, fields);
    let mut changed = false;
    for (i, span) in spans.into_iter().enumerate().rev() {
        let Some((at, end)) = span else { continue };
        let value = &mut fields[i].1;
        let hit = match &mut *value {
            KeywordValue::Template {
                found: inner,
                fields: nested,
            } => replace_text(inner, nested, old, new),
            KeywordValue::Str(s) => {
                let replaced = s.replace(old, new);
                let hit = replaced != *s;
                *s = replaced;
                hit
            }
            _ => false,
        };
        if hit {
            found.replace_range(at..end, &value.to_string());
            changed = true;
        }
    }
    changed
}

fn remove(value: KeywordValue, target: &str) -> KeywordValue {
    match value {
        KeywordValue::Template {
            mut found,
            mut fields,
        } => {
            remove_field(&mut found, &mut fields, target);
            KeywordValue::Template { found, fields }
        }
        KeywordValue::Array(items) => {
            KeywordValue::Array(items.into_iter().filter(|v| v.to_string() != target).collect())
        }
        KeywordValue::Object(fields) => {
            let capitalized = capitalize(target);
            KeywordValue::Object(
                fields
                    .into_iter()
                    .filter(|(k, _)| *k != target && *k != capitalized)
                    .collect(),
            )
        }
        KeywordValue::Str(s) if target.is_empty() => KeywordValue::Str(s),
        KeywordValue::Str(s) => KeywordValue::Str(s.replace(target, "")),
    }
}

/// `old` and `new` carry whether they were written as bare identifiers,
/// which on a template match name placeholders instead of text.
fn replace(value: KeywordValue, old: (&str, bool), new: (&str, bool)) -> KeywordValue {
    let (old, old_is_ref) = old;
    let (new, new_is_ref) = new;
    match value {
        KeywordValue::Template {
            mut found,
            mut fields,
        } => {
            let new = if new_is_ref {
                match select(&fields, new) {
                    Some(v) => v.to_string(),
                    None => return KeywordValue::Template { found, fields },
                }
            } else {
                new.to_string()
            };
            if old_is_ref {
                replace_field(&mut found, &mut fields, old, &new);
            } else if !old.is_empty() {
                replace_text(&mut found, &mut fields, old, &new);
            }
            KeywordValue::Template { found, fields }
        }
        KeywordValue::Array(items) => KeywordValue::Array(
            items
                .into_iter()
                .map(|v| {
                    if v.to_string() == old {
                        KeywordValue::from(new)
                    } else {
                        v
                    }
                })
                .collect(),
        ),
        KeywordValue::Object(fields) => {
            let capitalized = capitalize(old);
            KeywordValue::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| {
                        if k == old || k == capitalized {
                            (k, KeywordValue::from(new))
                        } else {
                            (k, v)
                        }
                    })
                    .collect(),
            )
        }
        KeywordValue::Str(s) if old.is_empty() => KeywordValue::Str(s),
        KeywordValue::Str(s) => KeywordValue::Str(s.replace(old, new)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add() -> KeywordValue {
        KeywordValue::Template {
            found: "(i32.add (local.get 0) (i32.const 1))".into(),
            fields: vec![
                ("x".into(), KeywordValue::from("(local.get 0)")),
                ("y".into(), KeywordValue::from("(i32.const 1)")),
            ],
        }
    }

    #[test]
    fn test_select_placeholder() {
        let KeywordValue::Template { fields, .. } = add() else {
            unreachable!()
        };
        assert_eq!(select(&fields, "y"), Some(KeywordValue::from("(i32.const 1)")));
        assert_eq!(select(&fields, "z"), None);
    }

    #[test]
    fn test_remove_placeholder_text() {
        let removed = remove(add(), "x");
        assert_eq!(removed.to_string(), "(i32.add (i32.const 1))");
        assert_eq!(removed.field("x"), None);
        assert_eq!(remove(add(), "z"), add());
    }

    #[test]
    fn test_replace_by_reference_and_text() {
        let swapped = replace(add(), ("x", true), ("y", true));
        assert_eq!(swapped.to_string(), "(i32.add (i32.const 1) (i32.const 1))");
        let literal = replace(add(), ("x", true), ("(local.get 7)", false));
        assert_eq!(literal.to_string(), "(i32.add (local.get 7) (i32.const 1))");
        // Text replacement only reaches placeholder text.
        let text = replace(add(), ("i32", false), ("i64", false));
        assert_eq!(text.to_string(), "(i32.add (local.get 0) (i64.const 1))");
    }

    #[test]
    fn test_nested_template_fields() {
        let inner = KeywordValue::Template {
            found: "(i32.mul (local.get 1) (local.get 2))".into(),
            fields: vec![
                ("a".into(), KeywordValue::from("(local.get 1)")),
                ("b".into(), KeywordValue::from("(local.get 2)")),
            ],
        };
        let outer = KeywordValue::Template {
            found: "(drop (i32.mul (local.get 1) (local.get 2)))".into(),
            fields: vec![("v".into(), inner)],
        };
        assert_eq!(
            replace(outer.clone(), ("b", true), ("(i32.const 3)", false)).to_string(),
            "(drop (i32.mul (local.get 1) (i32.const 3)))"
        );
        assert_eq!(remove(outer, "a").to_string(), "(drop (i32.mul (local.get 2)))");
    }

    #[test]
    fn test_arithmetic_formatting() {
        assert_eq!(arithmetic(BinOp::Mul, 24.5, 2.0), Ok(KeywordValue::from("49")));
        assert_eq!(arithmetic(BinOp::Div, 1.0, 4.0), Ok(KeywordValue::from("0.25")));
        assert_eq!(arithmetic(BinOp::Shl, 2.0, 2.0), Ok(KeywordValue::from("8")));
        assert_eq!(arithmetic(BinOp::Rem, 7.0, 2.0), Ok(KeywordValue::from("1")));
        assert_eq!(arithmetic(BinOp::Rem, 7.0, 0.0), Err(Failure::Unresolved));
        assert_eq!(arithmetic(BinOp::Div, 1.0, 0.0), Err(Failure::Unresolved));
    }

    #[test]
    fn test_cut() {
        let s = || KeywordValue::from("joao paulo");
        assert_eq!(cut(s(), 1, Some(6), false), Ok(KeywordValue::from("oao p")));
        assert_eq!(cut(s(), 1, Some(6), true), Ok(KeywordValue::from("jaulo")));
        assert_eq!(cut(s(), 2, None, true), Ok(KeywordValue::from("jo")));
        assert_eq!(cut(s(), 4, Some(2), false), Err(Failure::Unresolved));
    }
}
