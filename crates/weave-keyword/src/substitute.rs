//! The keyword substitution lexer.
//!
//! Advice text is copied through unchanged except for `%…%` keywords
//! (see [`crate::expr`] for their grammar). `%%` is a literal `%`, and a
//! `%` that does not open a keyword is copied.

use crate::eval::{Evaluator, Failure};
use crate::expr::parse_keyword;
use crate::map::{FunctionOrders, KeywordStack};

/// Replace every resolvable keyword in `code`.
///
/// A keyword whose name is unknown, or whose accessors fail on the value,
/// is left as written so a later pass can still resolve it. A keyword
/// whose `assert` fails prints nothing.
pub fn substitute(code: &str, keywords: &KeywordStack<'_>, orders: &dyn FunctionOrders) -> String {
    let chars: Vec<char> = code.chars().collect();
    let evaluator = Evaluator::new(keywords, orders);
    let mut out = String::with_capacity(code.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        if chars.get(i + 1) == Some(&'%') {
            out.push('%');
            i += 2;
            continue;
        }
        match parse_keyword(&chars, i + 1) {
            Some((expr, end)) => {
                match evaluator.eval(&expr) {
                    Ok(value) => out.push_str(&value.to_string()),
                    Err(Failure::Assertion) => {}
                    Err(Failure::Unresolved) => out.extend(&chars[i..end]),
                }
                i = end;
            }
            None => {
                out.push('%');
                i += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_order_method() {
        let orders: HashMap<String, u32> = [("$log".to_string(), 3)].into_iter().collect();
        let map: crate::KeywordMap = [("f", "$log")].into_iter().collect();
        let stack = KeywordStack::new().with(&map);
        assert_eq!(substitute("(call %f:order%)", &stack, &orders), "(call 3)");
        assert_eq!(substitute("%g:order%", &stack, &orders), "%g:order%");
    }

    #[test]
    fn test_failed_assert_prints_nothing() {
        let map: crate::KeywordMap = [("v", "1")].into_iter().collect();
        let stack = KeywordStack::new().with(&map);
        let orders = HashMap::new();
        assert_eq!(
            substitute("(a %v:assert((x) => x == 2)%)", &stack, &orders),
            "(a )"
        );
        assert_eq!(
            substitute("(a %v:assert((x) => x == 1)%)", &stack, &orders),
            "(a 1)"
        );
    }
}
