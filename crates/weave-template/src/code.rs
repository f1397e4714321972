//! Canonical instruction text.
//!
//! Template matches are compared as text, so every piece of code that takes
//! part in a comparison is first brought to one canonical spelling.

/// Canonical form of WebAssembly text.
///
/// Drops `;;` and `(; ;)` comments, collapses whitespace runs to a single
/// space, removes whitespace right after `(` and right before `)` and trims
/// both ends. String literals are copied untouched.
pub fn clear_code(code: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    let mut out = String::with_capacity(code.len());
    let mut pending_space = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ';' if chars.get(i + 1) == Some(&';') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                pending_space = true;
                continue;
            }
            '(' if chars.get(i + 1) == Some(&';') => {
                let mut depth = 0usize;
                while i < chars.len() {
                    if chars[i] == '(' && chars.get(i + 1) == Some(&';') {
                        depth += 1;
                        i += 2;
                    } else if chars[i] == ';' && chars.get(i + 1) == Some(&')') {
                        depth -= 1;
                        i += 2;
                        if depth == 0 {
                            break;
                        }
                    } else {
                        i += 1;
                    }
                }
                pending_space = true;
                continue;
            }
            c if c.is_whitespace() => {
                pending_space = true;
                i += 1;
                continue;
            }
            _ => {}
        }

        if pending_space && !out.is_empty() && !out.ends_with('(') && c != ')' {
            out.push(' ');
        }
        pending_space = false;

        if c == '"' {
            let end = string_end(&chars, i);
            out.extend(&chars[i..end]);
            i = end;
            continue;
        }
        out.push(c);
        i += 1;
    }
    out
}

/// Index one past the closing quote of the string literal opening at `start`.
/// An unterminated literal runs to the end of the text.
pub(crate) fn string_end(chars: &[char], start: usize) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '"' => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

/// Number of top-level parenthesized groups in `code`.
///
/// A stray `)` never drives the depth below zero, and text outside of
/// parentheses is not counted.
pub fn count_instructions(code: &str) -> usize {
    let mut count = 0;
    let mut depth = 0usize;
    for c in code.chars() {
        match c {
            '(' => {
                if depth == 0 {
                    count += 1;
                }
                depth += 1;
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_code_collapses_whitespace() {
        assert_eq!(
            clear_code("  ( i32.add\n\t(local.get 0)   ( i32.const 1 ) ) "),
            "(i32.add (local.get 0) (i32.const 1))"
        );
    }

    #[test]
    fn test_clear_code_drops_comments() {
        assert_eq!(
            clear_code("(drop ;; gone\n (i32.const 1)) (; block (; nested ;) ;) nop"),
            "(drop (i32.const 1)) nop"
        );
    }

    #[test]
    fn test_clear_code_keeps_strings() {
        assert_eq!(
            clear_code("(data \"a  ;; (b) \\\" c\")"),
            "(data \"a  ;; (b) \\\" c\")"
        );
    }

    #[test]
    fn test_count_instructions() {
        assert_eq!(count_instructions("(i32.add (local.get 0) (i32.const 1))"), 1);
        assert_eq!(count_instructions("(i32.const 0)(drop) %this%"), 2);
        assert_eq!(count_instructions("local.get 0"), 0);
        assert_eq!(count_instructions(")) (nop)"), 1);
    }
}
