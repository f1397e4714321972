//! Small text utilities shared by the template, keyword and module crates.

/// Collapse every whitespace run into a single space and trim both ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// [`collapse_whitespace`], then drop the spaces just inside parentheses.
pub fn tidy_code(s: &str) -> String {
    collapse_whitespace(s).replace("( ", "(").replace(" )", ")")
}

/// Upper-case the first character.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Strip one pair of surrounding double quotes, if present.
pub fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(
            collapse_whitespace("  (i32.add\n\t(local.get 0)   (i32.const 1)) "),
            "(i32.add (local.get 0) (i32.const 1))"
        );
    }

    #[test]
    fn test_tidy_code() {
        assert_eq!(
            tidy_code("(i32.add  (local.get 0) )"),
            "(i32.add (local.get 0))"
        );
        assert_eq!(tidy_code("( drop )"), "(drop)");
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("callee"), "Callee");
        assert_eq!(capitalize(""), "");
        assert_eq!(capitalize("Name"), "Name");
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"env\""), "env");
        assert_eq!(unquote("env"), "env");
        assert_eq!(unquote("\""), "\"");
    }
}
