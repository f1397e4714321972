//! Keywords derived from template search results.

use weave_template::SearchValue;

use crate::map::KeywordMap;
use crate::value::KeywordValue;

/// Build the keywords of one join-point from its template matches.
///
/// Each template name maps to a template value whose fields are its
/// placeholders, and each placeholder name also maps directly to its
/// matched text. The first match of a template wins, as does the first
/// template to bind a placeholder name.
pub fn template_keywords(results: &[SearchValue]) -> KeywordMap {
    let mut keywords = KeywordMap::new();
    for result in results {
        if keywords.contains(&result.templ) {
            continue;
        }
        let Some(iteration) = result.iterations.first() else {
            continue;
        };
        let fields = placeholder_fields(&result.templ, &iteration.values);
        for (name, value) in &fields {
            if !keywords.contains(name) {
                keywords.insert(name.clone(), KeywordValue::Str(value.to_string()));
            }
        }
        keywords.insert(
            result.templ.clone(),
            KeywordValue::Template {
                found: iteration.found.clone(),
                fields,
            },
        );
    }
    keywords
}

/// Fields for the placeholders `templ` bound. A placeholder that also
/// matched nested templates becomes a template value keyed by them.
fn placeholder_fields(templ: &str, values: &[SearchValue]) -> Vec<(String, KeywordValue)> {
    let mut fields: Vec<(String, KeywordValue)> = Vec::new();
    for value in values.iter().filter(|v| v.templ == templ) {
        if fields.iter().any(|(k, _)| *k == value.key) {
            continue;
        }
        let Some(iteration) = value.iterations.first() else {
            continue;
        };
        let nested: Vec<(String, KeywordValue)> = iteration
            .values
            .iter()
            .filter_map(|child| {
                let inner = child.iterations.first()?;
                Some((
                    child.templ.clone(),
                    KeywordValue::Template {
                        found: inner.found.clone(),
                        fields: placeholder_fields(&child.templ, &inner.values),
                    },
                ))
            })
            .collect();
        let field = if nested.is_empty() {
            KeywordValue::Str(iteration.found.clone())
        } else {
            KeywordValue::Template {
                found: iteration.found.clone(),
                fields: nested,
            }
        };
        fields.push((value.key.clone(), field));
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_template::SearchIteration;

    fn add_match() -> SearchValue {
        let x = SearchValue::new("x", "Add", vec![SearchIteration::new("(local.get 0)", vec![])]);
        let y = SearchValue::new("y", "Add", vec![SearchIteration::new("(i32.const 1)", vec![])]);
        SearchValue::new(
            "Add",
            "Add",
            vec![SearchIteration::new("(i32.add (local.get 0) (i32.const 1))", vec![x, y])],
        )
    }

    #[test]
    fn test_template_and_placeholder_keywords() {
        let keywords = template_keywords(&[add_match()]);
        let add = keywords.get("Add").unwrap();
        assert_eq!(add.to_string(), "(i32.add (local.get 0) (i32.const 1))");
        assert_eq!(add.field("y"), Some(&KeywordValue::from("(i32.const 1)")));
        assert_eq!(keywords.get("x"), Some(&KeywordValue::from("(local.get 0)")));
    }

    #[test]
    fn test_first_match_wins() {
        let mut second = add_match();
        second.iterations[0].found = "(i32.add (local.get 5) (local.get 6))".into();
        let keywords = template_keywords(&[add_match(), second]);
        assert_eq!(
            keywords.get("Add").map(ToString::to_string).as_deref(),
            Some("(i32.add (local.get 0) (i32.const 1))")
        );
    }

    #[test]
    fn test_empty_results() {
        assert!(template_keywords(&[]).is_empty());
    }
}
