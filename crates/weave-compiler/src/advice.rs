//! The advice list: selected, compiled and put in weaving order.

use weave_pointcut::ParsedPointcut;
use weave_template::TemplateSet;
use weave_types::description::{AdviceSpec, OrderedMap};
use weave_types::Result;

use crate::options::WeaveOptions;

/// An advice whose pointcut is compiled.
#[derive(Debug, Clone)]
pub struct Advice {
    pub name: String,
    pub spec: AdviceSpec,
    pub pointcut: ParsedPointcut,
}

impl Advice {
    pub fn order(&self) -> Option<i64> {
        self.spec.order
    }
}

/// Compile the advices `options` selects, in document order. Advices with
/// an empty pointcut are skipped with a warning.
pub fn compile_advices(
    advices: &OrderedMap<AdviceSpec>,
    pointcuts: &OrderedMap<String>,
    templates: &TemplateSet,
    options: &WeaveOptions,
) -> Result<Vec<Advice>> {
    let mut out = Vec::new();
    for (name, spec) in advices.iter().filter(|(name, _)| options.selects(name)) {
        if spec.pointcut.trim().is_empty() {
            log::warn!("advice '{name}': pointcut not defined, skipping advice");
            continue;
        }
        let pointcut = ParsedPointcut::parse(&spec.pointcut, pointcuts, templates)
            .map_err(|e| e.within(format!("pointcut of advice '{name}'")))?;
        log::trace!("advice '{name}': {pointcut}");
        out.push(Advice {
            name: name.to_string(),
            spec: spec.clone(),
            pointcut,
        });
    }
    Ok(out)
}

/// Advices with an `order` first, ascending; ties and unordered advices
/// keep their input order.
pub fn sort_advices(advices: &mut [Advice]) {
    advices.sort_by_key(|a| (a.order().is_none(), a.order()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(order: Option<i64>) -> AdviceSpec {
        AdviceSpec {
            pointcut: "() => func(* *(..))".into(),
            advice: "%this%".into(),
            order,
            ..AdviceSpec::default()
        }
    }

    fn names(advices: &[Advice]) -> Vec<&str> {
        advices.iter().map(|a| a.name.as_str()).collect()
    }

    fn compile(entries: Vec<(&str, AdviceSpec)>, options: &WeaveOptions) -> Vec<Advice> {
        let advices: OrderedMap<AdviceSpec> = entries.into_iter().collect();
        compile_advices(&advices, &OrderedMap::new(), &TemplateSet::new(), options).unwrap()
    }

    #[test]
    fn test_sort_is_stable_with_unordered_last() {
        let mut advices = compile(
            vec![
                ("u1", spec(None)),
                ("two", spec(Some(2))),
                ("one_a", spec(Some(1))),
                ("u2", spec(None)),
                ("one_b", spec(Some(1))),
            ],
            &WeaveOptions::default(),
        );
        sort_advices(&mut advices);
        assert_eq!(names(&advices), vec!["one_a", "one_b", "two", "u1", "u2"]);
    }

    #[test]
    fn test_negative_orders_come_first() {
        let mut advices = compile(vec![("a", spec(Some(0))), ("b", spec(Some(-3)))], &WeaveOptions::default());
        sort_advices(&mut advices);
        assert_eq!(names(&advices), vec!["b", "a"]);
    }

    #[test]
    fn test_empty_pointcut_and_filters_skip() {
        let options = WeaveOptions {
            exclude: vec!["dropped".into()],
            ..WeaveOptions::default()
        };
        let empty = AdviceSpec {
            pointcut: "   ".into(),
            ..AdviceSpec::default()
        };
        let advices = compile(
            vec![("kept", spec(None)), ("empty", empty), ("dropped", spec(None))],
            &options,
        );
        assert_eq!(names(&advices), vec!["kept"]);
    }

    #[test]
    fn test_bad_pointcut_names_the_advice() {
        let advices: OrderedMap<AdviceSpec> = [(
            "broken",
            AdviceSpec {
                pointcut: "() => func(".into(),
                ..AdviceSpec::default()
            },
        )]
        .into_iter()
        .collect();
        let err =
            compile_advices(&advices, &OrderedMap::new(), &TemplateSet::new(), &WeaveOptions::default()).unwrap_err();
        assert_eq!(err.context.as_deref(), Some("pointcut of advice 'broken'"));
    }
}
