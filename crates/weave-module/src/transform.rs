//! Fix-ups queued by mutations and run once weaving is done.

use crate::module::{Field, ModuleContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeTransform {
    /// Move import fields ahead of every function definition.
    HoistImports,
    /// Remove a generated start function that received no code.
    DropEmptyStart,
}

impl ModuleContext {
    /// Queue `transform`; queuing it again has no effect.
    pub fn queue_transform(&mut self, transform: RuntimeTransform) {
        if !self.transforms.contains(&transform) {
            self.transforms.push(transform);
        }
    }

    pub fn pending_transforms(&self) -> &[RuntimeTransform] {
        &self.transforms
    }

    /// Run every queued transform. Each is idempotent, so running the
    /// queue again leaves the module unchanged.
    pub fn apply_runtime_transforms(&mut self) {
        for transform in self.transforms.clone() {
            match transform {
                RuntimeTransform::HoistImports => self.hoist_imports(),
                RuntimeTransform::DropEmptyStart => self.drop_empty_start(),
            }
        }
    }

    fn is_import_field(&self, field: &Field) -> bool {
        match field {
            Field::Function(i) => self.functions[*i].is_imported(),
            Field::Other(e) => e.head() == Some("import"),
        }
    }

    fn is_definition_field(&self, field: &Field) -> bool {
        match field {
            Field::Function(i) => !self.functions[*i].is_imported(),
            Field::Other(e) => matches!(e.head(), Some("func" | "table" | "memory" | "global")),
        }
    }

    fn hoist_imports(&mut self) {
        let Some(first_def) = self.fields.iter().position(|f| self.is_definition_field(f)) else {
            return;
        };
        let late: Vec<usize> = (first_def..self.fields.len())
            .filter(|i| self.is_import_field(&self.fields[*i]))
            .collect();
        if late.is_empty() {
            return;
        }
        let mut moved = Vec::with_capacity(late.len());
        for i in late.iter().rev() {
            moved.push(self.fields.remove(*i));
        }
        moved.reverse();
        log::debug!("hoisted {} import field(s)", moved.len());
        self.fields.splice(first_def..first_def, moved);
        self.reindex();
    }

    fn drop_empty_start(&mut self) {
        let Some(symbol) = self.synthesized_start.clone() else {
            return;
        };
        let Some(pos) = self.by_symbol.get(&symbol).copied() else {
            return;
        };
        let empty = self.functions[pos].lock().body_nodes().is_empty();
        if !empty {
            return;
        }
        self.fields.retain(|f| match f {
            Field::Function(i) => *i != pos,
            Field::Other(e) => {
                !(e.head() == Some("start") && e.items().get(1).and_then(|s| s.as_atom()) == Some(symbol.as_str()))
            }
        });
        self.start = None;
        self.synthesized_start = None;
        self.reindex();
        log::debug!("dropped empty start function {symbol}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_types::description::{FunctionSpec, ImportSpec};

    #[test]
    fn test_hoist_moves_late_imports() {
        let mut m = ModuleContext::parse(
            "(module (func $a) (import \"env\" \"g\" (global $g i32)) (import \"env\" \"f\" (func $f)))",
        )
        .unwrap();
        m.queue_transform(RuntimeTransform::HoistImports);
        m.queue_transform(RuntimeTransform::HoistImports);
        assert_eq!(m.pending_transforms().len(), 1);
        m.apply_runtime_transforms();
        let once = m.to_text();
        assert_eq!(
            once,
            "(module (import \"env\" \"g\" (global $g i32)) (import \"env\" \"f\" (func $f)) (func $a))"
        );
        m.apply_runtime_transforms();
        assert_eq!(m.to_text(), once);
    }

    #[test]
    fn test_empty_generated_start_is_dropped() {
        let mut m = ModuleContext::parse("(module (func $main))").unwrap();
        m.add_start_function().unwrap();
        m.apply_runtime_transforms();
        assert_eq!(m.start_function(), None);
        assert!(!m.to_text().contains("start"));
        assert_eq!(m.function_count(), 1);
    }

    #[test]
    fn test_used_generated_start_is_kept() {
        let mut m = ModuleContext::parse("(module)").unwrap();
        let s = m.add_start_function().unwrap();
        m.append_code(&s, "nop").unwrap();
        m.apply_runtime_transforms();
        assert_eq!(m.start_function(), Some(s.as_str()));
    }

    #[test]
    fn test_added_import_is_valid_order() {
        let mut m = ModuleContext::parse("(module (func $a))").unwrap();
        let spec = FunctionSpec {
            imported: Some(ImportSpec {
                module: "env".into(),
                field: "f".into(),
            }),
            ..FunctionSpec::default()
        };
        m.add_function(&spec).unwrap();
        m.apply_runtime_transforms();
        let text = m.to_text();
        assert!(text.find("(import").unwrap() < text.find("(func $a").unwrap());
    }
}
