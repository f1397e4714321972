//! Replacing join-point blocks with advice code.

use crate::error::{ModuleError, ModuleResult};
use crate::instr;
use crate::module::ModuleContext;
use crate::search::JoinPointBlock;
use crate::sexpr;
use crate::tree::{NodeId, Tree};

/// `true` when the children of `parent` are operands rather than
/// statements.
fn is_operand_parent(tree: &Tree, parent: NodeId) -> bool {
    !tree.head(parent).is_some_and(instr::is_container)
}

/// The ancestor of `node` that sits directly in a statement list, and
/// that list.
fn enclosing_statement(tree: &Tree, mut node: NodeId) -> Option<(NodeId, NodeId)> {
    loop {
        let parent = tree.parent(node)?;
        if tree.head(parent).is_some_and(instr::is_container) {
            return Some((parent, node));
        }
        node = parent;
    }
}

impl ModuleContext {
    /// Replace `block` with `code`.
    ///
    /// A function block gets a new body. Elsewhere the covered nodes are
    /// replaced in place. In `smart` mode, code of several instructions
    /// that lands in an operand position keeps only its last instruction
    /// there; the others are moved in front of the enclosing statement so
    /// that they run first.
    ///
    /// Returns `false` when the block is no longer part of its function,
    /// which happens once an enclosing block has been replaced.
    pub fn apply(&self, block: &JoinPointBlock, code: &str, smart: bool) -> ModuleResult<bool> {
        let function = block.function();
        let fail = |message: String| ModuleError::Apply {
            function: function.to_string(),
            message,
        };
        let f = self
            .function(function)
            .ok_or_else(|| ModuleError::UnknownFunction(function.to_string()))?;
        let exprs = sexpr::parse(code).map_err(|e| fail(e.to_string()))?;

        let mut body = f.lock();
        let func = body.func;
        if block.node() == func {
            let header = instr::header_len(&body.tree, func);
            body.tree.truncate_children(func, header);
            for expr in &exprs {
                let id = body.tree.graft(expr);
                body.tree.push_child(func, id);
            }
            return Ok(true);
        }

        if !body.tree.is_within(block.node(), func) {
            log::debug!("skipping detached join point in {function}");
            return Ok(false);
        }
        let Some((parent, index)) = body.tree.position(block.node()) else {
            return Err(fail("join point has no parent".into()));
        };

        let new: Vec<NodeId> = exprs.iter().map(|e| body.tree.graft(e)).collect();
        let units = instr::units(&body.tree, &new);
        let operand = is_operand_parent(&body.tree, parent);
        if units.len() <= 1 || !operand {
            body.tree.splice_children(parent, index, block.len(), &new);
            return Ok(true);
        }
        if !smart {
            log::warn!(
                "advice code of {} instructions replaces an operand of `{}` in {function}",
                units.len(),
                body.tree.head(parent).unwrap_or_default()
            );
            body.tree.splice_children(parent, index, block.len(), &new);
            return Ok(true);
        }

        let split = units.last().map_or(0, |u| u.start);
        let (hoisted, last) = new.split_at(split);
        body.tree.splice_children(parent, index, block.len(), last);
        let Some((list, statement)) = enclosing_statement(&body.tree, parent) else {
            return Err(fail("operand outside of any statement".into()));
        };
        let Some((_, at)) = body.tree.position(statement) else {
            return Err(fail("statement has no position".into()));
        };
        body.tree.insert_children(list, at, hoisted);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_keyword::KeywordMap;

    fn calls(m: &ModuleContext, symbol: &str) -> Vec<JoinPointBlock> {
        let block = m.function_block(symbol).unwrap();
        m.find_calls(&block, |_| Some(KeywordMap::new()))
    }

    #[test]
    fn test_replace_function_body() {
        let m = ModuleContext::parse("(module (func $f (param i32) (local i32) nop))").unwrap();
        let block = m.function_block("$f").unwrap();
        assert!(m.apply(&block, "unreachable", false).unwrap());
        assert_eq!(m.to_text(), "(module (func $f (param i32) (local i32) unreachable))");
    }

    #[test]
    fn test_replace_statement_with_several() {
        let m = ModuleContext::parse("(module (func $g) (func $f (call $g)))").unwrap();
        let found = calls(&m, "$f");
        m.apply(&found[0], "(nop) (call $g)", false).unwrap();
        assert_eq!(m.to_text(), "(module (func $g) (func $f (nop) (call $g)))");
    }

    #[test]
    fn test_smart_hoists_before_statement() {
        let m = ModuleContext::parse(
            "(module (func $g (result i32) i32.const 1) (func $f (drop (i32.add (call $g) (i32.const 2)))))",
        )
        .unwrap();
        let found = calls(&m, "$f");
        m.apply(&found[0], "(call $g) (drop) (call $g)", true).unwrap();
        assert_eq!(
            m.function("$f").unwrap().code(),
            "(call $g) (drop) (drop (i32.add (call $g) (i32.const 2)))"
        );
    }

    #[test]
    fn test_plain_operand_replacement() {
        let m = ModuleContext::parse("(module (func $g (result i32) i32.const 1) (func $f (drop (call $g))))")
            .unwrap();
        let found = calls(&m, "$f");
        m.apply(&found[0], "(i32.const 0) (i32.const 1)", false).unwrap();
        assert_eq!(m.function("$f").unwrap().code(), "(drop (i32.const 0) (i32.const 1))");
    }

    #[test]
    fn test_detached_block_is_skipped() {
        let m = ModuleContext::parse("(module (func $g (param i32) (result i32) local.get 0) (func $f (drop (call $g (call $g (i32.const 1))))))")
            .unwrap();
        let found = calls(&m, "$f");
        assert_eq!(found.len(), 2);
        assert!(m.apply(&found[0], "(i32.const 9)", false).unwrap());
        assert!(!m.apply(&found[1], "(i32.const 8)", false).unwrap());
        assert_eq!(m.function("$f").unwrap().code(), "(drop (i32.const 9))");
    }

    #[test]
    fn test_bad_code_reports_function() {
        let m = ModuleContext::parse("(module (func $f nop))").unwrap();
        let block = m.function_block("$f").unwrap();
        let err = m.apply(&block, "(nop", false).unwrap_err();
        assert!(matches!(err, ModuleError::Apply { ref function, .. } if function == "$f"));
    }
}
