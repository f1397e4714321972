//! Instruction-level views over function bodies.
//!
//! Bodies mix folded instructions, which are lists, with flat ones, which
//! are an instruction atom followed by its immediates. A *unit* is one
//! instruction in either form: a single list, or an atom plus the
//! immediates that follow it.

use std::ops::Range;

use crate::tree::{NodeId, NodeKind, Tree};

/// Lists whose children are statements rather than operands.
const CONTAINERS: &[&str] = &["func", "block", "loop", "then", "else"];

/// Header items of a `func` field.
const HEADER_ITEMS: &[&str] = &["export", "import", "type", "param", "result", "local"];

/// Lists that act as immediates of the atom before them.
const IMMEDIATE_LISTS: &[&str] = &["type", "param", "result"];

pub fn is_container(name: &str) -> bool {
    CONTAINERS.contains(&name)
}

/// Number of leading header children of a `func` list, counting the `func`
/// atom itself.
pub fn header_len(tree: &Tree, func: NodeId) -> usize {
    let children = tree.children(func);
    let mut i = 1;
    if children
        .get(1)
        .and_then(|c| tree.atom(*c))
        .is_some_and(|a| a.starts_with('$'))
    {
        i = 2;
    }
    while let Some(c) = children.get(i) {
        match tree.head(*c) {
            Some(h) if HEADER_ITEMS.contains(&h) => i += 1,
            _ => break,
        }
    }
    i
}

fn is_immediate(tree: &Tree, id: NodeId) -> bool {
    match tree.kind(id) {
        NodeKind::Str(_) | NodeKind::Keyword(_) => true,
        NodeKind::List => tree.head(id).is_some_and(|h| IMMEDIATE_LISTS.contains(&h)),
        NodeKind::Atom(a) => {
            a.starts_with(|c: char| c == '$' || c == '-' || c == '+' || c.is_ascii_digit())
                || a.contains('=')
                || a == "nan"
                || a == "inf"
                || a.starts_with("nan:")
        }
    }
}

/// Split `nodes` into instruction units, as ranges of positions.
pub fn units(tree: &Tree, nodes: &[NodeId]) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < nodes.len() {
        let start = i;
        i += 1;
        if matches!(tree.kind(nodes[start]), NodeKind::Atom(_)) {
            while i < nodes.len() && is_immediate(tree, nodes[i]) {
                i += 1;
            }
        }
        out.push(start..i);
    }
    out
}

/// Name of the instruction a unit starts with.
pub fn unit_name<'t>(tree: &'t Tree, nodes: &[NodeId], unit: &Range<usize>) -> Option<&'t str> {
    let first = *nodes.get(unit.start)?;
    tree.atom(first).or_else(|| tree.head(first))
}
