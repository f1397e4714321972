//! Arena tree holding one module field.
//!
//! Nodes are never freed: a replaced node is detached from its parent and
//! stays in the arena, so every `NodeId` handed out stays valid. Node
//! identity is what join-point blocks compare.

use crate::sexpr::SExpr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    List,
    Atom(String),
    Str(String),
    Keyword(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: Vec<NodeData>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from `expr`; returns the tree and its root.
    pub fn from_sexpr(expr: &SExpr) -> (Self, NodeId) {
        let mut tree = Self::new();
        let root = tree.graft(expr);
        (tree, root)
    }

    /// Copy `expr` into the arena as a detached subtree.
    pub fn graft(&mut self, expr: &SExpr) -> NodeId {
        let kind = match expr {
            SExpr::List(_) => NodeKind::List,
            SExpr::Atom(s) => NodeKind::Atom(s.clone()),
            SExpr::Str(s) => NodeKind::Str(s.clone()),
            SExpr::Keyword(s) => NodeKind::Keyword(s.clone()),
        };
        let id = self.alloc(kind);
        for item in expr.items() {
            let child = self.graft(item);
            self.nodes[child.index()].parent = Some(id);
            self.nodes[id.index()].children.push(child);
        }
        id
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    pub fn is_list(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::List)
    }

    pub fn atom(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Atom(s) => Some(s),
            _ => None,
        }
    }

    /// Atom or keyword text of a leaf.
    pub fn leaf_text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Atom(s) | NodeKind::Str(s) | NodeKind::Keyword(s) => Some(s),
            NodeKind::List => None,
        }
    }

    /// Leading atom of a list node.
    pub fn head(&self, id: NodeId) -> Option<&str> {
        if !self.is_list(id) {
            return None;
        }
        self.children(id).first().and_then(|c| self.atom(*c))
    }

    /// Index of `id` among its parent's children.
    pub fn position(&self, id: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.parent(id)?;
        let index = self.children(parent).iter().position(|c| *c == id)?;
        Some((parent, index))
    }

    /// `true` when `id` is `ancestor` or lies below it.
    pub fn is_within(&self, mut id: NodeId, ancestor: NodeId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.parent(id) {
                Some(p) => id = p,
                None => return false,
            }
        }
    }

    /// Number of ancestors between `id` and `top`.
    pub fn depth_below(&self, mut id: NodeId, top: NodeId) -> usize {
        let mut depth = 0;
        while id != top {
            match self.parent(id) {
                Some(p) => {
                    id = p;
                    depth += 1;
                }
                None => break,
            }
        }
        depth
    }

    /// Child indices leading from `top` down to `id`, for document ordering.
    pub fn path_from(&self, id: NodeId, top: NodeId) -> Vec<usize> {
        let mut path = Vec::new();
        let mut cur = id;
        while cur != top {
            match self.position(cur) {
                Some((parent, index)) => {
                    path.push(index);
                    cur = parent;
                }
                None => break,
            }
        }
        path.reverse();
        path
    }

    /// Pre-order list of `id` and every node below it.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev());
        }
        out
    }

    pub fn push_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(child);
    }

    /// Insert `new` before position `index` of `parent`.
    pub fn insert_children(&mut self, parent: NodeId, index: usize, new: &[NodeId]) {
        for n in new {
            self.nodes[n.index()].parent = Some(parent);
        }
        let children = &mut self.nodes[parent.index()].children;
        let at = index.min(children.len());
        children.splice(at..at, new.iter().copied());
    }

    /// Replace `len` children of `parent` starting at `index` with `new`.
    /// The removed nodes are detached.
    pub fn splice_children(&mut self, parent: NodeId, index: usize, len: usize, new: &[NodeId]) {
        let end = (index + len).min(self.children(parent).len());
        let removed: Vec<NodeId> = self.nodes[parent.index()]
            .children
            .splice(index..end, new.iter().copied())
            .collect();
        for r in removed {
            if !new.contains(&r) {
                self.nodes[r.index()].parent = None;
            }
        }
        for n in new {
            self.nodes[n.index()].parent = Some(parent);
        }
    }

    /// Drop every child of `parent` from position `index` on.
    pub fn truncate_children(&mut self, parent: NodeId, index: usize) {
        let len = self.children(parent).len().saturating_sub(index);
        self.splice_children(parent, index, len, &[]);
    }

    /// Owned copy of the subtree at `id`.
    pub fn to_sexpr(&self, id: NodeId) -> SExpr {
        match self.kind(id) {
            NodeKind::List => SExpr::List(self.children(id).iter().map(|c| self.to_sexpr(*c)).collect()),
            NodeKind::Atom(s) => SExpr::Atom(s.clone()),
            NodeKind::Str(s) => SExpr::Str(s.clone()),
            NodeKind::Keyword(s) => SExpr::Keyword(s.clone()),
        }
    }

    /// Compact text of the subtree at `id`.
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_text(id, &mut out);
        out
    }

    /// Compact text of several nodes, separated by single spaces.
    pub fn text_of(&self, ids: &[NodeId]) -> String {
        let mut out = String::new();
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            self.write_text(*id, &mut out);
        }
        out
    }

    fn write_text(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::Atom(s) | NodeKind::Str(s) | NodeKind::Keyword(s) => out.push_str(s),
            NodeKind::List => {
                out.push('(');
                for (i, c) in self.children(id).iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    self.write_text(*c, out);
                }
                out.push(')');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sexpr;

    fn tree(text: &str) -> (Tree, NodeId) {
        let exprs = sexpr::parse(text).unwrap();
        Tree::from_sexpr(&exprs[0])
    }

    #[test]
    fn test_round_trip_text() {
        let (t, root) = tree("(func $f (drop (i32.const 1)))");
        assert_eq!(t.text(root), "(func $f (drop (i32.const 1)))");
        assert_eq!(t.to_sexpr(root).to_string(), t.text(root));
    }

    #[test]
    fn test_positions_and_paths() {
        let (t, root) = tree("(func $f (drop (i32.const 1)))");
        let drop = t.children(root)[2];
        let konst = t.children(drop)[1];
        assert_eq!(t.head(drop), Some("drop"));
        assert_eq!(t.position(konst), Some((drop, 1)));
        assert_eq!(t.path_from(konst, root), vec![2, 1]);
        assert_eq!(t.depth_below(konst, root), 2);
        assert!(t.is_within(konst, drop));
        assert!(!t.is_within(drop, konst));
    }

    #[test]
    fn test_splice_keeps_other_ids() {
        let (mut t, root) = tree("(func (nop) (drop (i32.const 1)) (nop))");
        let drop = t.children(root)[2];
        let last = t.children(root)[3];
        let new = t.graft(&SExpr::list([SExpr::atom("unreachable")]));
        t.splice_children(root, 1, 1, &[new]);
        assert_eq!(t.text(root), "(func (unreachable) (drop (i32.const 1)) (nop))");
        assert_eq!(t.position(drop), Some((root, 2)));
        assert_eq!(t.position(last), Some((root, 3)));
    }

    #[test]
    fn test_detached_nodes_lose_parent() {
        let (mut t, root) = tree("(func (nop) (nop))");
        let first = t.children(root)[1];
        t.truncate_children(root, 1);
        assert_eq!(t.parent(first), None);
        assert_eq!(t.text(root), "(func)");
    }
}
