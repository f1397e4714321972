//! Join-point blocks and the searches that find them.
//!
//! A block names a run of sibling nodes in one function: `len` nodes
//! starting at `node`. A block whose node is the `func` list itself stands
//! for the whole function. Searches never mutate the module, except that
//! a `returns` search gives a void function its explicit trailing `return`.

use std::collections::HashMap;

use weave_keyword::{KeywordMap, KeywordValue};
use weave_types::text::capitalize;

use crate::function::FunctionBody;
use crate::info::{ArgInfo, CallInfo, FunctionInfo, ReturnInfo};
use crate::instr;
use crate::module::ModuleContext;
use crate::sexpr;
use crate::tree::{NodeId, Tree};

#[derive(Debug, Clone)]
pub struct JoinPointBlock {
    function: String,
    node: NodeId,
    len: usize,
    depth: usize,
    /// Bindings gathered by the searches that produced this block.
    pub metadata: KeywordMap,
}

/// Blocks are the same join point when they start at the same node.
impl PartialEq for JoinPointBlock {
    fn eq(&self, other: &Self) -> bool {
        self.function == other.function && self.node == other.node
    }
}

impl JoinPointBlock {
    fn new(function: impl Into<String>, node: NodeId, len: usize, depth: usize) -> Self {
        Self {
            function: function.into(),
            node,
            len,
            depth,
            metadata: KeywordMap::new(),
        }
    }

    /// Symbol of the function holding the block.
    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Number of sibling nodes covered.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Nesting depth below the `func` list; `0` for a whole function.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_function(&self) -> bool {
        self.depth == 0
    }

    pub fn with_metadata(mut self, metadata: KeywordMap) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Keep the first of every set of identical blocks.
pub fn remove_duplicates(blocks: Vec<JoinPointBlock>) -> Vec<JoinPointBlock> {
    let mut out: Vec<JoinPointBlock> = Vec::with_capacity(blocks.len());
    for block in blocks {
        if !out.contains(&block) {
            out.push(block);
        }
    }
    out
}

fn found_metadata(key: &str, value: KeywordValue, env: KeywordMap) -> KeywordMap {
    let mut metadata = KeywordMap::new();
    metadata.insert(key, value);
    let env: KeywordMap = env.iter().map(|(k, v)| (capitalize(k), v.clone())).collect();
    metadata.join(&env);
    metadata
}

/// Nodes covered by `block`, or `None` when it is no longer attached.
fn region(body: &FunctionBody, block: &JoinPointBlock) -> Option<Vec<NodeId>> {
    if block.node == body.func {
        return Some(body.body_nodes());
    }
    if !body.tree.is_within(block.node, body.func) {
        return None;
    }
    let (parent, index) = body.tree.position(block.node)?;
    let children = body.tree.children(parent);
    let end = (index + block.len).min(children.len());
    Some(children[index..end].to_vec())
}

/// Every instruction sequence in a region: the region itself, then the
/// children of each list below it, paired with the list they belong to.
fn sequences(tree: &Tree, roots: &[NodeId]) -> Vec<(Option<NodeId>, Vec<NodeId>)> {
    let mut out = vec![(None, roots.to_vec())];
    for root in roots {
        for node in tree.descendants(*root) {
            if tree.is_list(node) {
                out.push((Some(node), tree.children(node).to_vec()));
            }
        }
    }
    out
}

/// `(local.get x)` style operands: the instruction and its immediate.
fn operand_access(tree: &Tree, id: NodeId) -> Option<(String, String)> {
    let head = tree.head(id)?;
    let children = tree.children(id);
    if children.len() != 2 || !(head.starts_with("local.") || head.starts_with("global.")) {
        return None;
    }
    let imm = tree.leaf_text(children[1])?;
    Some((head.to_string(), imm.to_string()))
}

struct CallSite {
    node: NodeId,
    len: usize,
    depth: usize,
    callee: String,
    folded: bool,
    operands: Vec<(String, Option<(String, String)>)>,
}

fn call_sites(body: &FunctionBody, roots: &[NodeId]) -> Vec<CallSite> {
    let tree = &body.tree;
    let mut sites = Vec::new();
    for (parent, nodes) in sequences(tree, roots) {
        let units = instr::units(tree, &nodes);
        // A list's first unit is its own instruction.
        for unit in units.iter().skip(usize::from(parent.is_some())) {
            let first = nodes[unit.start];
            if tree.head(first) == Some("call") {
                let children = tree.children(first);
                let Some(callee) = children.get(1).and_then(|c| tree.leaf_text(*c)) else {
                    continue;
                };
                sites.push(CallSite {
                    node: first,
                    len: 1,
                    depth: tree.depth_below(first, body.func),
                    callee: callee.to_string(),
                    folded: true,
                    operands: children[2..]
                        .iter()
                        .map(|c| (tree.text(*c), operand_access(tree, *c)))
                        .collect(),
                });
            } else if tree.atom(first) == Some("call") && unit.len() >= 2 {
                let Some(callee) = tree.leaf_text(nodes[unit.start + 1]) else {
                    continue;
                };
                sites.push(CallSite {
                    node: first,
                    len: unit.len(),
                    depth: tree.depth_below(first, body.func),
                    callee: callee.to_string(),
                    folded: false,
                    operands: Vec::new(),
                });
            }
        }
    }
    sites
}

impl ModuleContext {
    /// One block per defined function, in index order.
    pub fn init_search(&self) -> Vec<JoinPointBlock> {
        self.functions()
            .filter(|f| !f.is_imported())
            .map(|f| JoinPointBlock::new(f.symbol(), f.lock().func, 1, 0))
            .collect()
    }

    /// The whole-function block of `symbol`.
    pub fn function_block(&self, symbol: &str) -> Option<JoinPointBlock> {
        let f = self.function(symbol)?;
        let func = f.lock().func;
        Some(JoinPointBlock::new(f.symbol(), func, 1, 0))
    }

    /// Current text of a block: the body for a function block, otherwise
    /// the covered nodes.
    pub fn block_text(&self, block: &JoinPointBlock) -> String {
        let Some(f) = self.function(&block.function) else {
            return String::new();
        };
        let body = f.lock();
        match region(&body, block) {
            Some(nodes) => body.tree.text_of(&nodes),
            None => body.tree.text(block.node),
        }
    }

    /// The block's node followed by its ancestors up to the `func` list,
    /// innermost first. Empty once the block is detached.
    pub fn block_scope(&self, block: &JoinPointBlock) -> Vec<NodeId> {
        let Some(f) = self.function(&block.function) else {
            return Vec::new();
        };
        let body = f.lock();
        if !body.tree.is_within(block.node, body.func) {
            return Vec::new();
        }
        let mut scope = vec![block.node];
        let mut node = block.node;
        while node != body.func {
            match body.tree.parent(node) {
                Some(parent) => {
                    scope.push(parent);
                    node = parent;
                }
                None => break,
            }
        }
        scope
    }

    /// The function of a function-level block, when `filter` accepts it.
    pub fn find_functions<F>(&self, block: &JoinPointBlock, mut filter: F) -> Vec<JoinPointBlock>
    where
        F: FnMut(&FunctionInfo) -> Option<KeywordMap>,
    {
        if !block.is_function() {
            return Vec::new();
        }
        let Some(info) = self.function_info(&block.function) else {
            return Vec::new();
        };
        match filter(&info) {
            Some(env) => {
                let metadata = found_metadata("Func", info.to_keyword(), env);
                vec![JoinPointBlock::new(&block.function, block.node, block.len, 0).with_metadata(metadata)]
            }
            None => Vec::new(),
        }
    }

    fn collect_calls(&self, block: &JoinPointBlock) -> Vec<CallSite> {
        let Some(f) = self.function(&block.function) else {
            return Vec::new();
        };
        let body = f.lock();
        match region(&body, block) {
            Some(roots) => call_sites(&body, &roots),
            None => Vec::new(),
        }
    }

    fn call_info(
        &self,
        site: &CallSite,
        caller: &FunctionInfo,
        cache: &mut HashMap<String, FunctionInfo>,
    ) -> Option<CallInfo> {
        let symbol = self.resolve_function(&site.callee)?.symbol().to_string();
        if !cache.contains_key(&symbol) {
            let info = self.function_info(&symbol)?;
            cache.insert(symbol.clone(), info);
        }
        let callee = cache.get(&symbol)?.clone();
        let args = site
            .operands
            .iter()
            .enumerate()
            .map(|(i, (instr, access))| ArgInfo {
                ty: callee.params.get(i).map(|p| p.ty.clone()).unwrap_or_default(),
                order: i,
                instr: instr.clone(),
                access: access.clone(),
            })
            .collect();
        Some(CallInfo {
            callee,
            caller: caller.clone(),
            args,
        })
    }

    /// Call sites inside `block` accepted by `filter`. Folded calls cover
    /// one node; flat `call $f` covers the instruction and its immediate.
    pub fn find_calls<F>(&self, block: &JoinPointBlock, mut filter: F) -> Vec<JoinPointBlock>
    where
        F: FnMut(&CallInfo) -> Option<KeywordMap>,
    {
        let sites = self.collect_calls(block);
        let Some(caller) = self.function_info(&block.function) else {
            return Vec::new();
        };
        let mut cache = HashMap::new();
        let mut found = Vec::new();
        for site in &sites {
            let Some(call) = self.call_info(site, &caller, &mut cache) else {
                continue;
            };
            if let Some(env) = filter(&call) {
                let metadata = found_metadata("Call", call.to_keyword(), env);
                found.push(
                    JoinPointBlock::new(&block.function, site.node, site.len, site.depth).with_metadata(metadata),
                );
            }
        }
        self.sort_blocks(&mut found);
        found
    }

    /// Folded call sites whose operands are all plain variable reads,
    /// accepted by `filter`.
    pub fn find_args<F>(&self, block: &JoinPointBlock, mut filter: F) -> Vec<JoinPointBlock>
    where
        F: FnMut(&CallInfo) -> Option<KeywordMap>,
    {
        let sites = self.collect_calls(block);
        let Some(caller) = self.function_info(&block.function) else {
            return Vec::new();
        };
        let mut cache = HashMap::new();
        let mut found = Vec::new();
        for site in sites
            .iter()
            .filter(|s| s.folded && s.operands.iter().all(|(_, access)| access.is_some()))
        {
            let Some(call) = self.call_info(site, &caller, &mut cache) else {
                continue;
            };
            if let Some(env) = filter(&call) {
                let metadata = found_metadata("Args", call.to_keyword(), env);
                found.push(
                    JoinPointBlock::new(&block.function, site.node, site.len, site.depth).with_metadata(metadata),
                );
            }
        }
        self.sort_blocks(&mut found);
        found
    }

    /// Return sites of a function-level block: every `return`, plus the
    /// function exit when the body does not end in one. A function with a
    /// result exits through its last instruction. A void function gets an
    /// explicit trailing `(return)`, added only when `filter` accepts it.
    pub fn find_returns<F>(&self, block: &JoinPointBlock, mut filter: F) -> Vec<JoinPointBlock>
    where
        F: FnMut(&ReturnInfo) -> Option<KeywordMap>,
    {
        if !block.is_function() {
            return Vec::new();
        }
        let Some(f) = self.function(&block.function) else {
            return Vec::new();
        };
        let mut sites: Vec<(NodeId, usize, usize, String)> = Vec::new();
        let mut open_exit = false;
        {
            let body = f.lock();
            let tree = &body.tree;
            let nodes = body.body_nodes();
            for (parent, seq) in sequences(tree, &nodes) {
                let units = instr::units(tree, &seq);
                for unit in units.iter().skip(usize::from(parent.is_some())) {
                    if instr::unit_name(tree, &seq, unit) == Some("return") {
                        let first = seq[unit.start];
                        sites.push((
                            first,
                            unit.len(),
                            tree.depth_below(first, body.func),
                            tree.text_of(&seq[unit.clone()]),
                        ));
                    }
                }
            }
            let units = instr::units(tree, &nodes);
            let last = units.last().filter(|u| !sites.iter().any(|(n, ..)| *n == nodes[u.start]));
            match (last, f.result()) {
                (Some(last), Some(_)) => {
                    sites.push((nodes[last.start], last.len(), 1, tree.text_of(&nodes[last.clone()])));
                }
                (None, Some(_)) => {}
                (_, None) => open_exit = last.is_some() || units.is_empty(),
            }
        }
        let Some(info) = self.function_info(&block.function) else {
            return Vec::new();
        };
        let mut found = Vec::new();
        for (node, len, depth, text) in sites {
            let ret = ReturnInfo {
                func: info.clone(),
                instr: text,
                ty: info.result.clone(),
            };
            if let Some(env) = filter(&ret) {
                let metadata = found_metadata("Returns", ret.to_keyword(), env);
                found.push(JoinPointBlock::new(&block.function, node, len, depth).with_metadata(metadata));
            }
        }
        if open_exit {
            let ret = ReturnInfo {
                func: info.clone(),
                instr: "(return)".to_string(),
                ty: None,
            };
            if let Some(env) = filter(&ret) {
                let mut body = f.lock();
                let func = body.func;
                let node = body.tree.graft(&sexpr::SExpr::list([sexpr::SExpr::atom("return")]));
                body.tree.push_child(func, node);
                drop(body);
                let metadata = found_metadata("Returns", ret.to_keyword(), env);
                found.push(JoinPointBlock::new(&block.function, node, 1, 1).with_metadata(metadata));
            }
        }
        self.sort_blocks(&mut found);
        found
    }

    /// Every run of instructions inside `block` whose text equals `code`,
    /// one spanning block per occurrence.
    pub fn find_instructions(&self, block: &JoinPointBlock, code: &str) -> Vec<JoinPointBlock> {
        let exprs = match sexpr::parse(code) {
            Ok(exprs) => exprs,
            Err(err) => {
                log::debug!("instruction text does not parse: {err}");
                return Vec::new();
            }
        };
        let mut scratch = Tree::new();
        let ids: Vec<NodeId> = exprs.iter().map(|e| scratch.graft(e)).collect();
        let target: Vec<String> = instr::units(&scratch, &ids)
            .into_iter()
            .map(|r| scratch.text_of(&ids[r]))
            .collect();
        if target.is_empty() {
            return Vec::new();
        }

        let Some(f) = self.function(&block.function) else {
            return Vec::new();
        };
        let mut found = Vec::new();
        {
            let body = f.lock();
            let tree = &body.tree;
            let Some(roots) = region(&body, block) else {
                return Vec::new();
            };
            for (_, seq) in sequences(tree, &roots) {
                let units = instr::units(tree, &seq);
                let texts: Vec<String> = units.iter().map(|u| tree.text_of(&seq[u.clone()])).collect();
                if texts.len() < target.len() {
                    continue;
                }
                for start in 0..=texts.len() - target.len() {
                    if texts[start..start + target.len()] != target[..] {
                        continue;
                    }
                    let first = units[start].start;
                    let end = units[start + target.len() - 1].end;
                    let node = seq[first];
                    let candidate =
                        JoinPointBlock::new(&block.function, node, end - first, tree.depth_below(node, body.func));
                    if !found.contains(&candidate) {
                        found.push(candidate);
                    }
                }
            }
        }
        self.sort_blocks(&mut found);
        found
    }

    /// Merge two block lists. Identical blocks keep the left metadata,
    /// extended with bindings only the right one has.
    pub fn union(&self, left: Vec<JoinPointBlock>, right: Vec<JoinPointBlock>) -> Vec<JoinPointBlock> {
        let mut out: Vec<JoinPointBlock> = Vec::with_capacity(left.len() + right.len());
        for block in left.into_iter().chain(right) {
            match out.iter_mut().find(|b| **b == block) {
                Some(existing) => existing.metadata.join(&block.metadata),
                None => out.push(block),
            }
        }
        self.sort_blocks(&mut out);
        out
    }

    fn block_key(&self, block: &JoinPointBlock) -> (u32, Vec<usize>) {
        let index = self.function_index(&block.function).unwrap_or(u32::MAX);
        let path = match self.function(&block.function) {
            Some(f) => {
                let body = f.lock();
                body.tree.path_from(block.node, body.func)
            }
            None => Vec::new(),
        };
        (index, path)
    }

    /// Document order: function index, then position in the function.
    pub fn sort_blocks(&self, blocks: &mut [JoinPointBlock]) {
        blocks.sort_by_cached_key(|b| self.block_key(b));
    }

    fn adjacent(&self, a: &JoinPointBlock, b: &JoinPointBlock) -> bool {
        if a.function != b.function || a.is_function() || b.is_function() {
            return false;
        }
        let Some(f) = self.function(&a.function) else {
            return false;
        };
        let body = f.lock();
        match (body.tree.position(a.node), body.tree.position(b.node)) {
            (Some((pa, ia)), Some((pb, ib))) => pa == pb && ib == ia + a.len,
            _ => false,
        }
    }

    /// Merge runs of adjacent sibling blocks into single spans covering at
    /// most `max_in_row` nodes. Blocks already that long stay as they are.
    pub fn rearrange_blocks(&self, blocks: Vec<JoinPointBlock>, max_in_row: usize) -> Vec<JoinPointBlock> {
        let max = max_in_row.max(1);
        let mut out: Vec<JoinPointBlock> = Vec::with_capacity(blocks.len());
        for block in blocks {
            if let Some(last) = out.last_mut() {
                if last.len + block.len <= max && self.adjacent(last, &block) {
                    last.len += block.len;
                    last.metadata.join(&block.metadata);
                    continue;
                }
            }
            out.push(block);
        }
        out
    }
}
