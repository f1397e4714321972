//! Join points and the state a pointcut filter works on.

use std::collections::BTreeMap;

use weave_keyword::KeywordStack;
use weave_module::{remove_duplicates, JoinPointBlock, ModuleContext};

use crate::templates::{TemplateKeywords, TemplateManager};

/// Blocks of one function selected by a pointcut. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinPoint {
    blocks: Vec<JoinPointBlock>,
}

impl JoinPoint {
    /// A join point over `blocks` without duplicates, or `None` when no
    /// block is left.
    pub fn new(blocks: Vec<JoinPointBlock>) -> Option<Self> {
        let blocks = remove_duplicates(blocks);
        (!blocks.is_empty()).then_some(Self { blocks })
    }

    pub fn blocks(&self) -> &[JoinPointBlock] {
        &self.blocks
    }

    /// Symbol of the function every block belongs to.
    pub fn function(&self) -> &str {
        self.blocks[0].function()
    }

    /// Text of block `i`.
    pub fn instr_string(&self, module: &ModuleContext, i: usize) -> String {
        self.blocks
            .get(i)
            .map(|b| module.block_text(b))
            .unwrap_or_default()
    }
}

/// The module, the current join points and the template state.
///
/// Cloning copies the join points and template results; the module and
/// the template definitions stay shared.
#[derive(Debug, Clone)]
pub struct PointcutContext<'m> {
    module: &'m ModuleContext,
    join_points: Vec<JoinPoint>,
    templates: TemplateManager,
}

impl<'m> PointcutContext<'m> {
    /// One join point per defined function, from `blocks` (normally
    /// [`ModuleContext::init_search`]).
    pub fn new(module: &'m ModuleContext, blocks: Vec<JoinPointBlock>, templates: TemplateManager) -> Self {
        Self {
            module,
            join_points: blocks.into_iter().filter_map(|b| JoinPoint::new(vec![b])).collect(),
            templates,
        }
    }

    pub fn module(&self) -> &'m ModuleContext {
        self.module
    }

    pub fn join_points(&self) -> &[JoinPoint] {
        &self.join_points
    }

    pub fn templates(&self) -> &TemplateManager {
        &self.templates
    }

    /// The same context over other join points.
    pub(crate) fn with_join_points(mut self, join_points: Vec<JoinPoint>) -> Self {
        self.join_points = join_points;
        self
    }

    /// Template keywords of `block`; see [`TemplateManager::get_results`].
    pub fn template_keywords(&self, block: &JoinPointBlock, stack: &KeywordStack<'_>) -> TemplateKeywords {
        let scope = self.module.block_scope(block);
        self.templates.get_results(block.function(), &scope, stack)
    }

    /// Union of two contexts over the same module: join points of the same
    /// function are merged block by block. Template results stay attached
    /// to the blocks they were found at; for a block both sides matched,
    /// those of `self` win.
    pub(crate) fn append(self, other: PointcutContext<'m>) -> Self {
        if other.join_points.is_empty() {
            return self;
        }
        if self.join_points.is_empty() {
            return other;
        }
        let module = self.module;
        let mut by_function: BTreeMap<(u32, String), Vec<JoinPointBlock>> = BTreeMap::new();
        for jp in self.join_points.into_iter().chain(other.join_points) {
            let function = jp.function().to_string();
            let key = (module.function_index(&function).unwrap_or(u32::MAX), function);
            match by_function.get_mut(&key) {
                Some(blocks) => {
                    let current = std::mem::take(blocks);
                    *blocks = module.union(current, jp.blocks);
                }
                None => {
                    by_function.insert(key, jp.blocks);
                }
            }
        }
        self.templates.merge(&other.templates);
        Self {
            module,
            join_points: by_function
                .into_values()
                .filter_map(JoinPoint::new)
                .collect(),
            templates: self.templates,
        }
    }
}
