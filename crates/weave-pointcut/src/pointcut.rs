//! A compiled advice pointcut, ready to run against a module.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use weave_module::{JoinPointBlock, ModuleContext};
use weave_template::TemplateSet;
use weave_types::description::OrderedMap;
use weave_types::{ErrorCode, Result, WeaveError};

use crate::context::PointcutContext;
use crate::node::{FilterNode, Scope};
use crate::param::PointcutParam;
use crate::templates::TemplateManager;

#[derive(Debug, Clone)]
pub struct ParsedPointcut {
    params: Vec<PointcutParam>,
    root: FilterNode,
    initial: Option<Vec<JoinPointBlock>>,
}

impl ParsedPointcut {
    /// Parse and compile an advice pointcut. Named pointcuts it calls are
    /// looked up in `pointcuts`, templates in `templates`.
    pub fn parse(source: &str, pointcuts: &OrderedMap<String>, templates: &TemplateSet) -> Result<Self> {
        let pointcut = weave_parser::parse_context_pointcut(source)?;
        let mut params: Vec<PointcutParam> = Vec::with_capacity(pointcut.args.len());
        for arg in &pointcut.args {
            if params.iter().any(|p| p.name == arg.name) {
                return Err(WeaveError::new(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("pointcut parameter '{}' declared twice", arg.name),
                )
                .at(arg.span));
            }
            params.push(PointcutParam::from(arg));
        }
        let by_name: HashMap<String, PointcutParam> = params.iter().map(|p| (p.name.clone(), p.clone())).collect();
        let root = FilterNode::compile(&pointcut.body, &by_name, &Scope { pointcuts, templates })?;
        Ok(Self {
            params,
            root,
            initial: None,
        })
    }

    pub fn params(&self) -> &[PointcutParam] {
        &self.params
    }

    /// Fix the starting blocks to the functions `module` has now, so that
    /// functions added later are not searched.
    pub fn init(&mut self, module: &ModuleContext) {
        self.initial = Some(module.init_search());
    }

    pub fn is_initialized(&self) -> bool {
        self.initial.is_some()
    }

    /// Run the filter tree. Without [`init`](Self::init), every function
    /// the module has at this point is searched.
    pub fn execute<'m>(&self, module: &'m ModuleContext, templates: Arc<TemplateSet>) -> Result<PointcutContext<'m>> {
        let blocks = match &self.initial {
            Some(blocks) => blocks.clone(),
            None => module.init_search(),
        };
        let ctx = PointcutContext::new(module, blocks, TemplateManager::new(templates));
        self.root.filter(ctx)
    }
}

impl fmt::Display for ParsedPointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.params.iter().map(|p| p.name.as_str()).collect();
        write!(f, "({}) => {}", names.join(", "), self.root.describe())
    }
}
