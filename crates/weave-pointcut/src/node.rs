//! The filter tree a pointcut expression compiles to.

use std::collections::HashMap;
use std::sync::mpsc;
use std::thread;

use weave_keyword::KeywordMap;
use weave_module::{remove_duplicates, JoinPointBlock, ModuleContext};
use weave_template::{count_instructions, SearchValue, TemplateSet};
use weave_types::ast::{Expr, Method, MethodKind, ReturnsFilter};
use weave_types::description::OrderedMap;
use weave_types::{ErrorCode, Result, WeaveError};

use crate::context::{JoinPoint, PointcutContext};
use crate::param::{match_args, PointcutParam};
use crate::predicate::{returns_matches, FuncPredicate};

// ══════════════════════════════════════════════════════════════════════════════
// Nodes
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub(crate) enum FilterNode {
    Func(FuncPredicate),
    Call(FuncPredicate),
    Args(Vec<PointcutParam>),
    Returns(ReturnsFilter),
    Template { name: String, just_check: bool },
    /// A named pointcut, compiled in place.
    User { name: String, body: Box<FilterNode> },
    And(Box<FilterNode>, Box<FilterNode>),
    Or(Box<FilterNode>, Box<FilterNode>),
}

/// What compiling an expression may refer to.
pub(crate) struct Scope<'a> {
    pub pointcuts: &'a OrderedMap<String>,
    pub templates: &'a TemplateSet,
}

// ══════════════════════════════════════════════════════════════════════════════
// Compilation
// ══════════════════════════════════════════════════════════════════════════════

impl FilterNode {
    /// Compile `expr`, where `params` maps the names usable in `args(...)`
    /// and in named-pointcut calls to advice parameters.
    pub(crate) fn compile(expr: &Expr, params: &HashMap<String, PointcutParam>, scope: &Scope<'_>) -> Result<Self> {
        compile_expr(expr, params, scope, &mut Vec::new())
    }

    /// Short name, for logs.
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Func(_) => "func".into(),
            Self::Call(_) => "call".into(),
            Self::Args(params) => {
                let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
                format!("args({})", names.join(", "))
            }
            Self::Returns(_) => "returns".into(),
            Self::Template { name, .. } => format!("template({name})"),
            Self::User { name, .. } => name.clone(),
            Self::And(l, r) => format!("({} && {})", l.describe(), r.describe()),
            Self::Or(l, r) => format!("({} || {})", l.describe(), r.describe()),
        }
    }
}

fn compile_expr(
    expr: &Expr,
    params: &HashMap<String, PointcutParam>,
    scope: &Scope<'_>,
    visiting: &mut Vec<String>,
) -> Result<FilterNode> {
    match expr {
        Expr::Method(method) => compile_method(method, params, scope, visiting),
        Expr::And(l, r) => Ok(FilterNode::And(
            Box::new(compile_expr(l, params, scope, visiting)?),
            Box::new(compile_expr(r, params, scope, visiting)?),
        )),
        Expr::Or(l, r) => Ok(FilterNode::Or(
            Box::new(compile_expr(l, params, scope, visiting)?),
            Box::new(compile_expr(r, params, scope, visiting)?),
        )),
    }
}

fn compile_method(
    method: &Method,
    params: &HashMap<String, PointcutParam>,
    scope: &Scope<'_>,
    visiting: &mut Vec<String>,
) -> Result<FilterNode> {
    match &method.kind {
        MethodKind::Func(def) => Ok(FilterNode::Func(FuncPredicate::compile(def, method.span)?)),
        MethodKind::Call(def) => Ok(FilterNode::Call(FuncPredicate::compile(def, method.span)?)),
        MethodKind::Returns(filter) => Ok(FilterNode::Returns(*filter)),
        MethodKind::Args(names) => {
            let resolved = names
                .iter()
                .map(|name| {
                    params.get(name).cloned().ok_or_else(|| {
                        WeaveError::new(ErrorCode::UNKNOWN_PARAMETER, format!("unknown pointcut parameter '{name}'"))
                            .at(method.span)
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(FilterNode::Args(resolved))
        }
        MethodKind::Template { name, just_check } => {
            if !scope.templates.contains(name) {
                return Err(WeaveError::new(ErrorCode::UNKNOWN_TEMPLATE, format!("template '{name}' not found"))
                    .at(method.span));
            }
            Ok(FilterNode::Template {
                name: name.clone(),
                just_check: *just_check,
            })
        }
        MethodKind::User { name, args } => compile_user(method, name, args, params, scope, visiting),
    }
}

fn compile_user(
    method: &Method,
    name: &str,
    args: &[String],
    params: &HashMap<String, PointcutParam>,
    scope: &Scope<'_>,
    visiting: &mut Vec<String>,
) -> Result<FilterNode> {
    let fail = |code: ErrorCode, message: String| Err(WeaveError::new(code, message).at(method.span).within(name));
    let Some(source) = scope.pointcuts.get(name) else {
        return fail(ErrorCode::UNKNOWN_POINTCUT, format!("unknown pointcut method '{name}'"));
    };
    if visiting.iter().any(|v| v == name) {
        return fail(
            ErrorCode::UNKNOWN_POINTCUT,
            format!("pointcut '{name}' refers to itself through {}", visiting.join(" -> ")),
        );
    }
    let pointcut = weave_parser::parse_plain_pointcut(source).map_err(|e| e.within(name))?;
    if pointcut.args.len() != args.len() {
        return fail(
            ErrorCode::ARITY_MISMATCH,
            format!("expects {} arguments but got {}", pointcut.args.len(), args.len()),
        );
    }
    let mut inner = HashMap::with_capacity(args.len());
    for (position, (arg, declared)) in args.iter().zip(&pointcut.args).enumerate() {
        let Some(outer) = params.get(arg) else {
            return fail(
                ErrorCode::UNKNOWN_PARAMETER,
                format!("unknown argument '{arg}' at position {position}"),
            );
        };
        if let (Some(expected), Some(got)) = (declared.ty, outer.ty) {
            if expected != got {
                return fail(
                    ErrorCode::TYPE_MISMATCH,
                    format!("argument at position {position} should be {expected} but is {got}"),
                );
            }
        }
        inner.insert(declared.name.clone(), outer.clone());
    }
    visiting.push(name.to_string());
    let body = compile_expr(&pointcut.body, &inner, scope, visiting);
    visiting.pop();
    Ok(FilterNode::User {
        name: name.to_string(),
        body: Box::new(body?),
    })
}

// ══════════════════════════════════════════════════════════════════════════════
// Filtering
// ══════════════════════════════════════════════════════════════════════════════

/// Replace every block with what `find` locates inside it. Found blocks
/// keep their own bindings and gain those of the block they came from.
fn refine<'m, F>(ctx: PointcutContext<'m>, mut find: F) -> PointcutContext<'m>
where
    F: FnMut(&'m ModuleContext, &JoinPointBlock) -> Vec<JoinPointBlock>,
{
    let module = ctx.module();
    let join_points = ctx
        .join_points()
        .iter()
        .filter_map(|jp| {
            let mut blocks = Vec::new();
            for b in jp.blocks() {
                for mut found in remove_duplicates(find(module, b)) {
                    found.metadata.join(&b.metadata);
                    blocks.push(found);
                }
            }
            JoinPoint::new(blocks)
        })
        .collect();
    ctx.with_join_points(join_points)
}

impl FilterNode {
    pub(crate) fn filter<'m>(&self, ctx: PointcutContext<'m>) -> Result<PointcutContext<'m>> {
        match self {
            Self::Func(predicate) => Ok(refine(ctx, |m, b| m.find_functions(b, |info| predicate.matches(info)))),
            Self::Call(predicate) => Ok(refine(ctx, |m, b| m.find_calls(b, |call| predicate.matches(&call.callee)))),
            Self::Args(params) => Ok(refine(ctx, |m, b| {
                m.find_args(b, |call| {
                    match_args(m, params, call).map(|bound| bound.into_iter().collect::<KeywordMap>())
                })
            })),
            Self::Returns(filter) => Ok(refine(ctx, |m, b| {
                m.find_returns(b, |ret| returns_matches(*filter, ret).then(KeywordMap::new))
            })),
            Self::Template { name, just_check } => filter_template(ctx, name, *just_check),
            Self::User { body, .. } => body.filter(ctx),
            Self::And(left, right) => right.filter(left.filter(ctx)?),
            Self::Or(left, right) => {
                let l = left.filter(ctx.clone())?;
                let r = right.filter(ctx)?;
                Ok(l.append(r))
            }
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Template node
// ══════════════════════════════════════════════════════════════════════════════

/// Blocks a template found inside one block, each with the search values
/// that located it.
type TemplateMatch = Vec<(JoinPointBlock, Vec<SearchValue>)>;

fn find_template(
    module: &ModuleContext,
    templates: &TemplateSet,
    name: &str,
    block: &JoinPointBlock,
) -> Result<Option<TemplateMatch>> {
    let text = module.block_text(block);
    if text.trim().is_empty() {
        return Ok(None);
    }
    let context = templates.context(name)?;
    let mut accepted = Vec::new();
    for value in templates.search(name, &text)? {
        if !context.validate_children(&value) {
            log::debug!("template {name} in {}: nested templates rejected the match", block.function());
            continue;
        }
        if !context.validate_values(&value) {
            log::debug!("template {name} in {}: placeholder values disagree", block.function());
            continue;
        }
        accepted.push(value);
    }
    if accepted.is_empty() {
        return Ok(None);
    }

    // Every site, with the indices of the accepted values found there.
    let mut located: Vec<(JoinPointBlock, Vec<usize>)> = Vec::new();
    for (v, value) in accepted.iter().enumerate() {
        for iteration in &value.iterations {
            for site in module.find_instructions(block, &iteration.found) {
                match located.iter_mut().find(|(b, _)| *b == site) {
                    Some((_, owners)) if !owners.contains(&v) => owners.push(v),
                    Some(_) => {}
                    None => located.push((site, vec![v])),
                }
            }
        }
    }
    let mut sites: Vec<JoinPointBlock> = located.iter().map(|(b, _)| b.clone()).collect();
    module.sort_blocks(&mut sites);

    // Merged blocks start at the first site they cover and gather the
    // values of every site they cover.
    let width = count_instructions(context.template().comby()).max(1);
    let mut merged = module.rearrange_blocks(sites.clone(), width).into_iter().peekable();
    let mut out: TemplateMatch = Vec::new();
    for site in &sites {
        if let Some(next) = merged.next_if(|m| m.node() == site.node()) {
            out.push((next.with_metadata(block.metadata.clone()), Vec::new()));
        }
        let Some((_, values)) = out.last_mut() else {
            continue;
        };
        let owners = located.iter().find(|(b, _)| b == site).map(|(_, o)| o.as_slice()).unwrap_or_default();
        for v in owners {
            if !values.contains(&accepted[*v]) {
                values.push(accepted[*v].clone());
            }
        }
    }
    Ok(Some(out))
}

/// Run the template on every block of every join point, one task per
/// block. A collator gathers the per-block results in block order.
///
/// Matches are recorded per found block. In check-only mode the original
/// blocks are kept and nothing is recorded, so the advice sees no
/// captures.
fn filter_template<'m>(ctx: PointcutContext<'m>, name: &str, just_check: bool) -> Result<PointcutContext<'m>> {
    let module = ctx.module();
    let templates = ctx.templates().templates();
    let mut join_points = Vec::new();
    for jp in ctx.join_points() {
        let blocks = jp.blocks();
        let mut table: Vec<Option<TemplateMatch>> = vec![None; blocks.len()];
        let mut first_error = None;
        thread::scope(|s| {
            let (tx, rx) = mpsc::sync_channel(blocks.len().max(1));
            for (i, block) in blocks.iter().enumerate() {
                let tx = tx.clone();
                s.spawn(move || {
                    let result = find_template(module, templates, name, block);
                    // The collator outlives every task.
                    let _ = tx.send((i, result));
                });
            }
            drop(tx);
            for (i, result) in rx {
                match result {
                    Ok(found) => table[i] = found,
                    Err(err) => {
                        first_error.get_or_insert(err);
                    }
                }
            }
        });
        if let Some(err) = first_error {
            return Err(err.within(jp.function().to_string()));
        }

        let found: TemplateMatch = table.into_iter().flatten().flatten().collect();
        if found.is_empty() {
            continue;
        }
        if just_check {
            join_points.extend(JoinPoint::new(blocks.to_vec()));
            continue;
        }
        let mut kept = Vec::with_capacity(found.len());
        for (block, values) in found {
            ctx.templates().add_result(jp.function(), name, block.node(), values);
            kept.push(block);
        }
        join_points.extend(JoinPoint::new(kept));
    }
    Ok(ctx.with_join_points(join_points))
}
