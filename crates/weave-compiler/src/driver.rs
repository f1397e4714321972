//! The weaving driver.
//!
//! ```text
//! description + module
//!   → advices (select, compile, init, sort)
//!   → global context (globals, functions, start code)
//!   → per advice: execute pointcut → weave every join point
//!   → re-scan added functions → runtime transforms
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use weave_keyword::{substitute, KeywordMap, KeywordStack};
use weave_module::{JoinPointBlock, ModuleContext};
use weave_pointcut::{JoinPoint, PointcutContext, TemplateKeywords};
use weave_template::TemplateSet;
use weave_types::description::{FunctionSpec, TransformDescription};
use weave_types::{Result, WeaveError};

use crate::advice::{compile_advices, sort_advices, Advice};
use crate::options::WeaveOptions;
use crate::params::PointcutParameters;
use crate::parallel;
use crate::result::{AdviceReport, TransformationResult};
use crate::zone::{ContextVariables, FunctionEntry, Zone, ZoneArena, ZoneId};

/// Weave `description` into the module text `module`.
pub fn weave(module: &str, description: &TransformDescription, options: &WeaveOptions) -> Result<TransformationResult> {
    let started = Instant::now();
    let module = ModuleContext::parse(module)?;
    log::debug!("parsed module in {:?}", started.elapsed());
    weave_module(module, description, options)
}

/// Weave `description` into an already parsed module.
pub fn weave_module(
    module: ModuleContext,
    description: &TransformDescription,
    options: &WeaveOptions,
) -> Result<TransformationResult> {
    let input_text = module.to_text();
    let mut weaver = Weaver::new(module, description)?;

    let started = Instant::now();
    let advices = weaver.advices(options)?;
    log::debug!("compiled {} advice(s) in {:?}", advices.len(), started.elapsed());

    if advices.is_empty() && !options.allow_empty {
        log::info!(
            "Aborted transformations because no advices were defined (original: {}, filtered: 0)",
            description.aspects.advices.len()
        );
        return Ok(TransformationResult::new(weaver.module, &input_text, false, Vec::new()));
    }

    let started = Instant::now();
    weaver.apply_global_context()?;
    if let Some(code) = description.aspects.start.as_deref().filter(|c| !c.trim().is_empty()) {
        weaver.add_start_code(code)?;
    }
    log::debug!("applied global context in {:?}", started.elapsed());

    let mut reports = Vec::with_capacity(advices.len());
    for advice in &advices {
        let started = Instant::now();
        let join_points = weaver.apply_advice(advice)?;
        log::debug!("advice '{}' woven in {:?}", advice.name, started.elapsed());
        reports.push(AdviceReport {
            name: advice.name.clone(),
            join_points,
        });
    }

    let started = Instant::now();
    weaver.rescan_added_functions()?;
    weaver.module.apply_runtime_transforms();
    log::debug!("re-scanned added functions in {:?}", started.elapsed());

    Ok(TransformationResult::new(weaver.module, &input_text, true, reports))
}

// ══════════════════════════════════════════════════════════════════════════════
// Weaver
// ══════════════════════════════════════════════════════════════════════════════

struct Weaver<'d> {
    module: ModuleContext,
    description: &'d TransformDescription,
    templates: Arc<TemplateSet>,
    zones: ZoneArena,
    /// user name → zone of a context function
    function_zones: HashMap<String, ZoneId>,
    /// Symbols of the functions the description added.
    added: BTreeSet<String>,
}

impl<'d> Weaver<'d> {
    fn new(module: ModuleContext, description: &'d TransformDescription) -> Result<Self> {
        let templates = TemplateSet::parse(description.templates.iter().map(|(k, v)| (k, v.as_str())))
            .map_err(|e| e.within("templates"))?;
        Ok(Self {
            module,
            description,
            templates: Arc::new(templates),
            zones: ZoneArena::new(),
            function_zones: HashMap::new(),
            added: BTreeSet::new(),
        })
    }

    /// Compile, initialize and sort the selected advices. Pointcuts are
    /// initialized before the context section adds anything, unless the
    /// advice asks for `all`.
    fn advices(&self, options: &WeaveOptions) -> Result<Vec<Advice>> {
        let mut advices = compile_advices(
            &self.description.aspects.advices,
            &self.description.pointcuts,
            &self.templates,
            options,
        )?;
        for advice in advices.iter_mut().filter(|a| !a.spec.all) {
            advice.pointcut.init(&self.module);
        }
        if !options.ignore_order {
            sort_advices(&mut advices);
        }
        Ok(advices)
    }

    // ── Global context ──────────────────────────────────────────────────

    fn apply_global_context(&mut self) -> Result<()> {
        let description = self.description;
        let context = &description.aspects.context;
        log::info!(
            "Applying module modifications from global context (globals: {}, functions: {})",
            context.variables.len(),
            context.functions.len()
        );
        let global = self.zones.global();

        let mut runtime_init = String::new();
        for (name, value) in context.variables.iter() {
            let decl = weave_parser::parse_variable(value).map_err(|e| e.within(format!("global '{name}'")))?;
            if !decl.ty.is_primitive() {
                let code = self
                    .module
                    .composite_global_code(name, &decl)
                    .map_err(|e| WeaveError::from(e).within(format!("global '{name}'")))?;
                runtime_init.push_str(&code);
                log::trace!("global '{name}' = runtime {}", decl.ty);
                continue;
            }
            let symbol = self.module.add_global(&decl)?;
            log::trace!("global '{name}' = {symbol}");
            self.module.set_global_alias(symbol.clone(), name);
            self.zones.get_mut(global).add_variable(name, symbol);
        }
        if !runtime_init.is_empty() {
            let start = self.module.add_start_function()?;
            self.module
                .prepend_code(&start, &runtime_init)
                .map_err(|e| WeaveError::from(e).within("runtime globals"))?;
            self.added.insert(start);
        }

        for (name, spec) in context.functions.iter() {
            self.add_context_function(name, spec)
                .map_err(|e| e.within(format!("function '{name}'")))?;
        }
        Ok(())
    }

    fn add_context_function(&mut self, name: &str, spec: &FunctionSpec) -> Result<()> {
        let global = self.zones.global();
        let symbol = self.module.add_function(spec)?;
        self.added.insert(symbol.clone());
        self.module.set_function_alias(symbol.clone(), name);

        if spec.imported.is_none() {
            let mut zone = Zone::child(global);
            for (var, value) in spec.variables.iter() {
                let decl = weave_parser::parse_variable(value).map_err(|e| e.within(format!("local '{var}'")))?;
                let local = self.module.add_local(&symbol, &decl)?;
                self.alias(&symbol, &local, var);
                zone.add_variable(var, local);
            }
            let params = self
                .module
                .function(&symbol)
                .map(|f| f.params().to_vec())
                .unwrap_or_default();
            for (param, arg) in params.iter().zip(&spec.args) {
                self.alias(&symbol, &param.symbol, &arg.name);
                zone.add_variable(arg.name.as_str(), param.symbol.as_str());
            }
            let id = self.zones.push(zone);
            self.function_zones.insert(name.to_string(), id);
        }

        let index = self.module.function_index(&symbol).unwrap_or_default();
        self.zones
            .get_mut(global)
            .add_function(name, FunctionEntry { index, symbol: symbol.clone() });
        log::trace!("function '{name}' = {symbol}");
        Ok(())
    }

    fn alias(&self, function: &str, symbol: &str, name: &str) {
        if let Some(f) = self.module.function(function) {
            f.add_alias(symbol, name);
        }
    }

    fn add_start_code(&mut self, code: &str) -> Result<()> {
        log::info!("Adding starting code");
        let start = self.module.add_start_function()?;
        self.module
            .append_code(&start, code)
            .map_err(|e| WeaveError::from(e).within("start code"))?;
        self.added.insert(start);
        Ok(())
    }

    // ── Advices ─────────────────────────────────────────────────────────

    /// Weave one advice and return the number of join points it reached.
    fn apply_advice(&self, advice: &Advice) -> Result<usize> {
        let ctx = advice
            .pointcut
            .execute(&self.module, Arc::clone(&self.templates))
            .map_err(|e| e.within(format!("advice '{}'", advice.name)))?;
        let join_points: Vec<&JoinPoint> = ctx
            .join_points()
            .iter()
            .filter(|jp| advice.spec.all || !self.added.contains(jp.function()))
            .collect();
        log::info!(
            "Applying static transformations to join-points (advice: {}, total: {})",
            advice.name,
            join_points.len()
        );

        let orders = self.module.order_map();
        parallel::for_each(&join_points, |jp| {
            self.weave_join_point(advice, &ctx, jp, &orders)
                .map_err(|e| e.within(format!("advice '{}'", advice.name)))
        })?;
        Ok(join_points.len())
    }

    fn weave_join_point(
        &self,
        advice: &Advice,
        ctx: &PointcutContext<'_>,
        jp: &JoinPoint,
        orders: &BTreeMap<String, u32>,
    ) -> Result<()> {
        let function = jp.function();
        let Some(f) = self.module.function(function) else {
            return Ok(());
        };
        let parent = self
            .module
            .alias_value(function)
            .and_then(|name| self.function_zones.get(name))
            .copied()
            .unwrap_or_else(|| self.zones.global());

        let mut zone = Zone::child(parent);
        for (name, value) in advice.spec.variables.iter() {
            let decl = weave_parser::parse_variable(value).map_err(|e| e.within(format!("local '{name}'")))?;
            let local = self.module.add_local(function, &decl)?;
            log::trace!("advice '{}' local '{name}' = {local} in {function}", advice.name);
            f.add_alias(local.as_str(), name);
            zone.add_variable(name, local);
        }
        let params = PointcutParameters::resolve(f, advice.pointcut.params())?;
        let variables = ContextVariables::new(&self.zones, zone);

        // Innermost first: an enclosing block's `%this%` then holds the
        // already woven code of the blocks inside it.
        let mut blocks = jp.blocks().to_vec();
        self.module.sort_blocks(&mut blocks);
        for block in blocks.iter().rev() {
            let this: KeywordMap = [("this", self.module.block_text(block))].into_iter().collect();
            let base = KeywordStack::new()
                .with(&this)
                .with(&params)
                .with(&variables)
                .with(&block.metadata);
            let templates = match ctx.template_keywords(block, &base) {
                TemplateKeywords::Aborted => {
                    log::info!(
                        "Join-point aborted due to unmatched template after filtering with context variables \
                         (advice: {}, function: {function})",
                        advice.name
                    );
                    continue;
                }
                TemplateKeywords::Keywords(map) => map,
                TemplateKeywords::NoResults => KeywordMap::new(),
            };
            let stack = base.with(&templates);
            let code = substitute(&advice.spec.advice, &stack, orders);
            self.apply_block(block, &code, advice.spec.smart)?;
        }
        Ok(())
    }

    fn apply_block(&self, block: &JoinPointBlock, code: &str, smart: bool) -> Result<()> {
        if !self.module.apply(block, code, smart)? {
            log::warn!("join point in {} is no longer part of the function; advice skipped", block.function());
        }
        Ok(())
    }

    // ── Added functions ─────────────────────────────────────────────────

    /// Resolve the keywords left in the bodies of the added functions,
    /// against their own zone or the global one.
    fn rescan_added_functions(&self) -> Result<()> {
        log::info!(
            "Applying static transformations to added functions (total: {})",
            self.added.len()
        );
        let blocks: Vec<JoinPointBlock> = self
            .module
            .init_search()
            .into_iter()
            .filter(|b| self.added.contains(b.function()))
            .collect();
        let orders = self.module.order_map();
        parallel::for_each(&blocks, |block| {
            let symbol = block.function();
            let zone = self
                .module
                .alias_value(symbol)
                .and_then(|name| self.function_zones.get(name))
                .copied()
                .unwrap_or_else(|| self.zones.global());
            let variables = ContextVariables::over(&self.zones, zone);
            let stack = KeywordStack::new().with(&variables);
            let code = self.module.block_text(block);
            let output = substitute(&code, &stack, &orders);
            if output != code {
                log::trace!("resolved context keywords in {symbol}");
                self.apply_block(block, &output, false)
                    .map_err(|e| e.within(format!("function {symbol}")))?;
            }
            Ok(())
        })
    }
}
