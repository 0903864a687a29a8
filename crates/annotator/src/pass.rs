//! The annotation pass driver.

use crate::branches::{self, SpeculationMap};
use crate::function::ASSUME;
use crate::{embedded, function, loops, memory, overflow, params};
use crate::{AnnotateError, PassState, Statistics};
use common::{AnnotatorConfig, ChoiceKind, ConfigError, FunctionFilter};
use ir::{namer, Module, Op, Type};
use oracle::DecisionOracle;
use std::collections::HashSet;

/// Per-run inputs of a pass that the oracle does not hold.
#[derive(Debug, Clone)]
pub struct PassOptions {
    /// Global control string, read by instance 0.
    pub control: String,
    /// Functions eligible for full annotation.
    pub filter: FunctionFilter,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            control: String::new(),
            filter: FunctionFilter::all(),
        }
    }
}

impl PassOptions {
    pub fn from_config(config: &AnnotatorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            control: config.control.clone(),
            filter: config.validate()?,
        })
    }
}

/// What one pass did.
#[derive(Debug, Clone, Default)]
pub struct PassOutcome {
    /// `None` when the run limit was already exhausted and nothing ran.
    pub instance: Option<u32>,
    pub changed: bool,
    pub statistics: Statistics,
    /// Functions visited, in processed order.
    pub processed: Vec<String>,
    /// `(ordinal, name)` of every known function; filled on the first instance
    /// when opportunities are printed for a single-run session.
    pub annotatable: Vec<(u32, String)>,
}

/// Functions a pass visits, in visiting order.
struct Worklist {
    order: Vec<usize>,
    /// Callees of eligible functions that are not eligible themselves.
    declaration_only: HashSet<usize>,
}

impl Worklist {
    fn push(&mut self, index: usize) {
        if !self.order.contains(&index) {
            self.order.push(index);
        }
    }
}

/// Eligible functions in module order, each followed by its new ineligible callees.
fn collect_functions(module: &Module, filter: &FunctionFilter, oracle: &mut DecisionOracle) -> Worklist {
    let mut worklist = Worklist {
        order: Vec::new(),
        declaration_only: HashSet::new(),
    };
    for (index, function) in module.functions.iter().enumerate() {
        if !filter.matches(&function.name) {
            continue;
        }
        worklist.push(index);
        oracle.function_ordinal(&function.name);
        for (_, inst) in function.instructions() {
            let Op::Call { callee, .. } = &inst.kind else {
                continue;
            };
            if filter.matches(callee) {
                continue;
            }
            if let Some(callee_index) = module.function_index(callee) {
                worklist.declaration_only.insert(callee_index);
                worklist.push(callee_index);
                oracle.function_ordinal(callee);
            }
        }
    }
    worklist
}

/// Seeds embedded data (instance 0) and adds every function carrying data
/// to the worklist.
fn seed_embedded(
    module: &Module,
    oracle: &mut DecisionOracle,
    worklist: &mut Worklist,
    instance: u32,
) -> Result<(), AnnotateError> {
    for (index, function) in module.functions.iter().enumerate() {
        if !embedded::may_carry_data(function) {
            continue;
        }
        let Some(data) = embedded::lookup(module, function) else {
            continue;
        };
        worklist.push(index);
        oracle.function_ordinal(&function.name);
        if data.is_empty() || instance > 0 {
            continue;
        }
        oracle
            .seed_embedded(&function.name, data)
            .map_err(|source| AnnotateError::Embedded {
                function: function.name.clone(),
                source,
            })?;
    }
    Ok(())
}

/// Runs one annotation pass over `module`.
///
/// Every call counts as an instance, even when the run limit makes it a
/// no-op. Control input is only read by instance 0; later instances replay
/// earlier decisions through the name cache.
///
/// # Errors
/// Malformed control input, unnamed or unnamable sites, and zero-cardinality
/// requests abort the pass. The module may be partially annotated.
pub fn run_pass(
    module: &mut Module,
    oracle: &mut DecisionOracle,
    options: &PassOptions,
) -> Result<PassOutcome, AnnotateError> {
    let Some(instance) = oracle.begin_instance() else {
        tracing::info!(module = %module.name, "run limit reached, skipping pass");
        return Ok(PassOutcome::default());
    };

    module.get_or_insert_declaration(ASSUME, Type::Void);
    let mut worklist = collect_functions(module, &options.filter, oracle);
    seed_embedded(module, oracle, &mut worklist, instance)?;

    let mut outcome = PassOutcome {
        instance: Some(instance),
        ..Default::default()
    };
    let single_run = oracle.config().run_limit.map_or(true, |limit| limit <= 1);
    if instance == 0 && single_run && oracle.config().print_opportunities {
        outcome.annotatable = oracle
            .functions()
            .iter()
            .map(|(ordinal, name)| (ordinal, name.to_string()))
            .collect();
    }
    if instance == 0 && !options.control.is_empty() {
        oracle
            .seed_global(&options.control)
            .map_err(AnnotateError::Control)?;
    }

    for &index in &worklist.order {
        namer::name_function(&mut module.functions[index]);
    }
    outcome.processed = worklist
        .order
        .iter()
        .map(|&index| module.functions[index].name.clone())
        .collect();
    tracing::info!(
        module = %module.name,
        instance,
        functions = worklist.order.len(),
        declaration_only = worklist.declaration_only.len(),
        "annotating"
    );

    let mut state = PassState::new(oracle);
    let mut speculation = SpeculationMap::new();
    let mut changed = false;
    let mut next = Some(ChoiceKind::first());
    while let Some(kind) = next {
        for &index in &worklist.order {
            let function = &mut module.functions[index];
            changed |= params::annotate(function, kind, &mut state)?;
            changed |= function::annotate(function, kind, &mut state)?;
            if function.is_declaration() || worklist.declaration_only.contains(&index) {
                continue;
            }
            changed |= overflow::annotate(function, kind, &mut state)?;
            changed |= memory::annotate(function, kind, &mut state)?;
            if kind == ChoiceKind::ControlFlowTarget {
                branches::collect(module, index, &mut speculation);
            }
            changed |= loops::annotate(&mut module.functions[index], kind, &mut state)?;
        }
        if kind == ChoiceKind::ControlFlowTarget {
            changed |= branches::create_assumptions(module, &speculation, &mut state)?;
        }
        next = kind.next();
    }

    outcome.changed = changed;
    outcome.statistics = state.stats;
    tracing::info!(
        instance,
        changed,
        annotations = outcome.statistics.total(),
        "pass finished"
    );
    Ok(outcome)
}
