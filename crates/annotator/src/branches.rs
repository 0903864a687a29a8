//! Control-flow speculation.
//!
//! Conditional branches on `value == constant` (or `!=`) are collected into
//! groups keyed by what the compared value is: the callee of a call, the
//! object a load reads from, or a parameter. Each group gets one decision;
//! a nonzero choice `c` pins the value to the `c`-th distinct constant by
//! inserting `assume(value == constant)` next to every occurrence.

use crate::function::ASSUME;
use crate::stats::NUM_CONDITIONAL_BRANCHES_ELIMINATED;
use crate::{AnnotateError, PassState};
use common::{ChoiceKind, SiteShape};
use ir::{namer, Constant, Function, Instruction, Module, Op, Predicate, Type, Value};
use oracle::Site;
use std::collections::HashMap;

/// One speculated occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeculationPoint {
    /// Index into `Module::functions`.
    pub function: usize,
    pub value: Value,
    /// The assumption is inserted before this instruction.
    pub before: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeculationGroup {
    /// Distinct constants in first-seen order.
    pub constants: Vec<Constant>,
    pub points: Vec<SpeculationPoint>,
}

/// Speculation groups of one pass, in first-seen key order.
#[derive(Debug, Clone, Default)]
pub struct SpeculationMap {
    order: Vec<String>,
    groups: HashMap<String, SpeculationGroup>,
}

impl SpeculationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn get(&self, key: &str) -> Option<&SpeculationGroup> {
        self.groups.get(key)
    }

    /// Keys in first-seen order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    fn record(&mut self, key: String, constant: Constant, point: SpeculationPoint) {
        if !self.groups.contains_key(&key) {
            self.order.push(key.clone());
        }
        let group = self.groups.entry(key).or_default();
        if !group.constants.contains(&constant) {
            group.constants.push(constant);
        }
        group.points.push(point);
    }
}

/// Collects the speculation candidates of function `index`.
pub(crate) fn collect(module: &Module, index: usize, speculation: &mut SpeculationMap) {
    let function = &module.functions[index];
    for (b, block) in function.blocks.iter().enumerate() {
        if let Some(l) = function.loop_for(b) {
            let lp = &function.loops[l];
            if lp.latches.contains(&b) || lp.exiting.contains(&b) {
                continue;
            }
        }
        let Some(Op::Br {
            cond: Some(Value::Inst { id }),
            ..
        }) = block.terminator().map(|t| &t.kind)
        else {
            continue;
        };
        let Some(Op::ICmp { pred, lhs, rhs }) = function.inst(*id).map(|i| &i.kind) else {
            continue;
        };
        if !pred.is_equality() {
            continue;
        }
        let (operand, constant) = match (lhs, rhs) {
            (Value::Const { value }, other) | (other, Value::Const { value })
                if !other.is_constant() =>
            {
                (other, value)
            }
            _ => continue,
        };

        let value = function.strip_casts(operand);
        let Some((key, before)) = speculation_key(function, value) else {
            continue;
        };
        speculation.record(
            key,
            constant.clone(),
            SpeculationPoint {
                function: index,
                value: value.clone(),
                before,
            },
        );
    }
}

/// Group key and insertion point for a compared value; `None` unless the
/// value is a load, a call or a parameter.
fn speculation_key(function: &Function, value: &Value) -> Option<(String, u32)> {
    match value {
        Value::Param { .. } => {
            let name = function.value_name(value)?.to_string();
            let entry = function.blocks.first()?;
            let at = function.first_insertion_point(0);
            Some((name, entry.insts.get(at)?.id))
        }
        Value::Inst { id } => {
            let (b, i) = function.locate(*id)?;
            let inst = &function.blocks[b].insts[i];
            let key = match &inst.kind {
                Op::Call { callee, .. } => callee.clone(),
                Op::Load { ptr, .. } => {
                    let object = function.underlying_object(ptr);
                    function
                        .value_name(object)
                        .or_else(|| function.value_name(value))?
                        .to_string()
                }
                _ => return None,
            };
            let next = function.blocks[b].insts.get(i + 1)?;
            Some((key, next.id))
        }
        _ => None,
    }
}

/// Resolves every group and inserts the chosen assumptions.
pub(crate) fn create_assumptions(
    module: &mut Module,
    speculation: &SpeculationMap,
    state: &mut PassState<'_>,
) -> Result<bool, AnnotateError> {
    let kind = ChoiceKind::ControlFlowTarget;
    let mut inserted = 0u32;
    for key in speculation.keys() {
        let Some(group) = speculation.get(key) else {
            continue;
        };
        let Some(first) = group.points.first() else {
            continue;
        };
        let owner = &module.functions[first.function];
        let name = namer::value_site_name(owner, &first.value)?;
        let shape = SiteShape::SpeculatedConstants(group.constants.len() as u32);
        let choice = state.resolve(
            kind,
            Site::BranchValue {
                function: &owner.name,
                name: &name,
            },
            kind.cardinality(shape),
        )?;
        let Some(constant) = choice
            .checked_sub(1)
            .and_then(|c| group.constants.get(c as usize))
        else {
            continue;
        };
        tracing::debug!(key, choice, points = group.points.len(), "speculating branch value");
        for point in &group.points {
            if insert_assumption(&mut module.functions[point.function], point, constant) {
                state.stats.bump(NUM_CONDITIONAL_BRANCHES_ELIMINATED);
                inserted += 1;
            }
        }
    }
    if inserted > 0 {
        let assume = module.get_or_insert_declaration(ASSUME, Type::Void);
        module.functions[assume].num_uses += inserted;
    }
    Ok(inserted > 0)
}

/// Inserts `icmp eq value, constant` and `call llvm.assume` before `point.before`.
fn insert_assumption(function: &mut Function, point: &SpeculationPoint, constant: &Constant) -> bool {
    let Some((b, i)) = function.locate(point.before) else {
        tracing::warn!(function = %function.name, before = point.before, "insertion point vanished");
        return false;
    };
    let id = function.next_inst_id();
    let name = namer::unique_name(function, "spec");
    let compare = Instruction::new(id, Type::int(1), Op::ICmp {
        pred: Predicate::Eq,
        lhs: point.value.clone(),
        rhs: Value::Const {
            value: constant.clone(),
        },
    })
    .named(&name);
    let assume = Instruction::new(id + 1, Type::Void, Op::Call {
        callee: ASSUME.to_string(),
        args: vec![Value::Inst { id }],
    });
    let insts = &mut function.blocks[b].insts;
    insts.insert(i, assume);
    insts.insert(i, compare);
    true
}
