//! # Site Namer
//!
//! Gives every annotation site a stable, function-unique name that does not
//! depend on any decision taken for it:
//!
//! - unnamed parameters become `a`, unnamed value-producing instructions
//!   `v`, unnamed blocks `bb`, each suffixed with the smallest free number
//!   (`v`, `v1`, `v2`, ...);
//! - a store produces no value and is named after its pointer operand,
//!   `__s.<pointer name>`;
//! - any other void instruction has no naming rule and is rejected.

use crate::model::{Function, Op, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NamerError {
    #[error("{function}: no naming rule for void '{opcode}' instruction #{id}")]
    UnsupportedSite {
        function: String,
        id: u32,
        opcode: String,
    },
    #[error("{function}: instruction #{id} not found")]
    UnknownInstruction { function: String, id: u32 },
    #[error("{function}: store #{id} writes through an unnamed pointer")]
    UnnamedPointer { function: String, id: u32 },
}

/// Names already taken in `function`.
fn taken_names(function: &Function) -> HashSet<String> {
    function
        .params
        .iter()
        .map(|p| p.name.clone())
        .chain(function.blocks.iter().map(|b| b.name.clone()))
        .chain(function.instructions().map(|(_, i)| i.name.clone()))
        .filter(|n| !n.is_empty())
        .collect()
}

fn claim(taken: &mut HashSet<String>, base: &str) -> String {
    let mut candidate = base.to_string();
    let mut suffix = 1u32;
    while taken.contains(&candidate) {
        candidate = format!("{base}{suffix}");
        suffix += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

/// Returns a name based on `base` that is unused in `function`.
pub fn unique_name(function: &Function, base: &str) -> String {
    claim(&mut taken_names(function), base)
}

/// Names every unnamed parameter, block and value-producing instruction.
/// Returns how many names were assigned; already named entities keep theirs.
pub fn name_function(function: &mut Function) -> usize {
    let mut taken = taken_names(function);
    let mut assigned = 0;
    for param in function.params.iter_mut().filter(|p| p.name.is_empty()) {
        param.name = claim(&mut taken, "a");
        assigned += 1;
    }
    for block in function.blocks.iter_mut() {
        if block.name.is_empty() {
            block.name = claim(&mut taken, "bb");
            assigned += 1;
        }
        for inst in block.insts.iter_mut() {
            if inst.name.is_empty() && !inst.ty.is_void() {
                inst.name = claim(&mut taken, "v");
                assigned += 1;
            }
        }
    }
    assigned
}

/// Stable site name of instruction `id`.
///
/// Value-producing instructions must have been named by [`name_function`].
pub fn site_name(function: &Function, id: u32) -> Result<String, NamerError> {
    let inst = function
        .inst(id)
        .ok_or_else(|| NamerError::UnknownInstruction {
            function: function.name.clone(),
            id,
        })?;
    if inst.has_name() {
        return Ok(inst.name.clone());
    }
    match &inst.kind {
        Op::Store { ptr, .. } if inst.ty.is_void() => function
            .value_name(ptr)
            .map(|p| format!("__s.{p}"))
            .ok_or_else(|| NamerError::UnnamedPointer {
                function: function.name.clone(),
                id,
            }),
        other if inst.ty.is_void() => Err(NamerError::UnsupportedSite {
            function: function.name.clone(),
            id,
            opcode: other.opcode().to_string(),
        }),
        _ => Err(NamerError::UnknownInstruction {
            function: function.name.clone(),
            id,
        }),
    }
}

/// Stable name of a load, call or parameter operand.
pub fn value_site_name(function: &Function, value: &Value) -> Result<String, NamerError> {
    match value {
        Value::Inst { id } => site_name(function, *id),
        other => function
            .value_name(other)
            .map(str::to_string)
            .ok_or_else(|| NamerError::UnsupportedSite {
                function: function.name.clone(),
                id: u32::MAX,
                opcode: "operand".into(),
            }),
    }
}
