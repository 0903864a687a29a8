//! Function-level kinds: internalization, no-unwind, memory effects, return
//! attributes and the returned parameter.

use crate::params::dereferenceable_for;
use crate::stats::*;
use crate::{AnnotateError, PassState};
use common::{ChoiceKind, SiteShape};
use ir::{FnAttrs, Function, Linkage, ParamAttrs};
use oracle::Site;

pub(crate) const ASSUME: &str = "llvm.assume";

/// Attributes and counters of each nonzero memory-effect choice.
fn mem_effect(choice: u32) -> Option<(FnAttrs, &'static [&'static str])> {
    let effect: (FnAttrs, &'static [&'static str]) = match choice {
        13 => (
            FnAttrs::READ_NONE | FnAttrs::SPECULATABLE,
            &[NUM_READ_NONE_FUNCTIONS, NUM_FUNCTIONS_SPECULATABLE],
        ),
        12 => (FnAttrs::READ_NONE, &[NUM_READ_NONE_FUNCTIONS]),
        11 => (
            FnAttrs::INACCESSIBLE_MEM_ONLY | FnAttrs::READ_ONLY,
            &[NUM_FUNCTIONS_INACCESSIBLE_ONLY, NUM_READ_ONLY_FUNCTIONS],
        ),
        10 => (
            FnAttrs::ARG_MEM_ONLY | FnAttrs::READ_ONLY,
            &[NUM_FUNCTIONS_ARG_MEM_ONLY, NUM_READ_ONLY_FUNCTIONS],
        ),
        9 => (
            FnAttrs::INACCESSIBLE_OR_ARG_MEM_ONLY | FnAttrs::READ_ONLY,
            &[NUM_FUNCTIONS_ARG_MEM_OR_INACCESSIBLE_ONLY, NUM_READ_ONLY_FUNCTIONS],
        ),
        8 => (FnAttrs::READ_ONLY, &[NUM_READ_ONLY_FUNCTIONS]),
        7 => (
            FnAttrs::INACCESSIBLE_MEM_ONLY | FnAttrs::WRITE_ONLY,
            &[NUM_FUNCTIONS_INACCESSIBLE_ONLY, NUM_WRITE_ONLY_FUNCTIONS],
        ),
        6 => (
            FnAttrs::ARG_MEM_ONLY | FnAttrs::WRITE_ONLY,
            &[NUM_FUNCTIONS_ARG_MEM_ONLY, NUM_WRITE_ONLY_FUNCTIONS],
        ),
        5 => (
            FnAttrs::INACCESSIBLE_OR_ARG_MEM_ONLY | FnAttrs::WRITE_ONLY,
            &[NUM_FUNCTIONS_ARG_MEM_OR_INACCESSIBLE_ONLY, NUM_WRITE_ONLY_FUNCTIONS],
        ),
        4 => (FnAttrs::WRITE_ONLY, &[NUM_WRITE_ONLY_FUNCTIONS]),
        3 => (FnAttrs::INACCESSIBLE_MEM_ONLY, &[NUM_FUNCTIONS_INACCESSIBLE_ONLY]),
        2 => (FnAttrs::ARG_MEM_ONLY, &[NUM_FUNCTIONS_ARG_MEM_ONLY]),
        1 => (
            FnAttrs::INACCESSIBLE_OR_ARG_MEM_ONLY,
            &[NUM_FUNCTIONS_ARG_MEM_OR_INACCESSIBLE_ONLY],
        ),
        _ => return None,
    };
    Some(effect)
}

pub(crate) fn annotate(
    function: &mut Function,
    kind: ChoiceKind,
    state: &mut PassState<'_>,
) -> Result<bool, AnnotateError> {
    if function.num_uses == 0 && !function.is_intrinsic() {
        return Ok(false);
    }
    let owner = function.name.clone();
    let site = Site::Function { function: &owner };
    let mut changed = false;

    if function.attrs.contains(FnAttrs::SPECULATABLE) && !function.attrs.contains(FnAttrs::READ_NONE)
    {
        function.attrs.insert(FnAttrs::READ_NONE);
        changed = true;
    }

    match kind {
        ChoiceKind::FunctionInternal
            if !function.is_declaration()
                && !function.has_internal_linkage()
                && function.num_uses > 0 =>
        {
            if state.resolve(kind, site, 2)? > 0 {
                function.linkage = Linkage::Internal;
                state.stats.bump(NUM_FUNCTIONS_INTERNALIZED);
                changed = true;
            }
        }
        ChoiceKind::FunctionNoUnwind if !function.attrs.contains(FnAttrs::NO_UNWIND) => {
            if state.resolve(kind, site, 2)? > 0 {
                function.attrs.insert(FnAttrs::NO_UNWIND);
                state.stats.bump(NUM_FUNCTIONS_NO_UNWIND);
                changed = true;
            }
        }
        ChoiceKind::FunctionMemEffects => {
            changed |= annotate_mem_effects(function, &owner, state)?;
        }
        ChoiceKind::FunctionReturnNoAlias
            if function.return_type.is_pointer()
                && !function.attrs.contains(FnAttrs::RET_NO_ALIAS) =>
        {
            if state.resolve(kind, site, 2)? > 0 {
                function.attrs.insert(FnAttrs::RET_NO_ALIAS);
                state.stats.bump(NUM_FUNCTIONS_NO_ALIAS_RETURN);
                changed = true;
            }
        }
        ChoiceKind::FunctionReturnDereferenceable
            if function.return_type.is_pointer() && function.ret_dereferenceable == 0 =>
        {
            let choice = state.resolve(kind, site, 3)?;
            if choice > 0 {
                function.ret_dereferenceable =
                    dereferenceable_for(choice, function.return_type.pointee_size());
                state.stats.bump(NUM_FUNCTIONS_DEREFERENCEABLE_RETURN);
                changed = true;
            }
        }
        ChoiceKind::ParameterReturned if function.return_type.is_pointer() => {
            changed |= annotate_returned(function, &owner, state)?;
        }
        _ => {}
    }
    Ok(changed)
}

fn annotate_mem_effects(
    function: &mut Function,
    owner: &str,
    state: &mut PassState<'_>,
) -> Result<bool, AnnotateError> {
    let attrs = function.attrs;
    let (shape, has_range) = if owner == ASSUME {
        (
            SiteShape::AssumeIntrinsic,
            attrs.contains(FnAttrs::INACCESSIBLE_MEM_ONLY)
                && attrs.intersects(FnAttrs::READ_NONE | FnAttrs::WRITE_ONLY),
        )
    } else {
        (
            SiteShape::Plain,
            attrs.intersects(FnAttrs::SPECULATABLE | FnAttrs::READ_NONE | FnAttrs::LOCATION_LIMITS),
        )
    };
    if attrs.contains(FnAttrs::READ_NONE) || has_range {
        return Ok(false);
    }

    let kind = ChoiceKind::FunctionMemEffects;
    let choice = state.resolve(kind, Site::Function { function: owner }, kind.cardinality(shape))?;
    let Some((effect, counters)) = mem_effect(choice) else {
        return Ok(false);
    };
    function.attrs.remove(FnAttrs::READ_ONLY | FnAttrs::WRITE_ONLY);
    function.attrs.insert(effect);
    for &counter in counters {
        state.stats.bump(counter);
    }
    tracing::trace!(function = owner, choice, attrs = ?function.attrs, "memory effects");
    Ok(true)
}

/// Marks one of the parameters typed like the return value as returned.
/// Decision `d` picks candidate `len - d`.
fn annotate_returned(
    function: &mut Function,
    owner: &str,
    state: &mut PassState<'_>,
) -> Result<bool, AnnotateError> {
    let candidates: Vec<usize> = function
        .params
        .iter()
        .enumerate()
        .filter(|(_, p)| p.ty == function.return_type)
        .map(|(i, _)| i)
        .collect();
    if candidates.is_empty() {
        return Ok(false);
    }

    let kind = ChoiceKind::ParameterReturned;
    let shape = SiteShape::ReturnCandidates(candidates.len() as u32);
    let choice = state.resolve(kind, Site::Function { function: owner }, kind.cardinality(shape))?;
    if choice == 0 {
        return Ok(false);
    }
    let index = candidates[candidates.len() - choice as usize];
    let param = &mut function.params[index];
    if param.attrs.contains(ParamAttrs::RETURNED) {
        return Ok(false);
    }
    param.attrs.insert(ParamAttrs::RETURNED);
    state.stats.bump(NUM_RETURNED_PARAMETERS);
    Ok(true)
}
