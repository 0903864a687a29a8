//! Parameter attributes: no-capture, no-alias, dereferenceable, alignment
//! and memory behavior of pointer parameters.

use crate::stats::*;
use crate::{AnnotateError, PassState};
use common::ChoiceKind;
use ir::{Function, ParamAttrs};
use oracle::Site;

/// Alignment selected by a 3-way alignment choice.
pub(crate) fn alignment_for(choice: u32) -> u64 {
    match choice {
        1 => 8,
        2 => 64,
        _ => 0,
    }
}

/// Bytes selected by a 3-way dereferenceable choice over an access of `size` bytes.
pub(crate) fn dereferenceable_for(choice: u32, size: u64) -> u64 {
    match choice {
        1 => size,
        2 => size * 64,
        _ => 0,
    }
}

pub(crate) fn annotate(
    function: &mut Function,
    kind: ChoiceKind,
    state: &mut PassState<'_>,
) -> Result<bool, AnnotateError> {
    use ChoiceKind::*;
    if !matches!(
        kind,
        ParameterNoCapture
            | ParameterNoAlias
            | ParameterDereferenceable
            | ParameterAligned
            | ParameterMemBehavior
    ) {
        return Ok(false);
    }

    let owner = function.name.clone();
    let cardinality = kind.fixed_cardinality().unwrap_or(2);
    let mut changed = false;

    for param in function.params.iter_mut() {
        if !param.ty.is_pointer() || param.num_uses == 0 {
            continue;
        }
        let applicable = match kind {
            ParameterNoCapture => !param.attrs.contains(ParamAttrs::NO_CAPTURE),
            ParameterNoAlias => !param.attrs.contains(ParamAttrs::NO_ALIAS),
            ParameterDereferenceable => param.dereferenceable == 0,
            ParameterAligned => param.align == 0,
            _ => !param
                .attrs
                .intersects(ParamAttrs::READ_NONE | ParamAttrs::READ_ONLY | ParamAttrs::WRITE_ONLY),
        };
        if !applicable {
            continue;
        }

        let site = Site::Parameter {
            function: &owner,
            name: &param.name,
        };
        let choice = state.resolve(kind, site, cardinality)?;
        if choice == 0 {
            continue;
        }

        match kind {
            ParameterNoCapture => {
                param.attrs.insert(ParamAttrs::NO_CAPTURE);
                state.stats.bump(NUM_NO_CAPTURE_PARAMETERS);
            }
            ParameterNoAlias => {
                param.attrs.insert(ParamAttrs::NO_ALIAS);
                state.stats.bump(NUM_NO_ALIAS_PARAMETERS);
            }
            ParameterDereferenceable => {
                param.dereferenceable = dereferenceable_for(choice, param.ty.pointee_size());
                state.stats.bump(NUM_DEREFERENCEABLE_PARAMETERS);
            }
            ParameterAligned => {
                param.align = alignment_for(choice);
                state.stats.bump(NUM_ALIGNED_PARAMETERS);
            }
            _ => {
                let (attr, counter) = match choice {
                    3 => (ParamAttrs::READ_NONE, NUM_READ_NONE_PARAMETERS),
                    2 => (ParamAttrs::READ_ONLY, NUM_READ_ONLY_PARAMETERS),
                    _ => (ParamAttrs::WRITE_ONLY, NUM_WRITE_ONLY_PARAMETERS),
                };
                param.attrs.insert(attr);
                state.stats.bump(counter);
            }
        }
        tracing::trace!(function = %owner, param = %param.name, %kind, choice, "annotated parameter");
        changed = true;
    }
    Ok(changed)
}
