//! Simple loads and stores: invariance, access alignment, and the
//! dereferenceability and alignment of loaded pointers.

use crate::params::{alignment_for, dereferenceable_for};
use crate::stats::*;
use crate::{AnnotateError, PassState};
use common::ChoiceKind;
use ir::{namer, Function, Op, POINTER_SIZE};
use oracle::Site;

/// Widest alignment any choice produces.
const MAX_ALIGNMENT: u64 = 64;

fn is_memory_kind(kind: ChoiceKind) -> bool {
    matches!(
        kind,
        ChoiceKind::MemoryLoadInvariant
            | ChoiceKind::MemoryAccessAlign
            | ChoiceKind::MemoryAccessDereferenceable
            | ChoiceKind::MemoryAccessResultAlign
    )
}

/// Whether instruction `id` in `block` is a site of `kind`.
fn is_site(function: &Function, kind: ChoiceKind, block: usize, id: u32) -> bool {
    let Some(inst) = function.inst(id) else {
        return false;
    };
    if !inst.is_simple_access() {
        return false;
    }
    let in_loop = function.loop_for(block);
    match (&inst.kind, kind) {
        (Op::Load { ptr, .. }, ChoiceKind::MemoryLoadInvariant) => {
            let invariant_ptr = in_loop.map_or(true, |l| function.is_loop_invariant(l, ptr));
            invariant_ptr && !inst.metadata.invariant_load
        }
        (Op::Load { align, .. } | Op::Store { align, .. }, ChoiceKind::MemoryAccessAlign) => {
            in_loop.is_some() && *align < MAX_ALIGNMENT
        }
        (Op::Load { .. }, ChoiceKind::MemoryAccessDereferenceable) => {
            inst.ty.is_pointer() && inst.metadata.dereferenceable.is_none()
        }
        (Op::Load { .. }, ChoiceKind::MemoryAccessResultAlign) => {
            inst.ty.is_pointer() && inst.metadata.align.is_none()
        }
        _ => false,
    }
}

pub(crate) fn annotate(
    function: &mut Function,
    kind: ChoiceKind,
    state: &mut PassState<'_>,
) -> Result<bool, AnnotateError> {
    if !is_memory_kind(kind) {
        return Ok(false);
    }
    let sites: Vec<u32> = function
        .instructions()
        .filter(|(block, inst)| is_site(function, kind, *block, inst.id))
        .map(|(_, inst)| inst.id)
        .collect();

    let owner = function.name.clone();
    let cardinality = kind.fixed_cardinality().unwrap_or(2);
    let mut changed = false;
    for id in sites {
        let name = namer::site_name(function, id)?;
        let choice = state.resolve(
            kind,
            Site::Instruction {
                function: &owner,
                name: &name,
            },
            cardinality,
        )?;
        let Some(inst) = function.inst_mut(id) else {
            continue;
        };
        match kind {
            ChoiceKind::MemoryLoadInvariant if choice > 0 => {
                inst.metadata.invariant_load = true;
                state.stats.bump(NUM_INVARIANT_LOADS);
            }
            ChoiceKind::MemoryAccessAlign => {
                let new = alignment_for(choice);
                let (Op::Load { align, .. } | Op::Store { align, .. }) = &mut inst.kind else {
                    continue;
                };
                if *align >= new {
                    continue;
                }
                *align = new;
                state.stats.bump(NUM_ALIGNED_MEMORY_INST);
            }
            ChoiceKind::MemoryAccessDereferenceable if choice > 0 => {
                inst.metadata.dereferenceable = Some(dereferenceable_for(choice, POINTER_SIZE));
                state.stats.bump(NUM_DEREFERENCEABLE_MEMORY_INST);
            }
            ChoiceKind::MemoryAccessResultAlign if choice > 0 => {
                inst.metadata.align = Some(alignment_for(choice));
                state.stats.bump(NUM_ALIGNED_MEMORY_INST);
            }
            _ => continue,
        }
        changed = true;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{oracle_with, state};
    use ir::{Block, Instruction, Loop, Param, Type, Value};

    /// entry: load p; loop: gep, load gep, load (volatile), store, br; exit: ret
    fn function() -> Function {
        let mut f = Function::new("f");
        f.params = vec![
            Param::new("p", Type::ptr(Type::ptr(Type::int(32))), 3),
            Param::new("i", Type::int(64), 1),
        ];
        let load = |id, ptr, ty| Instruction::new(id, ty, Op::Load { ptr, align: 4, volatile: false });
        f.blocks = vec![
            Block {
                name: "entry".into(),
                insts: vec![
                    load(0, Value::Param { index: 0 }, Type::ptr(Type::int(32))).named("base"),
                    Instruction::new(1, Type::Void, Op::Br { cond: None, targets: vec![1] }),
                ],
            },
            Block {
                name: "body".into(),
                insts: vec![
                    Instruction::new(2, Type::ptr(Type::int(32)), Op::Gep {
                        base: Value::Inst { id: 0 },
                        indices: vec![Value::Param { index: 1 }],
                        inbounds: true,
                    })
                    .named("slot"),
                    load(3, Value::Inst { id: 2 }, Type::int(32)).named("x"),
                    load(4, Value::Param { index: 0 }, Type::ptr(Type::int(32))).named("again"),
                    Instruction::new(5, Type::int(32), Op::Load {
                        ptr: Value::Inst { id: 2 },
                        align: 4,
                        volatile: true,
                    })
                    .named("vol"),
                    Instruction::new(6, Type::Void, Op::Store {
                        ptr: Value::Inst { id: 2 },
                        value: Value::Inst { id: 3 },
                        align: 4,
                        volatile: false,
                    }),
                    Instruction::new(7, Type::Void, Op::Br { cond: None, targets: vec![1, 2] }),
                ],
            },
            Block {
                name: "exit".into(),
                insts: vec![Instruction::new(8, Type::Void, Op::Ret { value: None })],
            },
        ];
        f.loops = vec![Loop {
            header: 1,
            blocks: vec![1],
            latches: vec![1],
            exiting: vec![1],
            ..Default::default()
        }];
        f
    }

    #[test]
    fn test_invariant_loads_need_invariant_pointers() {
        let mut o = oracle_with(true, "");
        let mut f = function();
        let mut s = state(&mut o);
        annotate(&mut f, ChoiceKind::MemoryLoadInvariant, &mut s).unwrap();
        assert_eq!(s.stats.get(NUM_INVARIANT_LOADS), 2);
        drop(s);
        assert!(f.inst(0).unwrap().metadata.invariant_load);
        assert!(!f.inst(3).unwrap().metadata.invariant_load);
        assert!(f.inst(4).unwrap().metadata.invariant_load);
        assert!(!f.inst(5).unwrap().metadata.invariant_load);
    }

    #[test]
    fn test_alignment_only_inside_loops() {
        let mut o = oracle_with(false, "#f0f#c?212");
        o.function_ordinal("f");
        let mut f = function();
        let mut s = state(&mut o);
        annotate(&mut f, ChoiceKind::MemoryAccessAlign, &mut s).unwrap();
        assert_eq!(s.stats.get(NUM_ALIGNED_MEMORY_INST), 3);
        drop(s);
        let align = |id| match f.inst(id).unwrap().kind {
            Op::Load { align, .. } | Op::Store { align, .. } => align,
            _ => 0,
        };
        assert_eq!(align(0), 4);
        assert_eq!(align(3), 64);
        assert_eq!(align(4), 8);
        assert_eq!(align(6), 64);
        // The store is named after its pointer.
        assert_eq!(o.cached(ChoiceKind::MemoryAccessAlign, "__s.slot"), Some(3));
    }

    #[test]
    fn test_loaded_pointer_metadata() {
        let mut o = oracle_with(true, "");
        let mut f = function();
        let mut s = state(&mut o);
        annotate(&mut f, ChoiceKind::MemoryAccessDereferenceable, &mut s).unwrap();
        annotate(&mut f, ChoiceKind::MemoryAccessResultAlign, &mut s).unwrap();
        drop(s);
        let base = &f.inst(0).unwrap().metadata;
        assert_eq!(base.dereferenceable, Some(512));
        assert_eq!(base.align, Some(64));
        assert_eq!(f.inst(3).unwrap().metadata.dereferenceable, None);
    }
}
