//! In-bounds GEPs and no-wrap flags on overflowing binary operators.

use crate::stats::*;
use crate::{AnnotateError, PassState};
use common::ChoiceKind;
use ir::{namer, Function, Op};
use oracle::Site;

pub(crate) fn annotate(
    function: &mut Function,
    kind: ChoiceKind,
    state: &mut PassState<'_>,
) -> Result<bool, AnnotateError> {
    let candidate = |op: &Op| match (kind, op) {
        (ChoiceKind::InboundsGep, Op::Gep { inbounds, .. }) => !inbounds,
        (ChoiceKind::OverflowNoSignedWrap, Op::Binary { opcode, nsw, .. }) => {
            opcode.is_overflowing() && !nsw
        }
        (ChoiceKind::OverflowNoUnsignedWrap, Op::Binary { opcode, nuw, .. }) => {
            opcode.is_overflowing() && !nuw
        }
        _ => false,
    };
    let sites: Vec<u32> = function
        .instructions()
        .filter(|(_, inst)| candidate(&inst.kind))
        .map(|(_, inst)| inst.id)
        .collect();

    let owner = function.name.clone();
    let mut changed = false;
    for id in sites {
        let name = namer::site_name(function, id)?;
        let site = Site::Instruction {
            function: &owner,
            name: &name,
        };
        if state.resolve(kind, site, 2)? == 0 {
            continue;
        }
        let Some(inst) = function.inst_mut(id) else {
            continue;
        };
        match &mut inst.kind {
            Op::Gep { inbounds, .. } => {
                *inbounds = true;
                state.stats.bump(NUM_INBOUND_GEPS);
            }
            Op::Binary { nsw, .. } if kind == ChoiceKind::OverflowNoSignedWrap => {
                *nsw = true;
                state.stats.bump(NUM_NO_SIGNED_WRAP_OPS);
            }
            Op::Binary { nuw, .. } => {
                *nuw = true;
                state.stats.bump(NUM_NO_UNSIGNED_WRAP_OPS);
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
    use ir::{BinOp, Block, Instruction, Param, Type, Value};

    fn function() -> Function {
        let mut f = Function::new("f");
        f.params = vec![
            Param::new("p", Type::ptr(Type::int(32)), 2),
            Param::new("n", Type::int(64), 2),
        ];
        let gep = |id, inbounds| {
            Instruction::new(id, Type::ptr(Type::int(32)), Op::Gep {
                base: Value::Param { index: 0 },
                indices: vec![Value::Param { index: 1 }],
                inbounds,
            })
        };
        f.blocks = vec![Block {
            name: "entry".into(),
            insts: vec![
                gep(0, false).named("a"),
                gep(1, true).named("b"),
                gep(2, false).named("c"),
                Instruction::new(3, Type::int(64), Op::Binary {
                    opcode: BinOp::Add,
                    lhs: Value::Param { index: 1 },
                    rhs: Value::Param { index: 1 },
                    nsw: true,
                    nuw: false,
                })
                .named("sum"),
                Instruction::new(4, Type::int(64), Op::Binary {
                    opcode: BinOp::Xor,
                    lhs: Value::Param { index: 1 },
                    rhs: Value::Param { index: 1 },
                    nsw: false,
                    nuw: false,
                })
                .named("x"),
                Instruction::new(5, Type::Void, Op::Ret { value: None }),
            ],
        }];
        f
    }

    #[test]
    fn test_gep_scenario() {
        let mut o = oracle_with(false, "#f0f#c61");
        o.function_ordinal("f");
        let mut f = function();
        let mut s = state(&mut o);
        assert!(annotate(&mut f, ChoiceKind::InboundsGep, &mut s).unwrap());
        assert_eq!(s.stats.get(NUM_INBOUND_GEPS), 1);
        drop(s);
        let inbounds: Vec<bool> = f
            .instructions()
            .filter_map(|(_, i)| match i.kind {
                Op::Gep { inbounds, .. } => Some(inbounds),
                _ => None,
            })
            .collect();
        assert_eq!(inbounds, vec![true, true, false]);
        // The already in-bounds GEP is not a site.
        assert_eq!(o.lookups(ChoiceKind::InboundsGep, 0), 2);
    }

    #[test]
    fn test_wrap_flags() {
        let mut o = oracle_with(true, "");
        let mut f = function();
        let mut s = state(&mut o);
        assert!(!annotate(&mut f, ChoiceKind::OverflowNoSignedWrap, &mut s).unwrap());
        assert!(annotate(&mut f, ChoiceKind::OverflowNoUnsignedWrap, &mut s).unwrap());
        drop(s);
        assert!(matches!(f.inst(3).unwrap().kind, Op::Binary { nsw: true, nuw: true, .. }));
        assert!(matches!(f.inst(4).unwrap().kind, Op::Binary { nsw: false, nuw: false, .. }));
    }
}
