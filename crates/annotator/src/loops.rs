//! Parallel loops.
//!
//! Loop nests are walked depth-first from each outermost loop. A loop chosen
//! parallel gets a loop id, and every memory access in its blocks is tagged
//! with the ids of the loop and all its ancestors, unless the block belongs to
//! a nested loop that was itself chosen parallel.

use crate::stats::{NUM_PARALLEL_INNERMOST_LOOPS, NUM_PARALLEL_OUTER_LOOPS};
use crate::{AnnotateError, PassState};
use common::ChoiceKind;
use ir::{Function, LoopForest};
use oracle::Site;

pub(crate) fn annotate(
    function: &mut Function,
    kind: ChoiceKind,
    state: &mut PassState<'_>,
) -> Result<bool, AnnotateError> {
    if !matches!(
        kind,
        ChoiceKind::LoopParallelInnermost | ChoiceKind::LoopParallelOuter
    ) || function.loops.is_empty()
    {
        return Ok(false);
    }

    let forest = LoopForest::new(function);
    let owner = function.name.clone();
    let mut changed = false;

    for root in forest.outermost() {
        let mut parallel = Vec::new();
        for l in forest.depth_first(root) {
            let loop_kind = if forest.is_innermost(l) {
                ChoiceKind::LoopParallelInnermost
            } else {
                ChoiceKind::LoopParallelOuter
            };
            if loop_kind != kind {
                continue;
            }
            let header = function
                .blocks
                .get(function.loops[l].header)
                .map(|b| b.name.clone())
                .unwrap_or_default();
            let site = Site::LoopHeader {
                function: &owner,
                header: &header,
            };
            if state.resolve(kind, site, 2)? == 0 {
                continue;
            }

            let fresh_id = next_loop_id(function);
            let lp = &mut function.loops[l];
            if !lp.parallel {
                lp.parallel = true;
                state.stats.bump(if kind == ChoiceKind::LoopParallelInnermost {
                    NUM_PARALLEL_INNERMOST_LOOPS
                } else {
                    NUM_PARALLEL_OUTER_LOOPS
                });
                changed = true;
            }
            lp.id.get_or_insert(fresh_id);
            parallel.push(l);
        }

        for &l in &parallel {
            changed |= tag_accesses(function, l, &parallel);
        }
    }
    Ok(changed)
}

fn next_loop_id(function: &Function) -> u32 {
    function
        .loops
        .iter()
        .filter_map(|l| l.id)
        .max()
        .map_or(0, |id| id + 1)
}

/// Tags the memory accesses of loop `l` with its id chain. Returns whether
/// any metadata changed.
fn tag_accesses(function: &mut Function, l: usize, parallel: &[usize]) -> bool {
    let ids: Vec<u32> = function
        .loop_ancestry(l)
        .into_iter()
        .filter_map(|i| function.loops[i].id)
        .collect();
    let blocks: Vec<usize> = function.loops[l]
        .blocks
        .iter()
        .copied()
        .filter(|&b| match function.loop_for(b) {
            Some(owner) => owner == l || !parallel.contains(&owner),
            None => true,
        })
        .collect();

    let mut changed = false;
    for b in blocks {
        let Some(block) = function.blocks.get_mut(b) else {
            continue;
        };
        for inst in block.insts.iter_mut().filter(|i| i.kind.may_access_memory()) {
            let existing = &inst.metadata.parallel_loop_access;
            let mut merged = ids.clone();
            for id in existing {
                if !merged.contains(id) {
                    merged.push(*id);
                }
            }
            if merged != *existing {
                inst.metadata.parallel_loop_access = merged;
                changed = true;
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{oracle_with, state};
    use ir::{Block, Instruction, Loop, Op, Param, Type, Value};

    fn access(id: u32) -> Instruction {
        Instruction::new(id, Type::Void, Op::Store {
            ptr: Value::Param { index: 0 },
            value: Value::Param { index: 1 },
            align: 4,
            volatile: false,
        })
    }

    /// outer {1, 2, 3} containing inner {2}; a second nest {4}.
    fn function() -> Function {
        let mut f = Function::new("f");
        f.params = vec![
            Param::new("p", Type::ptr(Type::int(32)), 4),
            Param::new("x", Type::int(32), 4),
        ];
        f.blocks = ["entry", "outer", "inner", "outer.latch", "solo"]
            .iter()
            .enumerate()
            .map(|(i, name)| Block {
                name: name.to_string(),
                insts: vec![access(i as u32 * 2), Instruction::new(i as u32 * 2 + 1, Type::Void, Op::Br {
                    cond: None,
                    targets: vec![],
                })],
            })
            .collect();
        f.loops = vec![
            Loop { header: 1, blocks: vec![1, 2, 3], ..Default::default() },
            Loop { header: 2, blocks: vec![2], parent: Some(0), ..Default::default() },
            Loop { header: 4, blocks: vec![4], ..Default::default() },
        ];
        f
    }

    fn tags(f: &Function, block: usize) -> Vec<u32> {
        f.blocks[block].insts[0].metadata.parallel_loop_access.clone()
    }

    #[test]
    fn test_innermost_loops_only_for_innermost_kind() {
        let mut o = oracle_with(true, "");
        let mut f = function();
        let mut s = state(&mut o);
        assert!(annotate(&mut f, ChoiceKind::LoopParallelInnermost, &mut s).unwrap());
        assert_eq!(s.stats.get(NUM_PARALLEL_INNERMOST_LOOPS), 2);
        drop(s);
        assert!(!f.loops[0].parallel);
        assert!(f.loops[1].parallel && f.loops[2].parallel);
        // The outer loop has no id, so only the inner id is attached.
        assert_eq!(tags(&f, 2), vec![0]);
        assert_eq!(tags(&f, 4), vec![1]);
        assert!(tags(&f, 1).is_empty());
        assert_eq!(o.cached(ChoiceKind::LoopParallelInnermost, "solo"), Some(2));
    }

    #[test]
    fn test_outer_loop_skips_blocks_of_parallel_subloops() {
        let mut o = oracle_with(true, "");
        let mut f = function();
        let mut s = state(&mut o);
        annotate(&mut f, ChoiceKind::LoopParallelInnermost, &mut s).unwrap();
        annotate(&mut f, ChoiceKind::LoopParallelOuter, &mut s).unwrap();
        assert_eq!(s.stats.get(NUM_PARALLEL_OUTER_LOOPS), 1);
        drop(s);
        assert_eq!(f.loops[0].id, Some(2));
        assert_eq!(tags(&f, 1), vec![2]);
        assert_eq!(tags(&f, 3), vec![2]);
        // Block 2 belongs to the inner loop, parallel since the previous kind,
        // but not in this kind's walk: it gets the outer chain too.
        assert_eq!(tags(&f, 2), vec![2, 0]);
        assert!(tags(&f, 0).is_empty());
    }

    #[test]
    fn test_pessimistic_leaves_loops_alone() {
        let mut o = oracle_with(false, "");
        let mut f = function();
        let before = f.clone();
        let mut s = state(&mut o);
        assert!(!annotate(&mut f, ChoiceKind::LoopParallelInnermost, &mut s).unwrap());
        drop(s);
        assert_eq!(f, before);
    }
}
