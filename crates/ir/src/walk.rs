//! Loop structure and value queries over a [`Function`].

use crate::model::{Function, Op, Value};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

/// Loop nesting forest of one function. Nodes carry indices into `Function::loops`.
pub struct LoopForest {
    graph: DiGraph<usize, ()>,
    roots: Vec<NodeIndex>,
}

impl LoopForest {
    pub fn new(function: &Function) -> Self {
        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..function.loops.len()).map(|i| graph.add_node(i)).collect();
        let mut roots = Vec::new();
        for (i, l) in function.loops.iter().enumerate() {
            match l.parent.and_then(|p| nodes.get(p)) {
                Some(&parent) => {
                    graph.add_edge(parent, nodes[i], ());
                }
                None => roots.push(nodes[i]),
            }
        }
        Self { graph, roots }
    }

    /// Outermost loops in declaration order.
    pub fn outermost(&self) -> Vec<usize> {
        self.roots.iter().map(|&n| self.graph[n]).collect()
    }

    /// Pre-order walk of the nest rooted at loop `root`; subloops in
    /// declaration order.
    pub fn depth_first(&self, root: usize) -> Vec<usize> {
        let Some(start) = self.graph.node_indices().find(|&n| self.graph[n] == root) else {
            return Vec::new();
        };
        let mut dfs = Dfs::new(&self.graph, start);
        let mut order = Vec::new();
        while let Some(node) = dfs.next(&self.graph) {
            order.push(self.graph[node]);
        }
        order
    }

    /// Every loop, nest by nest, each nest depth-first.
    pub fn walk(&self) -> Vec<usize> {
        self.outermost()
            .into_iter()
            .flat_map(|root| self.depth_first(root))
            .collect()
    }

    pub fn is_innermost(&self, l: usize) -> bool {
        self.graph
            .node_indices()
            .find(|&n| self.graph[n] == l)
            .map_or(true, |n| self.graph.neighbors(n).next().is_none())
    }
}

impl Function {
    /// Nesting depth of loop `l` (outermost = 1).
    pub fn loop_depth(&self, l: usize) -> usize {
        self.loop_ancestry(l).len()
    }

    /// Innermost loop containing `block`.
    pub fn loop_for(&self, block: usize) -> Option<usize> {
        self.loops
            .iter()
            .enumerate()
            .filter(|(_, l)| l.contains(block))
            .max_by_key(|(i, _)| self.loop_depth(*i))
            .map(|(i, _)| i)
    }

    /// Loop `l` followed by its ancestors. A cyclic parent chain (rejected by
    /// `Module::validate`) stops once every loop has been visited.
    pub fn loop_ancestry(&self, l: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut current = Some(l);
        while let Some(i) = current {
            if chain.len() > self.loops.len() || chain.contains(&i) {
                break;
            }
            chain.push(i);
            current = self.loops.get(i).and_then(|lp| lp.parent);
        }
        chain
    }

    /// Values that are not instructions are invariant in every loop; an
    /// instruction is invariant if it is defined outside the loop.
    pub fn is_loop_invariant(&self, l: usize, value: &Value) -> bool {
        match value {
            Value::Inst { id } => match (self.locate(*id), self.loops.get(l)) {
                (Some((block, _)), Some(lp)) => !lp.contains(block),
                _ => true,
            },
            _ => true,
        }
    }

    /// Looks through casts.
    pub fn strip_casts<'a>(&'a self, mut value: &'a Value) -> &'a Value {
        while let Value::Inst { id } = value {
            match self.inst(*id).map(|i| &i.kind) {
                Some(Op::Cast { value: inner }) => value = inner,
                _ => break,
            }
        }
        value
    }

    /// Object a pointer is derived from, looking through GEPs and casts.
    pub fn underlying_object<'a>(&'a self, mut value: &'a Value) -> &'a Value {
        while let Value::Inst { id } = value {
            match self.inst(*id).map(|i| &i.kind) {
                Some(Op::Cast { value: inner }) | Some(Op::Gep { base: inner, .. }) => value = inner,
                _ => break,
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Block, Instruction, Loop, Type};

    fn nest() -> Function {
        let mut f = Function::new("nest");
        f.blocks = (0..6)
            .map(|i| Block {
                name: format!("b{i}"),
                insts: Vec::new(),
            })
            .collect();
        // 0: outer {1..4}, 1: inner A {2}, 2: inner B {3}, 3: separate {5}
        f.loops = vec![
            Loop { header: 1, blocks: vec![1, 2, 3, 4], ..Default::default() },
            Loop { header: 2, blocks: vec![2], parent: Some(0), ..Default::default() },
            Loop { header: 3, blocks: vec![3], parent: Some(0), ..Default::default() },
            Loop { header: 5, blocks: vec![5], ..Default::default() },
        ];
        f
    }

    #[test]
    fn test_walk_order() {
        let f = nest();
        let forest = LoopForest::new(&f);
        assert_eq!(forest.outermost(), vec![0, 3]);
        assert_eq!(forest.walk(), vec![0, 1, 2, 3]);
        assert!(!forest.is_innermost(0));
        assert!(forest.is_innermost(1));
        assert!(forest.is_innermost(3));
    }

    #[test]
    fn test_innermost_loop_for_block() {
        let f = nest();
        assert_eq!(f.loop_for(2), Some(1));
        assert_eq!(f.loop_for(4), Some(0));
        assert_eq!(f.loop_for(0), None);
        assert_eq!(f.loop_ancestry(2), vec![2, 0]);
    }

    #[test]
    fn test_cyclic_parents_terminate() {
        let mut f = nest();
        f.loops[0].parent = Some(0);
        assert_eq!(f.loop_ancestry(0), vec![0]);
        assert_eq!(f.loop_for(4), Some(0));

        f.loops[0].parent = Some(1);
        assert_eq!(f.loop_ancestry(2), vec![2, 0, 1]);
        assert_eq!(f.loop_depth(1), 2);
        assert!(f.loop_for(2).is_some());
    }

    #[test]
    fn test_underlying_object_and_invariance() {
        let mut f = nest();
        f.params.push(crate::model::Param::new("p", Type::ptr(Type::int(32)), 1));
        f.blocks[0].insts.push(Instruction::new(
            0,
            Type::ptr(Type::int(32)),
            Op::Gep { base: Value::Param { index: 0 }, indices: vec![], inbounds: false },
        ));
        f.blocks[2].insts.push(Instruction::new(
            1,
            Type::ptr(Type::int(8)),
            Op::Cast { value: Value::Inst { id: 0 } },
        ));
        let cast = Value::Inst { id: 1 };
        assert_eq!(f.underlying_object(&cast), &Value::Param { index: 0 });
        assert_eq!(f.strip_casts(&cast), &Value::Inst { id: 0 });
        assert!(f.is_loop_invariant(1, &Value::Inst { id: 0 }));
        assert!(!f.is_loop_invariant(1, &cast));
        assert!(f.is_loop_invariant(1, &Value::Param { index: 0 }));
    }
}
