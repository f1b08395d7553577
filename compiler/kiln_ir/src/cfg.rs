//! Control-flow graph derived from a [`Graph`]'s blocks.
//!
//! The CFG is a snapshot: it is computed from the terminators of each block
//! and must be recomputed after any pass that changes block structure.
//! Only blocks reachable from the entry take part in predecessor lists,
//! dominators and loops.
//!
//! Dominators use the Cooper-Harvey-Kennedy iterative algorithm over reverse
//! postorder. Natural loops are found from back edges (`u -> h` where `h`
//! dominates `u`); a retreating edge whose target does not dominate its
//! source marks the graph as irreducible.

use std::cmp::Ordering;
use std::fmt;

use smallvec::SmallVec;

use crate::graph::Graph;
use crate::node::BlockId;

/// Index of a loop in [`ControlFlowGraph::loops`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct LoopId(u32);

impl LoopId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A natural loop of the CFG.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Loop {
    pub id: LoopId,
    pub header: BlockId,
    /// Body blocks including the header, ascending.
    pub blocks: Vec<BlockId>,
    /// Sources of the back edges into `header`, ascending.
    pub back_edges: Vec<BlockId>,
    /// Edges `(inside, outside)` leaving the loop.
    pub exits: Vec<(BlockId, BlockId)>,
    /// Nesting depth; 0 for an outermost loop.
    pub depth: u32,
    pub parent: Option<LoopId>,
}

impl Loop {
    #[inline]
    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.binary_search(&block).is_ok()
    }
}

/// Successors, predecessors, orderings, dominators and loops of a graph.
#[derive(Clone, Debug)]
pub struct ControlFlowGraph {
    successors: Vec<SmallVec<[BlockId; 2]>>,
    predecessors: Vec<SmallVec<[BlockId; 4]>>,
    reachable: Vec<bool>,
    postorder: Vec<BlockId>,
    rpo_pos: Vec<usize>,
    block_order: Vec<BlockId>,
    idom: Vec<Option<BlockId>>,
    dom_depth: Vec<u32>,
    loops: Vec<Loop>,
    innermost_loop: Vec<Option<LoopId>>,
    irreducible: bool,
}

impl ControlFlowGraph {
    pub fn compute(graph: &Graph) -> Self {
        let n = graph.num_blocks();
        let entry = graph.entry();

        let mut successors: Vec<SmallVec<[BlockId; 2]>> = Vec::with_capacity(n);
        for block in graph.block_ids() {
            let mut succs: SmallVec<[BlockId; 2]> = graph
                .terminator(block)
                .map(|t| graph.kind(t).successors())
                .unwrap_or_default();
            succs.dedup();
            successors.push(succs);
        }

        let postorder = compute_postorder(entry, &successors);
        let mut reachable = vec![false; n];
        for &b in &postorder {
            reachable[b.index()] = true;
        }
        let mut rpo_pos = vec![usize::MAX; n];
        for (pos, &b) in postorder.iter().rev().enumerate() {
            rpo_pos[b.index()] = pos;
        }

        let mut predecessors: Vec<SmallVec<[BlockId; 4]>> = vec![SmallVec::new(); n];
        for block in graph.block_ids() {
            if !reachable[block.index()] {
                continue;
            }
            for &succ in &successors[block.index()] {
                predecessors[succ.index()].push(block);
            }
        }

        let rpo: Vec<BlockId> = postorder.iter().rev().copied().collect();
        let idom = compute_idom(entry, &rpo, &rpo_pos, &predecessors);
        let mut dom_depth = vec![0u32; n];
        for &b in rpo.iter().skip(1) {
            if let Some(d) = idom[b.index()] {
                dom_depth[b.index()] = dom_depth[d.index()] + 1;
            }
        }

        let mut cfg = Self {
            successors,
            predecessors,
            reachable,
            postorder,
            rpo_pos,
            block_order: Vec::new(),
            idom,
            dom_depth,
            loops: Vec::new(),
            innermost_loop: vec![None; n],
            irreducible: false,
        };
        cfg.find_loops(&rpo);
        cfg.block_order = if cfg.irreducible {
            rpo
        } else {
            cfg.loop_contiguous_order(&rpo)
        };

        tracing::trace!(
            blocks = n,
            loops = cfg.loops.len(),
            irreducible = cfg.irreducible,
            "computed control-flow graph"
        );
        cfg
    }

    fn find_loops(&mut self, rpo: &[BlockId]) {
        let mut headers: Vec<(BlockId, Vec<BlockId>)> = Vec::new();
        for &u in rpo {
            for &h in &self.successors[u.index()] {
                if self.dominates(h, u) {
                    match headers.iter_mut().find(|(hh, _)| *hh == h) {
                        Some((_, sources)) => sources.push(u),
                        None => headers.push((h, vec![u])),
                    }
                } else if self.rpo_pos[h.index()] <= self.rpo_pos[u.index()] {
                    self.irreducible = true;
                }
            }
        }
        if self.irreducible {
            return;
        }
        headers.sort_by_key(|(h, _)| self.rpo_pos[h.index()]);

        for (raw, (header, mut sources)) in headers.into_iter().enumerate() {
            sources.sort_unstable();
            let mut in_body = vec![false; self.successors.len()];
            in_body[header.index()] = true;
            let mut stack: Vec<BlockId> = sources.clone();
            while let Some(b) = stack.pop() {
                if in_body[b.index()] {
                    continue;
                }
                in_body[b.index()] = true;
                stack.extend(self.predecessors[b.index()].iter().copied());
            }
            #[expect(clippy::cast_possible_truncation, reason = "block count fits in u32")]
            let blocks: Vec<BlockId> = in_body
                .iter()
                .enumerate()
                .filter(|(_, &inside)| inside)
                .map(|(i, _)| BlockId::new(i as u32))
                .collect();
            let mut exits = Vec::new();
            for &b in &blocks {
                for &s in &self.successors[b.index()] {
                    if !in_body[s.index()] {
                        exits.push((b, s));
                    }
                }
            }
            #[expect(clippy::cast_possible_truncation, reason = "loop count fits in u32")]
            let id = LoopId::new(raw as u32);
            // Enclosing loops have earlier headers, so they are already built.
            let parent = self
                .loops
                .iter()
                .filter(|l| l.contains(header))
                .min_by_key(|l| l.blocks.len())
                .map(|l| l.id);
            let depth = parent.map_or(0, |p| self.loops[p.index()].depth + 1);
            self.loops.push(Loop {
                id,
                header,
                blocks,
                back_edges: sources,
                exits,
                depth,
                parent,
            });
        }

        for l in &self.loops {
            for &b in &l.blocks {
                let slot = &mut self.innermost_loop[b.index()];
                let deeper = match *slot {
                    Some(current) => self.loops[current.index()].depth < l.depth,
                    None => true,
                };
                if deeper {
                    *slot = Some(l.id);
                }
            }
        }
    }

    /// Reverse postorder with every loop body laid out contiguously.
    fn loop_contiguous_order(&self, rpo: &[BlockId]) -> Vec<BlockId> {
        let key = |b: BlockId| -> SmallVec<[usize; 4]> {
            let mut chain: SmallVec<[usize; 4]> = SmallVec::new();
            let mut current = self.innermost_loop[b.index()];
            while let Some(l) = current {
                let l = &self.loops[l.index()];
                chain.push(self.rpo_pos[l.header.index()]);
                current = l.parent;
            }
            chain.reverse();
            chain.push(self.rpo_pos[b.index()]);
            chain
        };
        let mut keyed: Vec<(SmallVec<[usize; 4]>, BlockId)> =
            rpo.iter().map(|&b| (key(b), b)).collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.into_iter().map(|(_, b)| b).collect()
    }

    // ── Queries ─────────────────────────────────────────────────

    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.successors.len()
    }

    #[inline]
    pub fn successors(&self, block: BlockId) -> &[BlockId] {
        &self.successors[block.index()]
    }

    /// Reachable predecessors, ascending by block index. Phi inputs follow
    /// this order.
    #[inline]
    pub fn predecessors(&self, block: BlockId) -> &[BlockId] {
        &self.predecessors[block.index()]
    }

    pub fn predecessor_index(&self, block: BlockId, pred: BlockId) -> Option<usize> {
        self.predecessors[block.index()]
            .iter()
            .position(|&p| p == pred)
    }

    #[inline]
    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.reachable[block.index()]
    }

    #[inline]
    pub fn postorder(&self) -> &[BlockId] {
        &self.postorder
    }

    /// Reachable blocks in reverse postorder with loop bodies contiguous.
    #[inline]
    pub fn block_order(&self) -> &[BlockId] {
        &self.block_order
    }

    #[inline]
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        self.idom[block.index()]
    }

    #[inline]
    pub fn dom_depth(&self, block: BlockId) -> u32 {
        self.dom_depth[block.index()]
    }

    /// Does `a` dominate `b`? A block dominates itself.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if !self.reachable[a.index()] || !self.reachable[b.index()] {
            return false;
        }
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.idom[current.index()] {
                Some(d) if d != current => current = d,
                _ => return false,
            }
        }
    }

    #[inline]
    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    #[inline]
    pub fn loop_data(&self, id: LoopId) -> &Loop {
        &self.loops[id.index()]
    }

    /// The innermost loop containing `block`.
    #[inline]
    pub fn loop_of(&self, block: BlockId) -> Option<LoopId> {
        self.innermost_loop[block.index()]
    }

    pub fn header_loop(&self, block: BlockId) -> Option<LoopId> {
        self.loops.iter().find(|l| l.header == block).map(|l| l.id)
    }

    pub fn is_back_edge(&self, from: BlockId, to: BlockId) -> bool {
        self.header_loop(to)
            .is_some_and(|l| self.loops[l.index()].back_edges.contains(&from))
    }

    #[inline]
    pub fn is_irreducible(&self) -> bool {
        self.irreducible
    }

    /// Compare two blocks by their position in [`block_order`](Self::block_order).
    pub fn order_cmp(&self, a: BlockId, b: BlockId) -> Ordering {
        let pos = |x: BlockId| self.block_order.iter().position(|&y| y == x);
        pos(a).cmp(&pos(b))
    }
}

/// Iterative DFS postorder from `entry`; only reachable blocks are listed.
fn compute_postorder(entry: BlockId, successors: &[SmallVec<[BlockId; 2]>]) -> Vec<BlockId> {
    let mut visited = vec![false; successors.len()];
    let mut postorder = Vec::with_capacity(successors.len());
    // (block, index of the next successor to visit)
    let mut stack: Vec<(BlockId, usize)> = vec![(entry, 0)];
    visited[entry.index()] = true;

    while let Some(&mut (block, ref mut next)) = stack.last_mut() {
        let succs = &successors[block.index()];
        if let Some(&succ) = succs.get(*next) {
            *next += 1;
            if !visited[succ.index()] {
                visited[succ.index()] = true;
                stack.push((succ, 0));
            }
        } else {
            postorder.push(block);
            stack.pop();
        }
    }
    postorder
}

fn compute_idom(
    entry: BlockId,
    rpo: &[BlockId],
    rpo_pos: &[usize],
    preds: &[SmallVec<[BlockId; 4]>],
) -> Vec<Option<BlockId>> {
    let mut idom: Vec<Option<BlockId>> = vec![None; rpo_pos.len()];
    idom[entry.index()] = Some(entry);

    let mut changed = true;
    while changed {
        changed = false;
        for &block in rpo.iter().skip(1) {
            let mut processed = preds[block.index()]
                .iter()
                .copied()
                .filter(|p| idom[p.index()].is_some());
            let Some(first) = processed.next() else {
                continue;
            };
            let new_idom = processed.fold(first, |acc, p| intersect(p, acc, &idom, rpo_pos));
            if idom[block.index()] != Some(new_idom) {
                idom[block.index()] = Some(new_idom);
                changed = true;
            }
        }
    }
    idom
}

/// Walk two fingers up the dominator tree until they meet.
fn intersect(
    mut a: BlockId,
    mut b: BlockId,
    idom: &[Option<BlockId>],
    rpo_pos: &[usize],
) -> BlockId {
    while a != b {
        while rpo_pos[a.index()] > rpo_pos[b.index()] {
            let Some(next) = idom[a.index()] else {
                debug_assert!(false, "broken idom chain at {a}");
                return a;
            };
            a = next;
        }
        while rpo_pos[b.index()] > rpo_pos[a.index()] {
            let Some(next) = idom[b.index()] else {
                debug_assert!(false, "broken idom chain at {b}");
                return b;
            };
            b = next;
        }
    }
    a
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "tests use unwrap to panic on unexpected state")]
mod tests;
