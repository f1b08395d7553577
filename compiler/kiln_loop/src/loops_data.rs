use std::cmp::Reverse;

use rustc_hash::FxHashMap;
use tracing::debug;

use kiln_ir::{ControlFlowGraph, Graph, Loop, LoopId, NodeId};

use crate::loop_ex::LoopEx;

/// All analyzed loops of one compilation unit.
///
/// Loops are kept in discovery order. The two lookup maps (by loop id and by
/// header begin node) are built once and cover every loop exactly once.
#[derive(Clone, Debug, Default)]
pub struct LoopsData {
    loops: Vec<LoopEx>,
    by_id: FxHashMap<LoopId, usize>,
    by_header: FxHashMap<NodeId, usize>,
}

impl LoopsData {
    /// Analyze every loop of `cfg`.
    pub fn compute(graph: &Graph, cfg: &ControlFlowGraph) -> Self {
        Self::build(graph, cfg, cfg.loops().to_vec())
    }

    /// Analyze an explicit list of raw loops, in the given order.
    pub fn from_loops(graph: &Graph, loops: Vec<Loop>) -> Self {
        let cfg = ControlFlowGraph::compute(graph);
        Self::build(graph, &cfg, loops)
    }

    fn build(graph: &Graph, cfg: &ControlFlowGraph, raw: Vec<Loop>) -> Self {
        let mut data = Self {
            loops: Vec::with_capacity(raw.len()),
            by_id: FxHashMap::default(),
            by_header: FxHashMap::default(),
        };
        for lp in raw {
            let ex = LoopEx::analyze(graph, cfg, lp);
            let index = data.loops.len();
            let fresh_id = data.by_id.insert(ex.id(), index).is_none();
            let fresh_header = data.by_header.insert(ex.begin(), index).is_none();
            debug_assert!(fresh_id && fresh_header, "loop {} registered twice", ex.id());
            data.loops.push(ex);
        }
        debug!(
            loops = data.loops.len(),
            counted = data.loops.iter().filter(|l| l.is_counted()).count(),
            "loop analysis finished"
        );
        data
    }

    /// Loops in discovery order.
    #[inline]
    pub fn loops(&self) -> &[LoopEx] {
        &self.loops
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    pub fn loop_for(&self, id: LoopId) -> Option<&LoopEx> {
        self.by_id.get(&id).map(|&i| &self.loops[i])
    }

    /// The loop whose header begins with `begin`.
    pub fn loop_for_header(&self, begin: NodeId) -> Option<&LoopEx> {
        self.by_header.get(&begin).map(|&i| &self.loops[i])
    }

    /// Loops by ascending nesting depth; equal depths keep discovery order.
    pub fn outermost_first(&self) -> Vec<&LoopEx> {
        let mut sorted: Vec<&LoopEx> = self.loops.iter().collect();
        sorted.sort_by_key(|l| l.depth());
        sorted
    }

    /// Loops by descending nesting depth; equal depths keep discovery order.
    pub fn innermost_first(&self) -> Vec<&LoopEx> {
        let mut sorted: Vec<&LoopEx> = self.loops.iter().collect();
        sorted.sort_by_key(|l| Reverse(l.depth()));
        sorted
    }

    /// Loops with a recognized counted pattern, in discovery order.
    pub fn counted_loops(&self) -> Vec<&LoopEx> {
        self.loops.iter().filter(|l| l.is_counted()).collect()
    }
}
