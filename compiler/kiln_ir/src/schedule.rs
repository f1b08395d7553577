//! Placement and ordering of floating nodes.
//!
//! Each floating node is placed in the earliest block where all of its
//! inputs are available: the deepest (in the dominator tree) of its inputs'
//! blocks, or the entry block for nodes without inputs. Within a block the
//! order is: begin node, phis, then each fixed node preceded by the floating
//! nodes it needs that have not been emitted yet. Floating nodes nobody in
//! the block needed are emitted right before the terminator.

use rustc_hash::FxHashSet;

use crate::cfg::ControlFlowGraph;
use crate::graph::Graph;
use crate::node::{BlockId, NodeClass, NodeId, NodeKind};

#[derive(Clone, Debug)]
pub struct Schedule {
    /// Indexed by `NodeId::index()`.
    placement: Vec<Option<BlockId>>,
    /// Indexed by `BlockId::index()`.
    order: Vec<Vec<NodeId>>,
}

impl Schedule {
    pub fn compute(graph: &Graph, cfg: &ControlFlowGraph) -> Self {
        let mut placement: Vec<Option<BlockId>> = vec![None; graph.node_capacity()];
        for block in graph.block_ids() {
            for &n in graph.block_nodes(block) {
                placement[n.index()] = Some(block);
            }
            for &phi in graph.phis(block) {
                placement[phi.index()] = Some(block);
            }
        }

        let ids: Vec<NodeId> = graph.node_ids().collect();
        for &id in &ids {
            if is_floating_value(graph.kind(id)) {
                place_early(graph, cfg, id, &mut placement);
            }
        }

        let mut floating_in: Vec<Vec<NodeId>> = vec![Vec::new(); graph.num_blocks()];
        for &id in &ids {
            if is_floating_value(graph.kind(id)) {
                if let Some(b) = placement[id.index()] {
                    floating_in[b.index()].push(id);
                }
            }
        }

        let mut order: Vec<Vec<NodeId>> = vec![Vec::new(); graph.num_blocks()];
        let mut emitted: FxHashSet<NodeId> = FxHashSet::default();
        for &block in cfg.block_order() {
            let list = &mut order[block.index()];
            let nodes = graph.block_nodes(block);
            let Some((&begin, rest)) = nodes.split_first() else {
                continue;
            };
            list.push(begin);
            list.extend_from_slice(graph.phis(block));
            for &fixed in rest {
                if graph.kind(fixed).is_terminator() {
                    for &leftover in &floating_in[block.index()] {
                        emit_with_inputs(graph, block, leftover, &placement, &mut emitted, list);
                    }
                }
                for &input in graph.inputs(fixed) {
                    emit_with_inputs(graph, block, input, &placement, &mut emitted, list);
                }
                list.push(fixed);
            }
        }

        Self { placement, order }
    }

    /// The block `node` is scheduled in, if any.
    #[inline]
    pub fn block_of(&self, node: NodeId) -> Option<BlockId> {
        self.placement.get(node.index()).copied().flatten()
    }

    /// Nodes of `block` in execution order.
    #[inline]
    pub fn nodes(&self, block: BlockId) -> &[NodeId] {
        &self.order[block.index()]
    }
}

/// Floating nodes other than phis; phis are pinned to their block.
fn is_floating_value(kind: NodeKind) -> bool {
    kind.class() == NodeClass::Floating && !matches!(kind, NodeKind::Phi { .. })
}

/// Place `root` and its unplaced floating inputs, inputs first.
fn place_early(
    graph: &Graph,
    cfg: &ControlFlowGraph,
    root: NodeId,
    placement: &mut [Option<BlockId>],
) {
    if placement[root.index()].is_some() {
        return;
    }
    let mut stack: Vec<(NodeId, bool)> = vec![(root, false)];
    let mut visiting: FxHashSet<NodeId> = FxHashSet::default();
    while let Some((node, inputs_done)) = stack.pop() {
        if placement[node.index()].is_some() {
            continue;
        }
        if !inputs_done {
            if !visiting.insert(node) {
                continue;
            }
            stack.push((node, true));
            for &input in graph.inputs(node) {
                if is_floating_value(graph.kind(input)) && placement[input.index()].is_none() {
                    stack.push((input, false));
                }
            }
            continue;
        }
        let mut best = graph.entry();
        for &input in graph.inputs(node) {
            let Some(b) = input_block(graph, cfg, input, placement) else {
                continue;
            };
            if cfg.is_reachable(b) && cfg.dom_depth(b) > cfg.dom_depth(best) {
                best = b;
            }
        }
        placement[node.index()] = Some(best);
    }
}

/// Block an input value becomes available in. Virtual nodes are looked
/// through to their own inputs.
fn input_block(
    graph: &Graph,
    cfg: &ControlFlowGraph,
    input: NodeId,
    placement: &[Option<BlockId>],
) -> Option<BlockId> {
    if graph.kind(input).class() != NodeClass::Virtual {
        return placement[input.index()];
    }
    // Virtual object states may nest; walk them iteratively.
    let mut deepest: Option<BlockId> = None;
    let mut seen: FxHashSet<NodeId> = FxHashSet::default();
    let mut stack = vec![input];
    while let Some(n) = stack.pop() {
        if !seen.insert(n) {
            continue;
        }
        if graph.kind(n).class() == NodeClass::Virtual {
            stack.extend(graph.inputs(n).iter().copied());
        } else if let Some(b) = placement[n.index()] {
            deepest = match deepest {
                Some(d) if cfg.dom_depth(d) >= cfg.dom_depth(b) => Some(d),
                _ => Some(b),
            };
        }
    }
    deepest
}

/// Emit `node`'s unemitted floating inputs placed in `block` in postorder,
/// then `node` itself if it is a floating value placed in `block`.
fn emit_with_inputs(
    graph: &Graph,
    block: BlockId,
    node: NodeId,
    placement: &[Option<BlockId>],
    emitted: &mut FxHashSet<NodeId>,
    list: &mut Vec<NodeId>,
) {
    let wanted = |n: NodeId, emitted: &FxHashSet<NodeId>| {
        let kind = graph.kind(n);
        (kind.class() == NodeClass::Virtual
            || (is_floating_value(kind) && placement[n.index()] == Some(block)))
            && !emitted.contains(&n)
    };
    if !wanted(node, emitted) {
        return;
    }
    let mut stack: Vec<(NodeId, bool)> = vec![(node, false)];
    let mut visiting: FxHashSet<NodeId> = FxHashSet::default();
    while let Some((n, inputs_done)) = stack.pop() {
        if emitted.contains(&n) {
            continue;
        }
        if inputs_done {
            if graph.kind(n).class() != NodeClass::Virtual {
                emitted.insert(n);
                list.push(n);
            }
            continue;
        }
        if !visiting.insert(n) {
            continue;
        }
        stack.push((n, true));
        for &input in graph.inputs(n).iter().rev() {
            if wanted(input, emitted) {
                stack.push((input, false));
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "tests use unwrap to panic on unexpected state")]
mod tests;
