//! Local simplification of floating nodes and dead code elimination.
//!
//! [`canonicalize`] runs a worklist over floating nodes. Each rule either
//! leaves the node alone or names an existing (or freshly uniqued constant)
//! node that replaces it at all usages; users of a replaced node are pushed
//! back on the worklist. Replaced nodes are not deleted here;
//! [`dead_code_elimination`] sweeps everything no longer reachable from the
//! nodes placed in blocks.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::graph::{Graph, GraphError};
use crate::meta::ValueKind;
use crate::node::{BinaryOp, CompareOp, Constant, NodeClass, NodeId, NodeKind};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CanonicalizeStats {
    /// Nodes replaced by a simpler equivalent.
    pub replaced: usize,
    /// Nodes deleted by dead code elimination.
    pub removed: usize,
}

/// Simplify floating nodes to a fixed point, then remove dead nodes.
pub fn canonicalize(graph: &mut Graph) -> Result<CanonicalizeStats, GraphError> {
    let mut worklist: Vec<NodeId> = graph
        .node_ids()
        .filter(|&n| graph.kind(n).class() == NodeClass::Floating)
        .collect();
    worklist.reverse();
    let mut queued: FxHashSet<NodeId> = worklist.iter().copied().collect();
    let mut replaced = 0;

    while let Some(node) = worklist.pop() {
        queued.remove(&node);
        if !graph.is_alive(node) || graph.usages(node).is_empty() {
            continue;
        }
        let Some(replacement) = simplify(graph, node) else {
            continue;
        };
        if replacement == node {
            continue;
        }
        trace!(%node, kind = graph.kind(node).name(), %replacement, "canonicalized");
        let users = graph.snapshot_usages(node);
        graph.replace_at_usages(node, replacement);
        replaced += 1;
        for user in users {
            if graph.kind(user).class() == NodeClass::Floating && queued.insert(user) {
                worklist.push(user);
            }
        }
    }

    let removed = dead_code_elimination(graph)?;
    debug!(replaced, removed, "canonicalization finished");
    Ok(CanonicalizeStats { replaced, removed })
}

/// The node `node` can be replaced with, if any rule applies.
fn simplify(graph: &mut Graph, node: NodeId) -> Option<NodeId> {
    let inputs: SmallVec<[NodeId; 4]> = graph.inputs(node).iter().copied().collect();
    match graph.kind(node) {
        NodeKind::Binary(op) => {
            let (x, y) = (inputs[0], inputs[1]);
            simplify_binary(graph, node, op, x, y)
        }
        NodeKind::Compare(op) => {
            let (x, y) = (inputs[0], inputs[1]);
            if let (Some(a), Some(b)) = (int_value(graph, x), int_value(graph, y)) {
                return Some(graph.int(i32::from(op.evaluate(a, b))));
            }
            if x == y && is_integral(graph.value_kind(x)) {
                let holds = matches!(op, CompareOp::Eq | CompareOp::Le | CompareOp::Ge);
                return Some(graph.int(i32::from(holds)));
            }
            None
        }
        NodeKind::Conditional => {
            let (c, t, f) = (inputs[0], inputs[1], inputs[2]);
            if t == f {
                return Some(t);
            }
            int_value(graph, c).map(|v| if v != 0 { t } else { f })
        }
        NodeKind::IsNull => {
            let object = inputs[0];
            match graph.kind(object) {
                NodeKind::Constant(Constant::Null) => Some(graph.int(1)),
                k if k.is_allocation() || k.is_virtual_object() => Some(graph.int(0)),
                _ => None,
            }
        }
        NodeKind::ObjectEquals => {
            let (x, y) = (inputs[0], inputs[1]);
            if x == y {
                return Some(graph.int(1));
            }
            let fresh = |k: NodeKind| k.is_allocation() || k.is_virtual_object();
            let null = |k: NodeKind| k == NodeKind::Constant(Constant::Null);
            let (kx, ky) = (graph.kind(x), graph.kind(y));
            if (fresh(kx) && (fresh(ky) || null(ky))) || (null(kx) && fresh(ky)) {
                return Some(graph.int(0));
            }
            None
        }
        NodeKind::Phi { .. } => {
            let mut unique = None;
            for &input in &inputs {
                if input == node || Some(input) == unique {
                    continue;
                }
                if unique.is_some() {
                    return None;
                }
                unique = Some(input);
            }
            unique
        }
        _ => None,
    }
}

fn simplify_binary(
    graph: &mut Graph,
    node: NodeId,
    op: BinaryOp,
    x: NodeId,
    y: NodeId,
) -> Option<NodeId> {
    let kind = graph.value_kind(node);
    if !is_integral(kind) {
        return None;
    }
    let cx = int_value(graph, x);
    let cy = int_value(graph, y);
    if let (Some(a), Some(b)) = (cx, cy) {
        let folded = Constant::from_i64(kind, op.evaluate(a, b, kind))?;
        return Some(graph.constant(folded));
    }
    let zero = |graph: &mut Graph| Constant::from_i64(kind, 0).map(|c| graph.constant(c));
    match (op, cx, cy) {
        (
            BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Or
            | BinaryOp::Xor
            | BinaryOp::Shl
            | BinaryOp::Shr,
            _,
            Some(0),
        )
        | (BinaryOp::Mul, _, Some(1)) => Some(x),
        (BinaryOp::Add | BinaryOp::Or | BinaryOp::Xor, Some(0), _)
        | (BinaryOp::Mul, Some(1), _) => Some(y),
        (BinaryOp::Mul | BinaryOp::And, _, Some(0))
        | (BinaryOp::Mul | BinaryOp::And, Some(0), _) => zero(graph),
        (BinaryOp::And | BinaryOp::Or, _, _) if x == y => Some(x),
        (BinaryOp::Sub | BinaryOp::Xor, _, _) if x == y => zero(graph),
        _ => None,
    }
}

fn int_value(graph: &Graph, node: NodeId) -> Option<i64> {
    graph.constant_value(node).and_then(Constant::as_i64)
}

fn is_integral(kind: ValueKind) -> bool {
    matches!(kind, ValueKind::Int | ValueKind::Long)
}

/// Delete every node not reachable (through inputs) from a node placed in a
/// block. Returns the number of deleted nodes.
pub fn dead_code_elimination(graph: &mut Graph) -> Result<usize, GraphError> {
    let mut live = vec![false; graph.node_capacity()];
    let mut stack: Vec<NodeId> = graph
        .block_ids()
        .flat_map(|b| graph.block_nodes(b).iter().copied())
        .collect();
    while let Some(node) = stack.pop() {
        if live[node.index()] {
            continue;
        }
        live[node.index()] = true;
        stack.extend(
            graph
                .inputs(node)
                .iter()
                .copied()
                .filter(|i| !live[i.index()]),
        );
    }

    let dead: Vec<NodeId> = graph.node_ids().filter(|n| !live[n.index()]).collect();
    // Dead nodes only use each other once their inputs are cleared.
    for &node in &dead {
        graph.set_inputs(node, &[]);
    }
    for &node in &dead {
        graph.kill(node)?;
    }
    if !dead.is_empty() {
        trace!(count = dead.len(), "dead code eliminated");
    }
    Ok(dead.len())
}
