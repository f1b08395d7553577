//! Shared graph builders for the IR unit tests.

use std::sync::Arc;

use crate::graph::Graph;
use crate::meta::{HostTypes, StorageKind, TypeId, ValueKind};
use crate::node::{BlockId, CompareOp, NodeId, NodeKind};

/// Host types with a single `Point { x: int, y: int }`.
pub(crate) fn point_types() -> (Arc<HostTypes>, TypeId) {
    let mut types = HostTypes::new();
    let point = types.define_type(
        "Point",
        None,
        &[("x", StorageKind::Int), ("y", StorageKind::Int)],
    );
    (Arc::new(types), point)
}

pub(crate) fn empty_graph() -> Graph {
    Graph::new(Arc::new(HostTypes::new()))
}

pub(crate) fn goto(graph: &mut Graph, from: BlockId, target: BlockId) -> NodeId {
    graph.append_fixed(from, NodeKind::Goto { target }, &[])
}

pub(crate) fn branch(
    graph: &mut Graph,
    from: BlockId,
    condition: NodeId,
    true_target: BlockId,
    false_target: BlockId,
) -> NodeId {
    graph.append_fixed(
        from,
        NodeKind::If {
            true_target,
            false_target,
        },
        &[condition],
    )
}

/// `B0 -> if p0 { B1 } else { B2 } -> B3 (phi) -> return phi`.
pub(crate) struct Diamond {
    pub graph: Graph,
    pub blocks: [BlockId; 4],
    pub phi: NodeId,
}

pub(crate) fn diamond() -> Diamond {
    let mut graph = empty_graph();
    let entry = graph.entry();
    let then_block = graph.add_block();
    let else_block = graph.add_block();
    let merge = graph.add_block();
    let p = graph.parameter(0, ValueKind::Int);
    let zero = graph.int(0);
    let cond = graph.add_floating(NodeKind::Compare(CompareOp::Gt), &[p, zero]);
    branch(&mut graph, entry, cond, then_block, else_block);
    goto(&mut graph, then_block, merge);
    goto(&mut graph, else_block, merge);
    let one = graph.int(1);
    let two = graph.int(2);
    let phi = graph.add_phi(merge, ValueKind::Int, &[one, two]);
    graph.append_fixed(merge, NodeKind::Return, &[phi]);
    Diamond {
        graph,
        blocks: [entry, then_block, else_block, merge],
        phi,
    }
}

/// `B0 -> B1 (header) <-> B2 (body); B1 -> B3 (exit)` counting `i` from 0
/// to `p0` by 1.
pub(crate) struct SimpleLoop {
    pub graph: Graph,
    pub blocks: [BlockId; 4],
    pub iv: NodeId,
}

pub(crate) fn simple_loop() -> SimpleLoop {
    let mut graph = empty_graph();
    let entry = graph.entry();
    let header = graph.add_loop_header();
    let body = graph.add_block();
    let exit = graph.add_block();
    let limit = graph.parameter(0, ValueKind::Int);
    let zero = graph.int(0);
    let one = graph.int(1);
    goto(&mut graph, entry, header);
    let iv = graph.add_phi(header, ValueKind::Int, &[zero, zero]);
    let next = graph.add_floating(NodeKind::Binary(crate::node::BinaryOp::Add), &[iv, one]);
    graph.set_input(iv, 1, next);
    let cond = graph.add_floating(NodeKind::Compare(CompareOp::Lt), &[iv, limit]);
    branch(&mut graph, header, cond, body, exit);
    goto(&mut graph, body, header);
    graph.append_fixed(exit, NodeKind::Return, &[iv]);
    SimpleLoop {
        graph,
        blocks: [entry, header, body, exit],
        iv,
    }
}
