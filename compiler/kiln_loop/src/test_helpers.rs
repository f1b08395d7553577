//! Loop-shaped graph builders for the loop analysis tests.

use std::sync::Arc;

use kiln_ir::{BinaryOp, BlockId, CompareOp, Graph, HostTypes, NodeId, NodeKind, ValueKind};

/// Parameters of a single-block-body loop:
///
/// ```text
/// B0: goto B1
/// B1: i = phi(init, next); if (i <op> limit) ... (B2 continue, B3 exit)
/// B2: next = i <step> stride; goto B1
/// B3: return i
/// ```
#[derive(Clone, Copy, Debug)]
pub(crate) struct Shape {
    pub init: i32,
    /// `None` uses parameter 0.
    pub limit: Option<i32>,
    pub op: CompareOp,
    pub step: BinaryOp,
    pub stride: i32,
    /// The true branch leaves the loop.
    pub exit_on_true: bool,
    /// Compare as `limit <op> i`.
    pub iv_on_right: bool,
}

impl Default for Shape {
    fn default() -> Self {
        Self {
            init: 0,
            limit: Some(10),
            op: CompareOp::Lt,
            step: BinaryOp::Add,
            stride: 1,
            exit_on_true: false,
            iv_on_right: false,
        }
    }
}

pub(crate) struct Built {
    pub graph: Graph,
    pub header: BlockId,
    pub body: BlockId,
    pub iv: NodeId,
    pub limit: NodeId,
}

pub(crate) fn build(shape: Shape) -> Built {
    let mut graph = Graph::new(Arc::new(HostTypes::new()));
    let entry = graph.entry();
    let header = graph.add_loop_header();
    let body = graph.add_block();
    let exit = graph.add_block();

    let init = graph.int(shape.init);
    let limit = match shape.limit {
        Some(v) => graph.int(v),
        None => graph.parameter(0, ValueKind::Int),
    };
    let stride = graph.int(shape.stride);

    graph.append_fixed(entry, NodeKind::Goto { target: header }, &[]);
    let iv = graph.add_phi(header, ValueKind::Int, &[init, init]);
    let next = graph.add_floating(NodeKind::Binary(shape.step), &[iv, stride]);
    graph.set_input(iv, 1, next);

    let operands = if shape.iv_on_right {
        [limit, iv]
    } else {
        [iv, limit]
    };
    let cond = graph.add_floating(NodeKind::Compare(shape.op), &operands);
    let (true_target, false_target) = if shape.exit_on_true {
        (exit, body)
    } else {
        (body, exit)
    };
    graph.append_fixed(
        header,
        NodeKind::If {
            true_target,
            false_target,
        },
        &[cond],
    );
    graph.append_fixed(body, NodeKind::Goto { target: header }, &[]);
    graph.append_fixed(exit, NodeKind::Return, &[iv]);

    Built {
        graph,
        header,
        body,
        iv,
        limit,
    }
}
