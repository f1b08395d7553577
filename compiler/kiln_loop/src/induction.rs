//! Basic induction variables and loop invariance.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use kiln_ir::{BinaryOp, ControlFlowGraph, Graph, Loop, NodeClass, NodeId, NodeKind, ValueKind};

/// A header phi `i = φ(init, i ± stride)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InductionVariable {
    pub phi: NodeId,
    /// Value on loop entry (identical on every forward predecessor).
    pub init: NodeId,
    /// Signed step applied on every back edge; never zero.
    pub stride: i64,
    pub kind: ValueKind,
}

impl InductionVariable {
    #[inline]
    pub fn is_increasing(&self) -> bool {
        self.stride > 0
    }
}

/// Find the basic induction variables of `lp`, in phi order.
pub(crate) fn find_induction_variables(
    graph: &Graph,
    cfg: &ControlFlowGraph,
    lp: &Loop,
) -> Vec<InductionVariable> {
    let preds = cfg.predecessors(lp.header);
    let (back, forward): (SmallVec<[usize; 2]>, SmallVec<[usize; 2]>) =
        (0..preds.len()).partition(|&i| lp.back_edges.contains(&preds[i]));
    if back.is_empty() || forward.is_empty() {
        return Vec::new();
    }

    let mut invariance = Invariance::new(lp);
    let mut ivs = Vec::new();
    for &phi in graph.phis(lp.header) {
        let kind = graph.value_kind(phi);
        if !matches!(kind, ValueKind::Int | ValueKind::Long) {
            continue;
        }
        let inputs = graph.inputs(phi);
        if inputs.len() != preds.len() {
            continue;
        }
        let init = inputs[forward[0]];
        if forward.iter().any(|&i| inputs[i] != init) || !invariance.check(graph, init) {
            continue;
        }
        let mut stride = None;
        let consistent = back.iter().all(|&i| {
            let step = step_of(graph, phi, inputs[i]);
            match (step, stride) {
                (Some(s), None) => {
                    stride = Some(s);
                    true
                }
                (Some(s), Some(prev)) => s == prev,
                (None, _) => false,
            }
        });
        match stride {
            Some(stride) if consistent && stride != 0 => ivs.push(InductionVariable {
                phi,
                init,
                stride,
                kind,
            }),
            _ => {}
        }
    }
    ivs
}

/// Stride of `value` if it is `phi + c`, `c + phi` or `phi - c`.
fn step_of(graph: &Graph, phi: NodeId, value: NodeId) -> Option<i64> {
    let NodeKind::Binary(op) = graph.kind(value) else {
        return None;
    };
    let inputs = graph.inputs(value);
    let constant = |n: NodeId| graph.constant_value(n).and_then(|c| c.as_i64());
    match op {
        BinaryOp::Add if inputs[0] == phi => constant(inputs[1]),
        BinaryOp::Add if inputs[1] == phi => constant(inputs[0]),
        BinaryOp::Sub if inputs[0] == phi => constant(inputs[1]).and_then(i64::checked_neg),
        _ => None,
    }
}

/// Memoized "defined outside the loop" test.
pub(crate) struct Invariance<'a> {
    lp: &'a Loop,
    memo: FxHashMap<NodeId, bool>,
}

impl<'a> Invariance<'a> {
    pub(crate) fn new(lp: &'a Loop) -> Self {
        Self {
            lp,
            memo: FxHashMap::default(),
        }
    }

    pub(crate) fn check(&mut self, graph: &Graph, node: NodeId) -> bool {
        let mut stack: Vec<(NodeId, bool)> = vec![(node, false)];
        while let Some((n, inputs_done)) = stack.pop() {
            if self.memo.contains_key(&n) {
                continue;
            }
            let kind = graph.kind(n);
            let direct = match kind {
                NodeKind::Constant(_) | NodeKind::Parameter { .. } => Some(true),
                NodeKind::Phi { block, .. } => Some(!self.lp.contains(block)),
                _ => match kind.class() {
                    NodeClass::Fixed | NodeClass::Control => Some(
                        graph
                            .block_of(n)
                            .is_some_and(|b| !self.lp.contains(b)),
                    ),
                    NodeClass::Virtual => Some(false),
                    NodeClass::Floating => None,
                },
            };
            if let Some(invariant) = direct {
                self.memo.insert(n, invariant);
                continue;
            }
            if inputs_done {
                let invariant = graph
                    .inputs(n)
                    .iter()
                    .all(|i| self.memo.get(i).copied().unwrap_or(false));
                self.memo.insert(n, invariant);
                continue;
            }
            stack.push((n, true));
            for &input in graph.inputs(n) {
                if !self.memo.contains_key(&input) {
                    stack.push((input, false));
                }
            }
        }
        self.memo.get(&node).copied().unwrap_or(false)
    }
}
