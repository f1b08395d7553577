//! Counted-loop recognition.
//!
//! A loop is counted when its only exit leaves from an `If` comparing a
//! basic induction variable against a loop-invariant limit, and the
//! condition under which the loop continues moves monotonically towards the
//! limit. Anything else is simply not counted.
//!
//! The induction variable must also stay inside the range of its kind: a
//! loop whose last step could wrap around (`i <= i32::MAX`, or `i < n` with
//! a stride above one and an unknown `n`) is not monotonic and is rejected.

use kiln_ir::{BlockId, CompareOp, Graph, Loop, NodeId, NodeKind, ValueKind};
use tracing::trace;

use crate::induction::{InductionVariable, Invariance};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Facts about a counted loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CountedLoopInfo {
    pub iv: InductionVariable,
    pub limit: NodeId,
    /// `iv <condition> limit` holds while the loop continues.
    pub condition: CompareOp,
    pub direction: Direction,
    /// Block holding the exit test.
    pub exit_test: BlockId,
    /// Body iterations, when `init` and `limit` are constants and the test
    /// sits in the header.
    pub constant_trip_count: Option<u64>,
}

pub(crate) fn recognize(
    graph: &Graph,
    lp: &Loop,
    ivs: &[InductionVariable],
) -> Option<CountedLoopInfo> {
    let &[(from, to)] = lp.exits.as_slice() else {
        return None;
    };
    let test = graph.terminator(from)?;
    let NodeKind::If { true_target, .. } = graph.kind(test) else {
        return None;
    };
    let condition = graph.input(test, 0);
    let NodeKind::Compare(op) = graph.kind(condition) else {
        return None;
    };
    let op = if true_target == to { op.negate() } else { op };
    let (x, y) = (graph.input(condition, 0), graph.input(condition, 1));

    let mut invariance = Invariance::new(lp);
    let iv_for = |n: NodeId| ivs.iter().find(|iv| iv.phi == n);
    let (iv, limit, op) = if let Some(iv) = iv_for(x).filter(|_| invariance.check(graph, y)) {
        (iv, y, op)
    } else if let Some(iv) = iv_for(y).filter(|_| invariance.check(graph, x)) {
        (iv, x, op.mirror())
    } else {
        return None;
    };

    let direction = match op {
        CompareOp::Lt | CompareOp::Le if iv.stride > 0 => Direction::Up,
        CompareOp::Gt | CompareOp::Ge if iv.stride < 0 => Direction::Down,
        CompareOp::Ne if iv.stride == 1 => Direction::Up,
        CompareOp::Ne if iv.stride == -1 => Direction::Down,
        _ => return None,
    };

    let value = |n: NodeId| graph.constant_value(n).and_then(|c| c.as_i64());
    let (init_value, limit_value) = (value(iv.init), value(limit));
    if may_wrap(iv.kind, init_value, limit_value, iv.stride, op) {
        trace!(phi = %iv.phi, ?op, stride = iv.stride, "induction variable may wrap");
        return None;
    }

    let constant_trip_count = match (init_value, limit_value) {
        (Some(init), Some(end)) if from == lp.header => trip_count(init, end, iv.stride, op),
        _ => None,
    };

    Some(CountedLoopInfo {
        iv: iv.clone(),
        limit,
        condition: op,
        direction,
        exit_test: from,
        constant_trip_count,
    })
}

/// Whether the step after the last value satisfying `i op limit` can leave
/// the range of `kind`. An unknown limit is taken at the worst end of the
/// range.
fn may_wrap(
    kind: ValueKind,
    init: Option<i64>,
    limit: Option<i64>,
    stride: i64,
    op: CompareOp,
) -> bool {
    let (min, max) = if matches!(kind, ValueKind::Long) {
        (i128::from(i64::MIN), i128::from(i64::MAX))
    } else {
        (i128::from(i32::MIN), i128::from(i32::MAX))
    };
    let stride = i128::from(stride);
    let limit = limit.map(i128::from);
    match op {
        CompareOp::Lt => limit.unwrap_or(max) - 1 + stride > max,
        CompareOp::Le => limit.unwrap_or(max) + stride > max,
        CompareOp::Gt => limit.unwrap_or(min) + 1 + stride < min,
        CompareOp::Ge => limit.unwrap_or(min) + stride < min,
        // Unit stride hits the limit exactly, unless it starts past it.
        CompareOp::Ne => match (init, limit) {
            (Some(init), Some(limit)) => (limit - i128::from(init)) * stride.signum() < 0,
            _ => true,
        },
        CompareOp::Eq => true,
    }
}

/// Number of times `i op end` holds for `i = init, init + stride, ...`.
fn trip_count(init: i64, end: i64, stride: i64, op: CompareOp) -> Option<u64> {
    let (init, end, stride) = (i128::from(init), i128::from(end), i128::from(stride));
    let count = match op {
        CompareOp::Lt => (end - init + stride - 1).div_euclid(stride),
        CompareOp::Le => (end - init).div_euclid(stride) + 1,
        CompareOp::Gt => (init - end - stride - 1).div_euclid(-stride),
        CompareOp::Ge => (init - end).div_euclid(-stride) + 1,
        CompareOp::Ne => {
            let distance = (end - init) * stride.signum();
            if distance < 0 {
                return None;
            }
            distance
        }
        CompareOp::Eq => return None,
    };
    u64::try_from(count.max(0)).ok()
}
