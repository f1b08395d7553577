//! Deferred graph mutations.
//!
//! The analysis never edits the graph's existing structure while it runs.
//! Each block records what it would change as a list of [`Effect`]s; a
//! loop body that has to be re-analyzed simply drops its lists. Once every
//! loop has converged the retained effects are applied in block order.

use kiln_ir::{Graph, GraphError, NodeId};
use tracing::trace;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Place an unplaced fixed node immediately before `anchor`.
    AddBefore { anchor: NodeId, node: NodeId },
    ReplaceAtUsages { node: NodeId, replacement: NodeId },
    SetInput {
        node: NodeId,
        index: usize,
        value: NodeId,
    },
    SetPhiInputs { phi: NodeId, inputs: Vec<NodeId> },
    AppendInput { node: NodeId, value: NodeId },
    /// Unlink and delete a fixed node. Deletions run after every rewiring.
    RemoveFixed { node: NodeId },
}

/// Counts gathered while applying effects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Applied {
    pub removed_allocations: usize,
    pub placed_allocations: usize,
}

/// Apply `lists` in order: every rewiring effect first, then the deletions in
/// reverse recording order so users disappear before what they use.
pub(crate) fn apply<'a>(
    graph: &mut Graph,
    lists: impl IntoIterator<Item = &'a [Effect]>,
) -> Result<Applied, GraphError> {
    let mut applied = Applied::default();
    let mut deletions = Vec::new();
    for effect in lists.into_iter().flatten() {
        trace!(?effect, "apply");
        match *effect {
            Effect::AddBefore { anchor, node } => {
                if graph.kind(node).is_allocation() {
                    applied.placed_allocations += 1;
                }
                graph.place_before(anchor, node);
            }
            Effect::ReplaceAtUsages { node, replacement } => {
                graph.replace_at_usages(node, replacement);
            }
            Effect::SetInput { node, index, value } => graph.set_input(node, index, value),
            Effect::SetPhiInputs { phi, ref inputs } => graph.set_inputs(phi, inputs),
            Effect::AppendInput { node, value } => graph.append_input(node, value),
            Effect::RemoveFixed { node } => deletions.push(node),
        }
    }
    for node in deletions.into_iter().rev() {
        if graph.kind(node).is_allocation() {
            applied.removed_allocations += 1;
        }
        graph.remove_fixed(node)?;
    }
    Ok(applied)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "tests use unwrap to panic on unexpected state")]
mod tests;
