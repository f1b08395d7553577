//! Turning virtual objects back into real allocations.

use tracing::trace;

use kiln_ir::{BlockId, NodeId, NodeKind};

use super::virtualize::collect_virtual_closure;
use super::PartialEscapeAnalysis;
use crate::effects::Effect;
use crate::state::{ObjectState, PartialEscapeBlockState};

impl PartialEscapeAnalysis<'_> {
    /// Materialize `object` and every virtual object it references before
    /// `anchor`, returning the allocation standing for `object`.
    ///
    /// All allocations are emitted before any store so objects referencing
    /// each other (cycles included) see their final values. `site` is the
    /// merge block when materializing at a predecessor's end.
    pub(super) fn materialize(
        &mut self,
        state: &mut PartialEscapeBlockState,
        object: NodeId,
        anchor: NodeId,
        site: Option<BlockId>,
        effects: &mut Vec<Effect>,
    ) -> NodeId {
        if let Some(value) = state.object(object).and_then(|o| o.materialized) {
            return value;
        }
        let mut closure = Vec::new();
        collect_virtual_closure(state, object, &mut closure);

        let mut pending = Vec::with_capacity(closure.len());
        for &virtual_node in &closure {
            let (Some(shape), Some(old)) = (
                self.shapes.get(&virtual_node).cloned(),
                state.object(virtual_node).cloned(),
            ) else {
                continue;
            };
            let key = (anchor, virtual_node, site);
            let allocation = match self.allocation_cache.get(&key) {
                Some(&a) => a,
                None => {
                    let a = shape.build_allocation(self.graph);
                    self.allocation_cache.insert(key, a);
                    a
                }
            };
            effects.push(Effect::AddBefore {
                anchor,
                node: allocation,
            });
            state.add_object(
                virtual_node,
                ObjectState {
                    entries: Vec::new(),
                    lock_count: 0,
                    materialized: Some(allocation),
                },
            );
            pending.push((shape, old, allocation));
        }

        for (shape, old, allocation) in pending {
            for (index, &entry) in old.entries.iter().enumerate() {
                let value = state
                    .object(entry)
                    .and_then(|o| o.materialized)
                    .unwrap_or(entry);
                if shape.is_default(self.graph, index, value) {
                    continue;
                }
                let store = shape.build_store(self.graph, allocation, index, value);
                effects.push(Effect::AddBefore { anchor, node: store });
            }
            for _ in 0..old.lock_count {
                let enter = self.graph.add_unplaced(NodeKind::MonitorEnter, &[allocation]);
                effects.push(Effect::AddBefore { anchor, node: enter });
            }
            trace!(%allocation, %anchor, locks = old.lock_count, "materialized");
        }

        state
            .object(object)
            .and_then(|o| o.materialized)
            .unwrap_or(object)
    }
}
