//! Per-node transfer functions.

use smallvec::SmallVec;
use tracing::trace;

use kiln_ir::{BlockId, NodeId, NodeKind, StorageKind};

use super::PartialEscapeAnalysis;
use crate::effects::Effect;
use crate::state::{ObjectState, PartialEscapeBlockState};
use crate::virtual_object::VirtualShape;

type State = PartialEscapeBlockState;

impl PartialEscapeAnalysis<'_> {
    pub(super) fn process_block(
        &mut self,
        block: BlockId,
        state: &mut State,
        effects: &mut Vec<Effect>,
    ) {
        let schedule = self.schedule;
        let nodes = schedule.nodes(block);

        // Floating nodes materialize before the next node in the block list.
        let mut anchors = vec![None; nodes.len()];
        let mut next = None;
        for (i, &node) in nodes.iter().enumerate().rev() {
            if self.graph.kind(node).is_scheduled_in_block() {
                next = Some(node);
            }
            anchors[i] = next;
        }

        for (&node, anchor) in nodes.iter().zip(anchors) {
            let Some(anchor) = anchor else { continue };
            if !self.process_node(node, state, effects) {
                self.escape_inputs(node, anchor, state, effects);
            }
        }
    }

    /// Returns `false` when the node is not virtualizable here; its object
    /// inputs then escape.
    fn process_node(
        &mut self,
        node: NodeId,
        state: &mut State,
        effects: &mut Vec<Effect>,
    ) -> bool {
        match self.graph.kind(node) {
            NodeKind::NewInstance { ty } => {
                let shape = VirtualShape::instance(self.graph.types(), ty);
                self.virtualize_allocation(node, shape, state, effects);
                true
            }
            NodeKind::NewArray { elem } => self.virtualize_array(node, elem, state, effects),
            NodeKind::LoadField { field } => {
                let entry = self.virtual_entry(state, node, |shape| shape.field_index(field));
                self.load_entry(node, entry, state, effects)
            }
            NodeKind::StoreField { field } => {
                let entry = self.virtual_entry(state, node, |shape| shape.field_index(field));
                self.store_entry(node, entry, 1, state, effects)
            }
            NodeKind::LoadIndexed { .. } => {
                let entry = self.virtual_element(state, node);
                self.load_entry(node, entry, state, effects)
            }
            NodeKind::StoreIndexed { .. } => {
                let entry = self.virtual_element(state, node);
                self.store_entry(node, entry, 2, state, effects)
            }
            NodeKind::ArrayLength => self.array_length(node, state, effects),
            NodeKind::MonitorEnter => self.monitor(node, true, state, effects),
            NodeKind::MonitorExit => self.monitor(node, false, state, effects),
            NodeKind::IsNull => {
                if state.virtual_object(self.graph.input(node, 0)).is_none() {
                    return false;
                }
                let zero = self.graph.int(0);
                self.replace_with_value(node, zero, state, effects);
                true
            }
            NodeKind::ObjectEquals => self.object_equals(node, state, effects),
            NodeKind::Deoptimize { .. } => {
                self.describe_deopt(node, state, effects);
                true
            }
            // Merges handle phis; the rest have no object inputs.
            NodeKind::Start
            | NodeKind::Begin
            | NodeKind::LoopBegin
            | NodeKind::Phi { .. }
            | NodeKind::Constant(_)
            | NodeKind::Parameter { .. }
            | NodeKind::VirtualInstance { .. }
            | NodeKind::VirtualArray { .. }
            | NodeKind::VirtualObjectState { .. } => true,
            NodeKind::Goto { .. }
            | NodeKind::If { .. }
            | NodeKind::Return
            | NodeKind::Invoke { .. }
            | NodeKind::Binary(_)
            | NodeKind::Compare(_)
            | NodeKind::Conditional => false,
        }
    }

    fn virtualize_allocation(
        &mut self,
        node: NodeId,
        shape: VirtualShape,
        state: &mut State,
        effects: &mut Vec<Effect>,
    ) {
        let virtual_node = match self.virtual_of.get(&node) {
            Some(&v) => v,
            None => {
                let kind = match &shape {
                    VirtualShape::Instance { ty, .. } => NodeKind::VirtualInstance { ty: *ty },
                    VirtualShape::Array { elem, length } => NodeKind::VirtualArray {
                        elem: *elem,
                        length: *length,
                    },
                };
                let v = self.graph.add_floating(kind, &[]);
                self.virtual_of.insert(node, v);
                v
            }
        };
        let entries = shape.default_entries(self.graph);
        self.shapes.insert(virtual_node, shape);
        state.add_object(virtual_node, ObjectState::new_virtual(entries));
        state.base.add_scalar_alias(node, virtual_node);
        effects.push(Effect::ReplaceAtUsages {
            node,
            replacement: virtual_node,
        });
        effects.push(Effect::RemoveFixed { node });
        trace!(%node, %virtual_node, "virtualized allocation");
    }

    fn virtualize_array(
        &mut self,
        node: NodeId,
        elem: StorageKind,
        state: &mut State,
        effects: &mut Vec<Effect>,
    ) -> bool {
        let length = self
            .graph
            .constant_value(self.graph.input(node, 0))
            .and_then(|c| c.as_i64())
            .and_then(|len| u32::try_from(len).ok())
            .filter(|&len| len <= self.config.max_virtual_array_length);
        let Some(length) = length else {
            return false;
        };
        self.virtualize_allocation(node, VirtualShape::Array { elem, length }, state, effects);
        true
    }

    /// Virtual object and entry index addressed by a field access.
    fn virtual_entry(
        &self,
        state: &State,
        node: NodeId,
        index: impl FnOnce(&VirtualShape) -> Option<usize>,
    ) -> Option<(NodeId, usize)> {
        let object = state.virtual_object(self.graph.input(node, 0))?;
        let entry = index(self.shape(object)?)?;
        Some((object, entry))
    }

    /// Virtual array and element addressed by an indexed access with a
    /// constant in-range index.
    fn virtual_element(&self, state: &State, node: NodeId) -> Option<(NodeId, usize)> {
        let index = self
            .graph
            .constant_value(self.graph.input(node, 1))
            .and_then(|c| c.as_i64())?;
        self.virtual_entry(state, node, |shape| shape.element_index(index))
    }

    fn load_entry(
        &mut self,
        node: NodeId,
        entry: Option<(NodeId, usize)>,
        state: &mut State,
        effects: &mut Vec<Effect>,
    ) -> bool {
        let Some((object, index)) = entry else {
            return false;
        };
        let Some(value) = state.object(object).map(|o| o.entries[index]) else {
            return false;
        };
        self.replace_with_value(node, value, state, effects);
        true
    }

    fn store_entry(
        &mut self,
        node: NodeId,
        entry: Option<(NodeId, usize)>,
        value_input: usize,
        state: &mut State,
        effects: &mut Vec<Effect>,
    ) -> bool {
        let Some((object, index)) = entry else {
            return false;
        };
        let value = entry_value(state, self.graph.input(node, value_input));
        let Some(target) = state.object_mut(object) else {
            return false;
        };
        target.entries[index] = value;
        effects.push(Effect::RemoveFixed { node });
        trace!(%node, %object, index, %value, "virtual store");
        true
    }

    fn array_length(
        &mut self,
        node: NodeId,
        state: &mut State,
        effects: &mut Vec<Effect>,
    ) -> bool {
        let Some(object) = state.virtual_object(self.graph.input(node, 0)) else {
            return false;
        };
        let Some(&VirtualShape::Array { length, .. }) = self.shape(object) else {
            return false;
        };
        let length = self.graph.int(i32::try_from(length).unwrap_or(i32::MAX));
        self.replace_with_value(node, length, state, effects);
        true
    }

    fn monitor(
        &mut self,
        node: NodeId,
        enter: bool,
        state: &mut State,
        effects: &mut Vec<Effect>,
    ) -> bool {
        let Some(object) = state.virtual_object(self.graph.input(node, 0)) else {
            return false;
        };
        let Some(target) = state.object_mut(object) else {
            return false;
        };
        if enter {
            target.lock_count += 1;
        } else if target.lock_count > 0 {
            target.lock_count -= 1;
        } else {
            return false;
        }
        effects.push(Effect::RemoveFixed { node });
        true
    }

    /// A virtual object is a fresh allocation: equal only to itself and
    /// unequal to every value that existed before it.
    fn object_equals(
        &mut self,
        node: NodeId,
        state: &mut State,
        effects: &mut Vec<Effect>,
    ) -> bool {
        let x = state.virtual_object(self.graph.input(node, 0));
        let y = state.virtual_object(self.graph.input(node, 1));
        let equal = match (x, y) {
            (Some(a), Some(b)) => a == b,
            (Some(_), None) | (None, Some(_)) => false,
            (None, None) => return false,
        };
        let result = self.graph.int(i32::from(equal));
        self.replace_with_value(node, result, state, effects);
        true
    }

    /// Describe every virtual input of a deoptimization, and every virtual
    /// object reachable from one, with a `VirtualObjectState`.
    fn describe_deopt(&mut self, node: NodeId, state: &State, effects: &mut Vec<Effect>) {
        let inputs: SmallVec<[NodeId; 8]> = self.graph.inputs(node).into();
        let mut described = Vec::new();
        for (index, &input) in inputs.iter().enumerate() {
            let resolved = state.resolve(input);
            let Some(object) = state.object(resolved) else {
                continue;
            };
            let value = match object.materialized {
                Some(m) => m,
                None => {
                    collect_virtual_closure(state, resolved, &mut described);
                    resolved
                }
            };
            if value != input {
                effects.push(Effect::SetInput { node, index, value });
            }
        }
        for virtual_node in described {
            let Some(object) = state.object(virtual_node) else {
                continue;
            };
            let mut vos_inputs: SmallVec<[NodeId; 8]> =
                SmallVec::with_capacity(object.entries.len() + 1);
            vos_inputs.push(virtual_node);
            vos_inputs.extend(object.entries.iter().map(|&e| entry_value(state, e)));
            let vos = self.graph.add_floating(
                NodeKind::VirtualObjectState {
                    lock_count: object.lock_count,
                },
                &vos_inputs,
            );
            effects.push(Effect::AppendInput { node, value: vos });
        }
    }

    fn replace_with_value(
        &mut self,
        node: NodeId,
        value: NodeId,
        state: &mut State,
        effects: &mut Vec<Effect>,
    ) {
        state.base.add_scalar_alias(node, value);
        effects.push(Effect::ReplaceAtUsages {
            node,
            replacement: value,
        });
        if self.graph.kind(node).is_scheduled_in_block() {
            effects.push(Effect::RemoveFixed { node });
        }
        trace!(%node, %value, "replaced by virtual entry");
    }

    /// Materialize every virtual object input of `node` before `anchor` and
    /// point the inputs at the materialized values.
    fn escape_inputs(
        &mut self,
        node: NodeId,
        anchor: NodeId,
        state: &mut State,
        effects: &mut Vec<Effect>,
    ) {
        let inputs: SmallVec<[NodeId; 8]> = self.graph.inputs(node).into();
        for (index, &input) in inputs.iter().enumerate() {
            let resolved = state.resolve(input);
            let Some(materialized) = state.object(resolved).map(|o| o.materialized) else {
                continue;
            };
            let value = match materialized {
                Some(m) => m,
                None => {
                    trace!(%node, object = %resolved, "escapes");
                    self.materialize(state, resolved, anchor, None, effects)
                }
            };
            if value != input {
                effects.push(Effect::SetInput { node, index, value });
            }
        }
    }
}

/// The value to record in an entry for `input`: the materialized value of a
/// materialized object, otherwise the resolved alias.
pub(super) fn entry_value(state: &State, input: NodeId) -> NodeId {
    let resolved = state.resolve(input);
    state
        .object(resolved)
        .and_then(|o| o.materialized)
        .unwrap_or(resolved)
}

/// Append `root` and every virtual object reachable through its entries to
/// `out`, skipping objects already listed.
pub(super) fn collect_virtual_closure(state: &State, root: NodeId, out: &mut Vec<NodeId>) {
    if out.contains(&root) {
        return;
    }
    let first = out.len();
    out.push(root);
    let mut i = first;
    while i < out.len() {
        let current = out[i];
        i += 1;
        let Some(object) = state.object(current) else {
            continue;
        };
        for &entry in &object.entries {
            if state.object(entry).is_some_and(ObjectState::is_virtual) && !out.contains(&entry) {
                out.push(entry);
            }
        }
    }
}
