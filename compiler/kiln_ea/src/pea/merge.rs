//! Merging predecessor states at control-flow joins.

use smallvec::SmallVec;
use tracing::trace;

use kiln_ir::{BlockId, NodeId, ValueKind};

use super::{PartialEscapeAnalysis, PredState, MATERIALIZED_VALUE};
use crate::effects::Effect;
use crate::state::{EffectsBlockState, ObjectState, PartialEscapeBlockState};

type State = PartialEscapeBlockState;

impl PartialEscapeAnalysis<'_> {
    /// Merge the exit states of `preds` into the entry state of `block`.
    ///
    /// Materializing an object in one predecessor can change how other
    /// objects and phis merge, so the merge is repeated until a pass
    /// materializes nothing. Program phis are only merged when `preds`
    /// covers every predecessor.
    pub(super) fn merge(
        &mut self,
        block: BlockId,
        preds: &[PredState],
        with_phis: bool,
    ) -> (State, Vec<Effect>) {
        let mut states: Vec<State> = preds.iter().map(|p| p.state.clone()).collect();
        if states.is_empty() {
            return (State::new(), Vec::new());
        }
        let mut materializations = Vec::new();
        loop {
            let mut merged = State::new();
            let mut effects = Vec::new();
            let aliases: Vec<&EffectsBlockState> = states.iter().map(|s| &s.base).collect();
            merged.base.meet_aliases(&aliases);

            let candidates: Vec<NodeId> = states[0]
                .objects()
                .map(|(v, _)| v)
                .filter(|&v| states.iter().all(|s| s.object(v).is_some()))
                .collect();
            let mut changed = false;
            for object in candidates {
                if self.merge_object(
                    block,
                    preds,
                    &mut states,
                    object,
                    &mut merged,
                    &mut effects,
                    &mut materializations,
                ) {
                    changed = true;
                    break;
                }
            }
            if !changed && with_phis {
                changed = self.merge_phis(
                    block,
                    preds,
                    &mut states,
                    &mut merged,
                    &mut effects,
                    &mut materializations,
                );
            }
            if !changed {
                materializations.extend(effects);
                return (merged, materializations);
            }
        }
    }

    /// Merge one object present in every predecessor. Returns `true` if it
    /// had to be materialized somewhere, which restarts the merge.
    #[allow(clippy::too_many_arguments, reason = "merge state is threaded explicitly")]
    fn merge_object(
        &mut self,
        block: BlockId,
        preds: &[PredState],
        states: &mut [State],
        object: NodeId,
        merged: &mut State,
        effects: &mut Vec<Effect>,
        materializations: &mut Vec<Effect>,
    ) -> bool {
        let all_virtual = states
            .iter()
            .all(|s| s.object(object).is_some_and(ObjectState::is_virtual));
        if all_virtual {
            if let Some(state) = self.merge_virtual(block, preds, states, object, effects) {
                merged.add_object(object, state);
                return false;
            }
        }

        let mut changed = false;
        for (pred, state) in preds.iter().zip(states.iter_mut()) {
            if state.object(object).is_some_and(ObjectState::is_virtual) {
                let anchor = self.terminator(pred.block);
                self.materialize(state, object, anchor, Some(block), materializations);
                changed = true;
            }
        }
        if changed {
            return true;
        }

        let values: SmallVec<[NodeId; 4]> = states
            .iter()
            .map(|s| s.object(object).and_then(|o| o.materialized).unwrap_or(object))
            .collect();
        let value = if values.iter().all(|&v| v == values[0]) {
            values[0]
        } else {
            self.value_phi(
                block,
                object,
                MATERIALIZED_VALUE,
                ValueKind::Object,
                preds,
                &values,
                effects,
            )
        };
        merged.add_object(
            object,
            ObjectState {
                entries: Vec::new(),
                lock_count: 0,
                materialized: Some(value),
            },
        );
        false
    }

    /// Entry-wise merge of an object virtual in every predecessor, or `None`
    /// if the object has to be materialized instead.
    fn merge_virtual(
        &mut self,
        block: BlockId,
        preds: &[PredState],
        states: &[State],
        object: NodeId,
        effects: &mut Vec<Effect>,
    ) -> Option<ObjectState> {
        let objects: SmallVec<[&ObjectState; 4]> =
            states.iter().filter_map(|s| s.object(object)).collect();
        let first = objects[0];
        if objects.iter().any(|o| o.lock_count != first.lock_count) {
            trace!(%object, "lock counts differ at merge");
            return None;
        }
        let mut entries = Vec::with_capacity(first.entries.len());
        for index in 0..first.entries.len() {
            let values: SmallVec<[NodeId; 4]> = objects.iter().map(|o| o.entries[index]).collect();
            if values.iter().all(|&v| v == values[0]) {
                entries.push(values[0]);
                continue;
            }
            let refers_to_object = values
                .iter()
                .zip(states)
                .any(|(&v, s)| s.object(v).is_some());
            if refers_to_object {
                trace!(%object, index, "entry disagreement involves an object");
                return None;
            }
            let kind = self.graph.value_kind(values[0]);
            entries.push(self.value_phi(block, object, index, kind, preds, &values, effects));
        }
        Some(ObjectState {
            entries,
            lock_count: first.lock_count,
            materialized: None,
        })
    }

    /// Alias phis whose inputs are all the same virtual object; otherwise
    /// materialize virtual inputs in their predecessor and rewire the phi.
    fn merge_phis(
        &mut self,
        block: BlockId,
        preds: &[PredState],
        states: &mut [State],
        merged: &mut State,
        effects: &mut Vec<Effect>,
        materializations: &mut Vec<Effect>,
    ) -> bool {
        let mut changed = false;
        for phi_pos in 0..self.program_phis[block.index()].len() {
            let phi = self.program_phis[block.index()][phi_pos];
            let inputs: SmallVec<[NodeId; 4]> = self.graph.inputs(phi).into();
            let resolved: SmallVec<[Option<NodeId>; 4]> = preds
                .iter()
                .zip(states.iter())
                .map(|(p, s)| inputs.get(p.index).map(|&i| s.resolve(i)))
                .collect();

            if let Some(Some(first)) = resolved.first() {
                let same = resolved.iter().all(|r| *r == Some(*first));
                if same && merged.object(*first).is_some_and(ObjectState::is_virtual) {
                    merged.base.add_scalar_alias(phi, *first);
                    continue;
                }
            }

            for ((pred, state), resolved) in preds.iter().zip(states.iter_mut()).zip(resolved) {
                let Some(resolved) = resolved else { continue };
                let Some(materialized) = state.object(resolved).map(|o| o.materialized) else {
                    continue;
                };
                let value = match materialized {
                    Some(m) => m,
                    None => {
                        let anchor = self.terminator(pred.block);
                        changed = true;
                        self.materialize(state, resolved, anchor, Some(block), materializations)
                    }
                };
                if value != inputs[pred.index] {
                    effects.push(Effect::SetInput {
                        node: phi,
                        index: pred.index,
                        value,
                    });
                }
            }
        }
        changed
    }

    /// The phi merging `values` for `(block, object, entry)`, created on
    /// first use. Inputs of predecessors not in `preds` point at the phi
    /// itself until a later merge fills them in.
    #[allow(clippy::too_many_arguments, reason = "merge state is threaded explicitly")]
    fn value_phi(
        &mut self,
        block: BlockId,
        object: NodeId,
        entry: usize,
        kind: ValueKind,
        preds: &[PredState],
        values: &[NodeId],
        effects: &mut Vec<Effect>,
    ) -> NodeId {
        let graph = &mut *self.graph;
        let phi = *self
            .phi_cache
            .entry((block, object, entry))
            .or_insert_with(|| graph.add_phi(block, kind, &[]));
        let mut inputs = vec![phi; self.cfg.predecessors(block).len()];
        for (pred, &value) in preds.iter().zip(values) {
            inputs[pred.index] = value;
        }
        effects.push(Effect::SetPhiInputs { phi, inputs });
        phi
    }
}
