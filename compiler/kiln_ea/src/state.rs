//! Per-block abstract state of the escape analysis.
//!
//! [`EffectsBlockState`] carries the scalar alias map shared by every
//! effects-based analysis. [`PartialEscapeBlockState`] adds the
//! [`ObjectState`] of every allocation tracked at the current point.
//! Both use ordered maps so iteration, comparison and merging are
//! deterministic.

use std::collections::BTreeMap;

use kiln_ir::NodeId;

/// Scalar alias map: `alias -> value`. A node without an entry is its own
/// alias; no explicit `x -> x` entry is ever stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EffectsBlockState {
    scalar_aliases: BTreeMap<NodeId, NodeId>,
}

impl EffectsBlockState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_scalar_alias(&mut self, alias: NodeId, value: NodeId) {
        if alias == value {
            self.scalar_aliases.remove(&alias);
        } else {
            self.scalar_aliases.insert(alias, value);
        }
    }

    #[inline]
    pub fn scalar_alias(&self, alias: NodeId) -> NodeId {
        self.scalar_aliases.get(&alias).copied().unwrap_or(alias)
    }

    pub fn aliases(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.scalar_aliases.iter().map(|(&k, &v)| (k, v))
    }

    /// Drop every alias whose value does not satisfy `keep`.
    pub fn retain_aliases(&mut self, mut keep: impl FnMut(NodeId) -> bool) {
        self.scalar_aliases.retain(|_, v| keep(*v));
    }

    /// Replace this state's aliases with the meet of `states`: seed from the
    /// first, then keep only the keys every other state maps to the same value.
    pub fn meet_aliases(&mut self, states: &[&EffectsBlockState]) {
        let Some((first, rest)) = states.split_first() else {
            self.scalar_aliases.clear();
            return;
        };
        self.scalar_aliases.clone_from(&first.scalar_aliases);
        for other in rest {
            self.scalar_aliases
                .retain(|k, v| other.scalar_aliases.get(k) == Some(v));
        }
    }

    pub fn equivalent_to(&self, other: &EffectsBlockState) -> bool {
        self.scalar_aliases == other.scalar_aliases
    }
}

/// Abstract state of one tracked allocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectState {
    /// Current value of every field or element, as resolved nodes. An entry
    /// may name another virtual object node.
    pub entries: Vec<NodeId>,
    pub lock_count: u32,
    /// Set once the object has been materialized on this path.
    pub materialized: Option<NodeId>,
}

impl ObjectState {
    pub fn new_virtual(entries: Vec<NodeId>) -> Self {
        Self {
            entries,
            lock_count: 0,
            materialized: None,
        }
    }

    #[inline]
    pub fn is_virtual(&self) -> bool {
        self.materialized.is_none()
    }
}

/// Escape-analysis state at one program point.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartialEscapeBlockState {
    pub base: EffectsBlockState,
    /// Keyed by virtual object node.
    objects: BTreeMap<NodeId, ObjectState>,
}

impl PartialEscapeBlockState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow the scalar alias of `node`.
    #[inline]
    pub fn resolve(&self, node: NodeId) -> NodeId {
        self.base.scalar_alias(node)
    }

    #[inline]
    pub fn object(&self, virtual_node: NodeId) -> Option<&ObjectState> {
        self.objects.get(&virtual_node)
    }

    #[inline]
    pub fn object_mut(&mut self, virtual_node: NodeId) -> Option<&mut ObjectState> {
        self.objects.get_mut(&virtual_node)
    }

    pub fn add_object(&mut self, virtual_node: NodeId, object: ObjectState) {
        self.objects.insert(virtual_node, object);
    }

    /// The virtual object `node` resolves to, if it is still virtual here.
    pub fn virtual_object(&self, node: NodeId) -> Option<NodeId> {
        let resolved = self.resolve(node);
        self.objects
            .get(&resolved)
            .filter(|o| o.is_virtual())
            .map(|_| resolved)
    }

    /// Drop every alias except those naming a tracked object.
    pub fn clear_scalar_aliases(&mut self) {
        let objects = &self.objects;
        self.base.retain_aliases(|value| objects.contains_key(&value));
    }

    pub fn objects(&self) -> impl Iterator<Item = (NodeId, &ObjectState)> + '_ {
        self.objects.iter().map(|(&k, v)| (k, v))
    }

    pub fn equivalent_to(&self, other: &PartialEscapeBlockState) -> bool {
        self.base.equivalent_to(&other.base) && self.objects == other.objects
    }
}
