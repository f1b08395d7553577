//! The compilation graph: an arena of nodes plus the block structure.
//!
//! Nodes are addressed by [`NodeId`] and never own their inputs; the graph
//! owns every node. Each input edge `user -> input` is mirrored by one entry
//! of `user` in `input`'s usage list. Every mutation in this module keeps the
//! two sides in sync, and [`Graph::verify`] checks it.
//!
//! Blocks are ordered lists of fixed and control nodes: a begin node first,
//! a terminator last. Floating nodes have no position; phis are attached to
//! their block. The CFG itself is derived on demand by
//! [`ControlFlowGraph::compute`](crate::ControlFlowGraph::compute).

use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use thiserror::Error;

use crate::meta::{HostTypes, ValueKind};
use crate::node::{BlockId, Constant, Node, NodeClass, NodeId, NodeKind};

/// Structural errors reported by graph mutation and verification.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("{node} still has {count} usages")]
    UsagesRemain { node: NodeId, count: usize },
    #[error("{node} references killed input {input}")]
    DeadInput { node: NodeId, input: NodeId },
    #[error("input edge {node} -> {input} has no matching usage entry")]
    MissingUsage { node: NodeId, input: NodeId },
    #[error("{node} lists {usage} as a usage but {usage} does not use it")]
    DanglingUsage { node: NodeId, usage: NodeId },
    #[error("{node} is not a fixed node")]
    NotFixed { node: NodeId },
    #[error("{node} is not placed in block {block}")]
    Misplaced { node: NodeId, block: BlockId },
    #[error("block {block} has no terminator")]
    MissingTerminator { block: BlockId },
}

#[derive(Clone, Debug, Default)]
struct BlockData {
    /// Begin node, fixed nodes, terminator.
    nodes: Vec<NodeId>,
    phis: Vec<NodeId>,
}

/// A graph of typed nodes for one compilation unit.
#[derive(Clone, Debug)]
pub struct Graph {
    types: Arc<HostTypes>,
    nodes: Vec<Option<Node>>,
    blocks: Vec<BlockData>,
    constants: FxHashMap<Constant, NodeId>,
}

impl Graph {
    /// Create a graph containing only the entry block.
    pub fn new(types: Arc<HostTypes>) -> Self {
        let mut graph = Self {
            types,
            nodes: Vec::new(),
            blocks: Vec::new(),
            constants: FxHashMap::default(),
        };
        graph.add_block_with(NodeKind::Start);
        graph
    }

    /// Host metadata the graph was built against.
    #[inline]
    pub fn types(&self) -> &HostTypes {
        &self.types
    }

    // ── Blocks ──────────────────────────────────────────────────

    /// The block starting with the `Start` node.
    #[inline]
    pub fn entry(&self) -> BlockId {
        BlockId::new(0)
    }

    /// A new block holding only its `Begin` node.
    pub fn add_block(&mut self) -> BlockId {
        self.add_block_with(NodeKind::Begin)
    }

    /// A new block headed by a `LoopBegin`; its back edges make it a loop.
    pub fn add_loop_header(&mut self) -> BlockId {
        self.add_block_with(NodeKind::LoopBegin)
    }

    fn add_block_with(&mut self, begin: NodeKind) -> BlockId {
        let id = BlockId::new(
            u32::try_from(self.blocks.len())
                .unwrap_or_else(|_| panic!("block count exceeds u32::MAX")),
        );
        self.blocks.push(BlockData::default());
        let node = self.push_node(begin, &[], ValueKind::Void);
        self.node_mut(node).block = Some(id);
        self.blocks[id.index()].nodes.push(node);
        id
    }

    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// All block ids in creation order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(|i| {
            #[expect(clippy::cast_possible_truncation, reason = "block count checked on creation")]
            let raw = i as u32;
            BlockId::new(raw)
        })
    }

    /// Begin node, fixed nodes and terminator of `block`, in order.
    #[inline]
    pub fn block_nodes(&self, block: BlockId) -> &[NodeId] {
        &self.blocks[block.index()].nodes
    }

    #[inline]
    pub fn begin(&self, block: BlockId) -> NodeId {
        self.blocks[block.index()].nodes[0]
    }

    /// Last node of `block`, if it ends with a terminator yet.
    pub fn terminator(&self, block: BlockId) -> Option<NodeId> {
        let last = *self.blocks[block.index()].nodes.last()?;
        self.kind(last).is_terminator().then_some(last)
    }

    /// Phis registered with `block`, in creation order.
    #[inline]
    pub fn phis(&self, block: BlockId) -> &[NodeId] {
        &self.blocks[block.index()].phis
    }

    // ── Node creation ───────────────────────────────────────────

    fn push_node(&mut self, kind: NodeKind, inputs: &[NodeId], value_kind: ValueKind) -> NodeId {
        let id = NodeId::new(
            u32::try_from(self.nodes.len())
                .unwrap_or_else(|_| panic!("node count exceeds u32::MAX")),
        );
        for &input in inputs {
            self.node_mut(input).usages.push(id);
        }
        self.nodes.push(Some(Node {
            kind,
            inputs: inputs.into(),
            usages: SmallVec::new(),
            value_kind,
            block: None,
        }));
        id
    }

    fn infer_value_kind(&self, kind: NodeKind, inputs: &[NodeId]) -> ValueKind {
        match kind {
            NodeKind::Constant(c) => c.value_kind(),
            NodeKind::Parameter { kind, .. } | NodeKind::Phi { kind, .. } => kind,
            NodeKind::Binary(_) => inputs.first().map_or(ValueKind::Int, |&x| self.value_kind(x)),
            NodeKind::Conditional => inputs.get(1).map_or(ValueKind::Int, |&x| self.value_kind(x)),
            NodeKind::Compare(_)
            | NodeKind::IsNull
            | NodeKind::ObjectEquals
            | NodeKind::ArrayLength => ValueKind::Int,
            NodeKind::NewInstance { .. }
            | NodeKind::NewArray { .. }
            | NodeKind::VirtualInstance { .. }
            | NodeKind::VirtualArray { .. } => ValueKind::Object,
            NodeKind::LoadField { field } => self.types.field(field).kind.stack_kind(),
            NodeKind::LoadIndexed { elem } => elem.stack_kind(),
            NodeKind::Invoke { target } => self.types.method(target).return_kind,
            _ => ValueKind::Void,
        }
    }

    /// Add a floating or virtual node. Constants are uniqued.
    pub fn add_floating(&mut self, kind: NodeKind, inputs: &[NodeId]) -> NodeId {
        debug_assert!(
            !kind.is_scheduled_in_block() && !matches!(kind, NodeKind::Phi { .. }),
            "{} must be added with append/add_phi",
            kind.name()
        );
        if let NodeKind::Constant(c) = kind {
            return self.constant(c);
        }
        let value_kind = self.infer_value_kind(kind, inputs);
        self.push_node(kind, inputs, value_kind)
    }

    /// The unique node for constant `c`.
    pub fn constant(&mut self, c: Constant) -> NodeId {
        if let Some(&id) = self.constants.get(&c) {
            if self.is_alive(id) {
                return id;
            }
        }
        let id = self.push_node(NodeKind::Constant(c), &[], c.value_kind());
        self.constants.insert(c, id);
        id
    }

    /// Uniqued `int` constant.
    pub fn int(&mut self, value: i32) -> NodeId {
        self.constant(Constant::Int(value))
    }

    /// Uniqued `long` constant.
    pub fn long(&mut self, value: i64) -> NodeId {
        self.constant(Constant::Long(value))
    }

    /// Uniqued null reference.
    pub fn null(&mut self) -> NodeId {
        self.constant(Constant::Null)
    }

    /// A fresh floating parameter node.
    pub fn parameter(&mut self, index: u32, kind: ValueKind) -> NodeId {
        self.push_node(NodeKind::Parameter { index, kind }, &[], kind)
    }

    /// Add a phi to `block`; `inputs` follow the CFG predecessor order.
    pub fn add_phi(&mut self, block: BlockId, kind: ValueKind, inputs: &[NodeId]) -> NodeId {
        let id = self.push_node(NodeKind::Phi { block, kind }, inputs, kind);
        self.blocks[block.index()].phis.push(id);
        id
    }

    /// Append a fixed or control node at the end of `block`.
    pub fn append_fixed(&mut self, block: BlockId, kind: NodeKind, inputs: &[NodeId]) -> NodeId {
        debug_assert!(
            kind.is_scheduled_in_block() && !kind.is_block_begin(),
            "{} cannot be appended to a block",
            kind.name()
        );
        debug_assert!(
            self.terminator(block).is_none(),
            "{block} already has a terminator"
        );
        let value_kind = self.infer_value_kind(kind, inputs);
        let id = self.push_node(kind, inputs, value_kind);
        self.node_mut(id).block = Some(block);
        self.blocks[block.index()].nodes.push(id);
        id
    }

    /// Add a node of any non-control kind; fixed nodes are left unplaced.
    pub fn add_node(&mut self, kind: NodeKind, inputs: &[NodeId]) -> NodeId {
        match kind.class() {
            NodeClass::Fixed => self.add_unplaced(kind, inputs),
            NodeClass::Floating | NodeClass::Virtual => self.add_floating(kind, inputs),
            NodeClass::Control => panic!("{} must be appended to a block", kind.name()),
        }
    }

    /// Create a fixed node that is not placed in any block yet.
    ///
    /// Passes use this to prepare nodes whose final position is decided
    /// later with [`place_before`](Self::place_before). Unplaced fixed nodes
    /// are removed by dead code elimination.
    pub fn add_unplaced(&mut self, kind: NodeKind, inputs: &[NodeId]) -> NodeId {
        debug_assert_eq!(kind.class(), NodeClass::Fixed);
        let value_kind = self.infer_value_kind(kind, inputs);
        self.push_node(kind, inputs, value_kind)
    }

    /// Insert a new fixed node immediately before `anchor`.
    pub fn add_before(&mut self, anchor: NodeId, kind: NodeKind, inputs: &[NodeId]) -> NodeId {
        let id = self.add_unplaced(kind, inputs);
        self.place_before(anchor, id);
        id
    }

    /// Place an unplaced fixed node immediately before `anchor`.
    pub fn place_before(&mut self, anchor: NodeId, node: NodeId) {
        debug_assert!(self.node(node).block.is_none(), "{node} is already placed");
        let Some(block) = self.node(anchor).block else {
            panic!("anchor {anchor} is not placed in a block");
        };
        let nodes = &mut self.blocks[block.index()].nodes;
        let pos = nodes
            .iter()
            .position(|&n| n == anchor)
            .unwrap_or_else(|| panic!("anchor {anchor} missing from {block}"));
        debug_assert!(pos > 0, "cannot insert before the begin node of {block}");
        nodes.insert(pos, node);
        self.node_mut(node).block = Some(block);
    }

    // ── Queries ─────────────────────────────────────────────────

    /// Whether `id` names a node that has not been killed.
    #[inline]
    pub fn is_alive(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id.index()), Some(Some(_)))
    }

    /// # Panics
    ///
    /// Panics if `id` has been killed.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        match self.nodes.get(id.index()) {
            Some(Some(node)) => node,
            _ => panic!("{id} is not a live node"),
        }
    }

    #[inline]
    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.nodes.get_mut(id.index()) {
            Some(Some(node)) => node,
            _ => panic!("{id} is not a live node"),
        }
    }

    #[inline]
    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    #[inline]
    pub fn inputs(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).inputs
    }

    #[inline]
    pub fn input(&self, id: NodeId, index: usize) -> NodeId {
        self.node(id).inputs[index]
    }

    /// One entry per input edge pointing at `id`; a user appears once per edge.
    #[inline]
    pub fn usages(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).usages
    }

    /// Distinct usages of `id`, copied so the caller may mutate the graph
    /// while walking them.
    pub fn snapshot_usages(&self, id: NodeId) -> SmallVec<[NodeId; 8]> {
        let mut users: SmallVec<[NodeId; 8]> = self.node(id).usages.iter().copied().collect();
        users.sort_unstable();
        users.dedup();
        users
    }

    #[inline]
    pub fn value_kind(&self, id: NodeId) -> ValueKind {
        self.node(id).value_kind
    }

    /// Block a fixed or control node is placed in.
    #[inline]
    pub fn block_of(&self, id: NodeId) -> Option<BlockId> {
        self.node(id).block
    }

    pub fn constant_value(&self, id: NodeId) -> Option<Constant> {
        match self.kind(id) {
            NodeKind::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// IDs of all live nodes, ascending.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, n)| {
            #[expect(clippy::cast_possible_truncation, reason = "node count checked on creation")]
            let id = NodeId::new(i as u32);
            n.as_ref().map(|_| id)
        })
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Number of live nodes whose kind satisfies `pred`.
    pub fn count_nodes(&self, pred: impl Fn(NodeKind) -> bool) -> usize {
        self.nodes
            .iter()
            .flatten()
            .filter(|n| pred(n.kind))
            .count()
    }

    /// Upper bound (exclusive) of node indices ever allocated.
    #[inline]
    pub fn node_capacity(&self) -> usize {
        self.nodes.len()
    }

    // ── Mutation ────────────────────────────────────────────────

    fn remove_usage(&mut self, input: NodeId, user: NodeId) {
        let usages = &mut self.node_mut(input).usages;
        if let Some(pos) = usages.iter().position(|&u| u == user) {
            usages.swap_remove(pos);
        }
    }

    /// Redirect every input edge pointing at `old` to `new`.
    ///
    /// A usage that is `new` itself is skipped so no self-edge is created.
    pub fn replace_at_usages(&mut self, old: NodeId, new: NodeId) {
        if old == new {
            return;
        }
        for user in self.snapshot_usages(old) {
            if user != new {
                self.replace_input(user, old, new);
            }
        }
    }

    /// Replace every occurrence of `old` among `node`'s inputs with `new`.
    pub fn replace_input(&mut self, node: NodeId, old: NodeId, new: NodeId) {
        if old == new {
            return;
        }
        let mut replaced = 0;
        for input in &mut self.node_mut(node).inputs {
            if *input == old {
                *input = new;
                replaced += 1;
            }
        }
        for _ in 0..replaced {
            self.remove_usage(old, node);
            self.node_mut(new).usages.push(node);
        }
    }

    /// Point input `index` of `node` at `new`, moving the usage edge.
    pub fn set_input(&mut self, node: NodeId, index: usize, new: NodeId) {
        let old = self.node(node).inputs[index];
        if old == new {
            return;
        }
        self.node_mut(node).inputs[index] = new;
        self.remove_usage(old, node);
        self.node_mut(new).usages.push(node);
    }

    /// Replace every input of `node`, dropping the old usage edges.
    pub fn set_inputs(&mut self, node: NodeId, inputs: &[NodeId]) {
        let old = std::mem::take(&mut self.node_mut(node).inputs);
        for input in old {
            self.remove_usage(input, node);
        }
        for &input in inputs {
            self.node_mut(input).usages.push(node);
        }
        self.node_mut(node).inputs = inputs.into();
    }

    /// Add `input` after the existing inputs of `node`.
    pub fn append_input(&mut self, node: NodeId, input: NodeId) {
        self.node_mut(node).inputs.push(input);
        self.node_mut(input).usages.push(node);
    }

    /// Unlink a fixed node from its block and kill it.
    pub fn remove_fixed(&mut self, node: NodeId) -> Result<(), GraphError> {
        if self.kind(node).class() != NodeClass::Fixed {
            return Err(GraphError::NotFixed { node });
        }
        self.kill(node)
    }

    /// Delete a node that has no usages, dropping its input edges.
    pub fn kill(&mut self, node: NodeId) -> Result<(), GraphError> {
        let count = self.node(node).usages.len();
        if count > 0 {
            return Err(GraphError::UsagesRemain { node, count });
        }
        let data = self.node(node).clone();
        if let Some(block) = data.block {
            self.blocks[block.index()].nodes.retain(|&n| n != node);
        }
        if let NodeKind::Phi { block, .. } = data.kind {
            self.blocks[block.index()].phis.retain(|&n| n != node);
        }
        if let NodeKind::Constant(c) = data.kind {
            if self.constants.get(&c) == Some(&node) {
                self.constants.remove(&c);
            }
        }
        for &input in &data.inputs {
            self.remove_usage(input, node);
        }
        self.nodes[node.index()] = None;
        Ok(())
    }

    /// Check input/usage symmetry and block placement.
    pub fn verify(&self) -> Result<(), GraphError> {
        for id in self.node_ids() {
            let node = self.node(id);
            for &input in &node.inputs {
                if !self.is_alive(input) {
                    return Err(GraphError::DeadInput { node: id, input });
                }
                let edges = node.inputs.iter().filter(|&&i| i == input).count();
                let back = self.node(input).usages.iter().filter(|&&u| u == id).count();
                if edges != back {
                    return Err(GraphError::MissingUsage { node: id, input });
                }
            }
            for &usage in &node.usages {
                if !self.is_alive(usage) || !self.node(usage).inputs.contains(&id) {
                    return Err(GraphError::DanglingUsage { node: id, usage });
                }
            }
            if let Some(block) = node.block {
                if !self.blocks[block.index()].nodes.contains(&id) {
                    return Err(GraphError::Misplaced { node: id, block });
                }
            }
        }
        for block in self.block_ids() {
            for &id in self.block_nodes(block) {
                if self.node(id).block != Some(block) {
                    return Err(GraphError::Misplaced { node: id, block });
                }
            }
            if self.terminator(block).is_none() {
                return Err(GraphError::MissingTerminator { block });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "tests use unwrap to panic on unexpected state")]
mod tests;
