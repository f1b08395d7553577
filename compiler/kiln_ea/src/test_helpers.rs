//! Host types and runners shared by the escape analysis tests.

use std::sync::Arc;

use kiln_ir::{
    BlockId, ControlFlowGraph, FieldId, Graph, HostTypes, MethodId, NodeId, NodeKind,
    StorageKind, TypeId, ValueKind,
};
use kiln_loop::LoopsData;

use crate::{run, EscapeAnalysisConfig, EscapeAnalysisStats};

/// `Point { x: int, y: int }`, `Holder { inner: Object }` and an opaque
/// `sink(Object)` call.
pub(crate) struct Fixture {
    pub graph: Graph,
    pub point: TypeId,
    pub x: FieldId,
    pub y: FieldId,
    pub holder: TypeId,
    pub inner: FieldId,
    pub sink: MethodId,
}

pub(crate) fn fixture() -> Fixture {
    let mut types = HostTypes::new();
    let point = types.define_type(
        "Point",
        None,
        &[("x", StorageKind::Int), ("y", StorageKind::Int)],
    );
    let holder = types.define_type("Holder", None, &[("inner", StorageKind::Object)]);
    let sink = types.define_method("sink", ValueKind::Void);
    let x = types.type_desc(point).declared_fields[0];
    let y = types.type_desc(point).declared_fields[1];
    let inner = types.type_desc(holder).declared_fields[0];
    Fixture {
        graph: Graph::new(Arc::new(types)),
        point,
        x,
        y,
        holder,
        inner,
        sink,
    }
}

impl Fixture {
    pub fn new_point(&mut self, block: BlockId) -> NodeId {
        self.graph
            .append_fixed(block, NodeKind::NewInstance { ty: self.point }, &[])
    }

    pub fn store(
        &mut self,
        block: BlockId,
        object: NodeId,
        field: FieldId,
        value: NodeId,
    ) -> NodeId {
        self.graph
            .append_fixed(block, NodeKind::StoreField { field }, &[object, value])
    }

    pub fn load(&mut self, block: BlockId, object: NodeId, field: FieldId) -> NodeId {
        self.graph
            .append_fixed(block, NodeKind::LoadField { field }, &[object])
    }

    pub fn call_sink(&mut self, block: BlockId, object: NodeId) -> NodeId {
        self.graph
            .append_fixed(block, NodeKind::Invoke { target: self.sink }, &[object])
    }
}

pub(crate) fn run_ea(graph: &mut Graph) -> EscapeAnalysisStats {
    run_ea_with(graph, EscapeAnalysisConfig::default())
}

pub(crate) fn run_ea_with(graph: &mut Graph, config: EscapeAnalysisConfig) -> EscapeAnalysisStats {
    graph.verify().unwrap();
    let cfg = ControlFlowGraph::compute(graph);
    let loops = LoopsData::compute(graph, &cfg);
    let stats = run(graph, &cfg, &loops, &config).unwrap();
    graph.verify().unwrap();
    stats
}

pub(crate) fn allocations(graph: &Graph) -> usize {
    graph.count_nodes(NodeKind::is_allocation)
}

/// Kind names of the nodes placed in `block`, in order.
pub(crate) fn block_kinds(graph: &Graph, block: BlockId) -> Vec<&'static str> {
    graph
        .block_nodes(block)
        .iter()
        .map(|&n| graph.kind(n).name())
        .collect()
}
