use std::sync::Arc;

use pretty_assertions::assert_eq;

use kiln_ir::{HostTypes, NodeKind, StorageKind, ValueKind};

use super::*;

#[test]
fn rewiring_runs_before_deletions() {
    let mut types = HostTypes::new();
    let ty = types.define_type("Box", None, &[("v", StorageKind::Int)]);
    let field = types.type_desc(ty).declared_fields[0];
    let mut graph = Graph::new(Arc::new(types));
    let entry = graph.entry();
    let alloc = graph.append_fixed(entry, NodeKind::NewInstance { ty }, &[]);
    let load = graph.append_fixed(entry, NodeKind::LoadField { field }, &[alloc]);
    let ret = graph.append_fixed(entry, NodeKind::Return, &[load]);
    let seven = graph.int(7);

    // Recorded in program order: the allocation's deletion comes first but
    // must run last.
    let effects = vec![
        Effect::RemoveFixed { node: alloc },
        Effect::ReplaceAtUsages {
            node: load,
            replacement: seven,
        },
        Effect::RemoveFixed { node: load },
    ];
    let applied = apply(&mut graph, [effects.as_slice()]).unwrap();

    assert_eq!(applied.removed_allocations, 1);
    assert_eq!(graph.inputs(ret), &[seven]);
    assert_eq!(graph.block_nodes(entry), &[graph.begin(entry), ret]);
    graph.verify().unwrap();
}

#[test]
fn placement_and_input_edits() {
    let mut types = HostTypes::new();
    let method = types.define_method("sink", ValueKind::Void);
    let mut graph = Graph::new(Arc::new(types));
    let entry = graph.entry();
    let p = graph.parameter(0, ValueKind::Int);
    let call = graph.append_fixed(entry, NodeKind::Invoke { target: method }, &[p]);
    graph.append_fixed(entry, NodeKind::Return, &[]);
    let q = graph.parameter(1, ValueKind::Int);
    let pending = graph.add_unplaced(NodeKind::Invoke { target: method }, &[]);

    let effects = [
        Effect::AddBefore {
            anchor: call,
            node: pending,
        },
        Effect::SetInput {
            node: call,
            index: 0,
            value: q,
        },
        Effect::AppendInput {
            node: pending,
            value: p,
        },
    ];
    let applied = apply(&mut graph, [&effects[..]]).unwrap();

    assert_eq!(applied.placed_allocations, 0);
    assert_eq!(graph.block_nodes(entry)[1], pending);
    assert_eq!(graph.inputs(call), &[q]);
    assert_eq!(graph.inputs(pending), &[p]);
    graph.verify().unwrap();
}

#[test]
fn deleting_a_used_node_fails() {
    let mut types = HostTypes::new();
    let ty = types.define_type("Box", None, &[]);
    let mut graph = Graph::new(Arc::new(types));
    let entry = graph.entry();
    let alloc = graph.append_fixed(entry, NodeKind::NewInstance { ty }, &[]);
    graph.append_fixed(entry, NodeKind::Return, &[alloc]);
    let result = apply(&mut graph, [&[Effect::RemoveFixed { node: alloc }][..]]);
    assert_eq!(
        result,
        Err(GraphError::UsagesRemain {
            node: alloc,
            count: 1
        })
    );
}
