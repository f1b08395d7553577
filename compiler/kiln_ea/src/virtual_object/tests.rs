use std::sync::Arc;

use pretty_assertions::assert_eq;

use kiln_ir::{HostTypes, StorageKind};

use super::*;

fn types() -> (Arc<HostTypes>, TypeId, TypeId) {
    let mut types = HostTypes::new();
    let base = types.define_type("Base", None, &[("flag", StorageKind::Boolean)]);
    let derived = types.define_type(
        "Derived",
        Some(base),
        &[("count", StorageKind::Int), ("next", StorageKind::Object)],
    );
    (Arc::new(types), base, derived)
}

#[test]
fn instance_entries_follow_the_type_hierarchy() {
    let (types, base, derived) = types();
    let shape = VirtualShape::instance(&types, derived);
    assert_eq!(shape.entry_count(), 3);
    assert_eq!(shape.entry_kind(&types, 0), StorageKind::Boolean);
    assert_eq!(shape.entry_kind(&types, 2), StorageKind::Object);

    let flag = types.type_desc(base).declared_fields[0];
    let next = types.type_desc(derived).declared_fields[1];
    assert_eq!(shape.field_index(flag), Some(0));
    assert_eq!(shape.field_index(next), Some(2));

    let base_shape = VirtualShape::instance(&types, base);
    assert_eq!(base_shape.field_index(next), None);
}

#[test]
fn offsets_map_to_entries() {
    let (types, _, derived) = types();
    let shape = VirtualShape::instance(&types, derived);
    for index in 0..shape.entry_count() {
        let VirtualShape::Instance { fields, .. } = &shape else {
            unreachable!()
        };
        let offset = types.field(fields[index]).offset;
        assert_eq!(shape.entry_index_for_offset(&types, offset), Some(index));
    }
    assert_eq!(shape.entry_index_for_offset(&types, 3), None);
}

#[test]
fn array_offsets_and_indices() {
    let (types, _, _) = types();
    let shape = VirtualShape::Array {
        elem: StorageKind::Long,
        length: 4,
    };
    assert_eq!(shape.entry_count(), 4);
    assert_eq!(shape.entry_index_for_offset(&types, 16), Some(0));
    assert_eq!(shape.entry_index_for_offset(&types, 40), Some(3));
    assert_eq!(shape.entry_index_for_offset(&types, 48), None);
    assert_eq!(shape.entry_index_for_offset(&types, 20), None);
    assert_eq!(shape.element_index(3), Some(3));
    assert_eq!(shape.element_index(4), None);
    assert_eq!(shape.element_index(-1), None);
}

#[test]
fn defaults_are_zero_of_the_entry_kind() {
    let (types, _, derived) = types();
    let mut graph = Graph::new(types);
    let shape = VirtualShape::instance(graph.types(), derived);
    let defaults = shape.default_entries(&mut graph);
    assert_eq!(graph.constant_value(defaults[0]), Some(Constant::Int(0)));
    assert_eq!(graph.constant_value(defaults[1]), Some(Constant::Int(0)));
    assert_eq!(graph.constant_value(defaults[2]), Some(Constant::Null));
    assert!(shape.is_default(&graph, 1, defaults[1]));
    let one = graph.int(1);
    assert!(!shape.is_default(&graph, 1, one));
}

#[test]
fn materialization_nodes_start_unplaced() {
    let (types, _, _) = types();
    let mut graph = Graph::new(types);
    let shape = VirtualShape::Array {
        elem: StorageKind::Int,
        length: 2,
    };
    let alloc = shape.build_allocation(&mut graph);
    let value = graph.int(5);
    let store = shape.build_store(&mut graph, alloc, 1, value);
    assert_eq!(graph.block_of(alloc), None);
    assert_eq!(graph.block_of(store), None);
    assert_eq!(graph.constant_value(graph.input(alloc, 0)), Some(Constant::Int(2)));
    assert_eq!(graph.constant_value(graph.input(store, 1)), Some(Constant::Int(1)));
    assert_eq!(graph.input(store, 2), value);
}
