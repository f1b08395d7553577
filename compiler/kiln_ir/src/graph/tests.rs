use pretty_assertions::assert_eq;

use crate::meta::ValueKind;
use crate::node::{BinaryOp, Constant, NodeKind};
use crate::test_helpers::{diamond, empty_graph, goto, point_types};

use super::*;

#[test]
fn new_graph_has_entry_with_start() {
    let graph = empty_graph();
    let entry = graph.entry();
    assert_eq!(graph.num_blocks(), 1);
    assert_eq!(graph.kind(graph.begin(entry)), NodeKind::Start);
    assert_eq!(graph.terminator(entry), None);
}

#[test]
fn constants_are_uniqued() {
    let mut graph = empty_graph();
    let a = graph.int(7);
    let b = graph.constant(Constant::Int(7));
    let c = graph.long(7);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(graph.value_kind(c), ValueKind::Long);
}

#[test]
fn replace_at_usages_moves_every_edge() {
    let mut graph = empty_graph();
    let entry = graph.entry();
    let p = graph.parameter(0, ValueKind::Int);
    let q = graph.parameter(1, ValueKind::Int);
    let sum = graph.add_floating(NodeKind::Binary(BinaryOp::Add), &[p, p]);
    let ret = graph.append_fixed(entry, NodeKind::Return, &[p]);

    graph.replace_at_usages(p, q);

    assert_eq!(graph.inputs(sum), &[q, q]);
    assert_eq!(graph.inputs(ret), &[q]);
    assert!(graph.usages(p).is_empty());
    assert_eq!(graph.usages(q).len(), 3);
    assert_eq!(graph.verify(), Ok(()));
}

#[test]
fn replace_at_usages_skips_the_replacement_itself() {
    let mut graph = empty_graph();
    let entry = graph.entry();
    let p = graph.parameter(0, ValueKind::Int);
    let one = graph.int(1);
    let inc = graph.add_floating(NodeKind::Binary(BinaryOp::Add), &[p, one]);
    graph.append_fixed(entry, NodeKind::Return, &[p]);

    graph.replace_at_usages(p, inc);

    assert_eq!(graph.inputs(inc), &[p, one]);
    assert_eq!(graph.usages(p), &[inc]);
    assert_eq!(graph.verify(), Ok(()));
}

#[test]
fn kill_requires_zero_usages() {
    let mut graph = empty_graph();
    let entry = graph.entry();
    let p = graph.parameter(0, ValueKind::Int);
    let ret = graph.append_fixed(entry, NodeKind::Return, &[p]);

    assert_eq!(
        graph.kill(p),
        Err(GraphError::UsagesRemain { node: p, count: 1 })
    );
    graph.set_inputs(ret, &[]);
    assert_eq!(graph.kill(p), Ok(()));
    assert!(!graph.is_alive(p));
    assert_eq!(graph.verify(), Ok(()));
}

#[test]
fn killed_constant_is_recreated_on_demand() {
    let mut graph = empty_graph();
    let seven = graph.int(7);
    graph.kill(seven).unwrap();
    let again = graph.int(7);
    assert_ne!(seven, again);
    assert!(graph.is_alive(again));
}

#[test]
fn remove_fixed_unlinks_from_block() {
    let (types, point) = point_types();
    let mut graph = Graph::new(types);
    let entry = graph.entry();
    let alloc = graph.append_fixed(entry, NodeKind::NewInstance { ty: point }, &[]);
    let ret = graph.append_fixed(entry, NodeKind::Return, &[]);

    assert_eq!(graph.block_nodes(entry), &[graph.begin(entry), alloc, ret]);
    graph.remove_fixed(alloc).unwrap();
    assert_eq!(graph.block_nodes(entry), &[graph.begin(entry), ret]);
    assert_eq!(
        graph.remove_fixed(ret),
        Err(GraphError::NotFixed { node: ret })
    );
}

#[test]
fn add_before_inserts_ahead_of_anchor() {
    let (types, point) = point_types();
    let mut graph = Graph::new(types);
    let entry = graph.entry();
    let ret = graph.append_fixed(entry, NodeKind::Return, &[]);
    let alloc = graph.add_before(ret, NodeKind::NewInstance { ty: point }, &[]);

    assert_eq!(graph.block_nodes(entry), &[graph.begin(entry), alloc, ret]);
    assert_eq!(graph.block_of(alloc), Some(entry));
    assert_eq!(graph.value_kind(alloc), ValueKind::Object);
}

#[test]
fn value_kind_follows_field_metadata() {
    let (types, point) = point_types();
    let x = types.instance_fields(point)[0];
    let mut graph = Graph::new(types);
    let entry = graph.entry();
    let alloc = graph.append_fixed(entry, NodeKind::NewInstance { ty: point }, &[]);
    let load = graph.append_fixed(entry, NodeKind::LoadField { field: x }, &[alloc]);
    assert_eq!(graph.value_kind(load), ValueKind::Int);
}

#[test]
fn verify_reports_missing_terminator() {
    let mut graph = empty_graph();
    let entry = graph.entry();
    let next = graph.add_block();
    goto(&mut graph, entry, next);
    assert_eq!(
        graph.verify(),
        Err(GraphError::MissingTerminator { block: next })
    );
}

#[test]
fn phis_are_registered_with_their_block() {
    let d = diamond();
    assert_eq!(d.graph.phis(d.blocks[3]), &[d.phi]);
    assert_eq!(d.graph.verify(), Ok(()));
}

// === Property tests ===

mod proptest_usages {
    use proptest::prelude::*;

    use crate::meta::ValueKind;
    use crate::node::{BinaryOp, NodeId, NodeKind};
    use crate::test_helpers::empty_graph;

    #[derive(Clone, Debug)]
    enum Op {
        Binary(usize, usize),
        Replace(usize, usize),
        SetInput(usize, usize),
        Kill(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Binary(a, b)),
            (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Replace(a, b)),
            (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::SetInput(a, b)),
            any::<usize>().prop_map(Op::Kill),
        ]
    }

    proptest! {
        #[test]
        fn usages_mirror_inputs_after_any_mutation(
            ops in proptest::collection::vec(op(), 1..48)
        ) {
            let mut graph = empty_graph();
            let entry = graph.entry();
            let mut pool: Vec<NodeId> = (0..4)
                .map(|i| graph.parameter(i, ValueKind::Int))
                .collect();
            graph.append_fixed(entry, NodeKind::Return, &[pool[0]]);

            for op in ops {
                let pick = |i: usize| pool[i % pool.len()];
                match op {
                    Op::Binary(a, b) => {
                        let (x, y) = (pick(a), pick(b));
                        let n = graph.add_floating(NodeKind::Binary(BinaryOp::Add), &[x, y]);
                        pool.push(n);
                    }
                    Op::Replace(a, b) => {
                        let (old, new) = (pick(a), pick(b));
                        graph.replace_at_usages(old, new);
                    }
                    Op::SetInput(a, b) => {
                        let (node, new) = (pick(a), pick(b));
                        if !graph.inputs(node).is_empty() {
                            graph.set_input(node, 0, new);
                        }
                    }
                    Op::Kill(a) => {
                        let node = pick(a);
                        if pool.len() > 1 && graph.usages(node).is_empty() {
                            prop_assert!(graph.kill(node).is_ok());
                            pool.retain(|&n| n != node);
                        }
                    }
                }
                prop_assert_eq!(graph.verify(), Ok(()));
            }
        }
    }
}
