use pretty_assertions::assert_eq;

use crate::cfg::ControlFlowGraph;
use crate::meta::ValueKind;
use crate::node::{BinaryOp, NodeKind};
use crate::test_helpers::{diamond, empty_graph, goto, simple_loop};

use super::*;

fn position(list: &[NodeId], node: NodeId) -> usize {
    list.iter()
        .position(|&n| n == node)
        .unwrap_or_else(|| panic!("{node} not scheduled in this block"))
}

#[test]
fn inputs_precede_their_users() {
    let d = diamond();
    let cfg = ControlFlowGraph::compute(&d.graph);
    let schedule = Schedule::compute(&d.graph, &cfg);
    let entry = d.blocks[0];
    let list = schedule.nodes(entry);

    let branch = d.graph.terminator(entry).unwrap();
    let cond = d.graph.input(branch, 0);
    let [p, zero] = [d.graph.input(cond, 0), d.graph.input(cond, 1)];
    assert_eq!(list[0], d.graph.begin(entry));
    assert!(position(list, p) < position(list, cond));
    assert!(position(list, zero) < position(list, cond));
    assert!(position(list, cond) < position(list, branch));
    assert_eq!(*list.last().unwrap(), branch);
}

#[test]
fn phis_follow_the_begin_node() {
    let d = diamond();
    let cfg = ControlFlowGraph::compute(&d.graph);
    let schedule = Schedule::compute(&d.graph, &cfg);
    let merge = d.blocks[3];
    let ret = d.graph.terminator(merge).unwrap();
    assert_eq!(schedule.nodes(merge), &[d.graph.begin(merge), d.phi, ret]);
}

#[test]
fn constants_are_placed_in_the_entry_block() {
    let d = diamond();
    let cfg = ControlFlowGraph::compute(&d.graph);
    let schedule = Schedule::compute(&d.graph, &cfg);
    for &input in d.graph.inputs(d.phi) {
        assert_eq!(schedule.block_of(input), Some(d.blocks[0]));
    }
}

#[test]
fn loop_values_are_placed_in_the_header() {
    let l = simple_loop();
    let cfg = ControlFlowGraph::compute(&l.graph);
    let schedule = Schedule::compute(&l.graph, &cfg);
    let header = l.blocks[1];
    let next = l.graph.input(l.iv, 1);
    assert_eq!(schedule.block_of(next), Some(header));

    let list = schedule.nodes(header);
    assert_eq!(list[0], l.graph.begin(header));
    assert_eq!(list[1], l.iv);
    assert!(position(list, next) < list.len() - 1);
}

#[test]
fn values_are_placed_below_their_deepest_input() {
    let mut graph = empty_graph();
    let entry = graph.entry();
    let next = graph.add_block();
    let p = graph.parameter(0, ValueKind::Int);
    goto(&mut graph, entry, next);
    let phi = graph.add_phi(next, ValueKind::Int, &[p]);
    let sum = graph.add_floating(NodeKind::Binary(BinaryOp::Add), &[p, phi]);
    let ret = graph.append_fixed(next, NodeKind::Return, &[sum]);

    let cfg = ControlFlowGraph::compute(&graph);
    let schedule = Schedule::compute(&graph, &cfg);
    assert_eq!(schedule.block_of(p), Some(entry));
    assert_eq!(schedule.block_of(sum), Some(next));
    assert_eq!(
        schedule.nodes(next),
        &[graph.begin(next), phi, sum, ret]
    );
}
