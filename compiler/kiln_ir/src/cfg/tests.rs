use pretty_assertions::assert_eq;

use crate::graph::Graph;
use crate::meta::ValueKind;
use crate::node::{BlockId, NodeKind};
use crate::test_helpers::{branch, diamond, empty_graph, goto, simple_loop};

use super::*;

fn b(n: u32) -> BlockId {
    BlockId::new(n)
}

#[test]
fn diamond_predecessors_are_ordered_by_block_index() {
    let d = diamond();
    let cfg = ControlFlowGraph::compute(&d.graph);
    let [entry, then_block, else_block, merge] = d.blocks;
    assert_eq!(cfg.successors(entry), &[then_block, else_block]);
    assert_eq!(cfg.predecessors(merge), &[then_block, else_block]);
    assert_eq!(cfg.predecessor_index(merge, else_block), Some(1));
    assert!(cfg.loops().is_empty());
    assert!(!cfg.is_irreducible());
}

#[test]
fn diamond_dominators() {
    let d = diamond();
    let cfg = ControlFlowGraph::compute(&d.graph);
    let [entry, then_block, else_block, merge] = d.blocks;
    assert_eq!(cfg.idom(merge), Some(entry));
    assert_eq!(cfg.idom(then_block), Some(entry));
    assert!(cfg.dominates(entry, merge));
    assert!(!cfg.dominates(then_block, merge));
    assert!(!cfg.dominates(else_block, then_block));
    assert_eq!(cfg.dom_depth(merge), 1);
}

#[test]
fn simple_loop_is_found() {
    let l = simple_loop();
    let cfg = ControlFlowGraph::compute(&l.graph);
    let [entry, header, body, exit] = l.blocks;
    assert_eq!(cfg.predecessors(header), &[entry, body]);

    let loops = cfg.loops();
    assert_eq!(loops.len(), 1);
    let lp = &loops[0];
    assert_eq!(lp.header, header);
    assert_eq!(lp.blocks, vec![header, body]);
    assert_eq!(lp.back_edges, vec![body]);
    assert_eq!(lp.exits, vec![(header, exit)]);
    assert_eq!(lp.depth, 0);
    assert_eq!(lp.parent, None);
    assert!(cfg.is_back_edge(body, header));
    assert!(!cfg.is_back_edge(entry, header));
    assert_eq!(cfg.loop_of(body), Some(lp.id));
    assert_eq!(cfg.loop_of(exit), None);
}

/// B0 -> B1 (outer) -> B2 (inner) -> B3 -> B2 | B4 -> B1 | B5
fn nested_loops() -> Graph {
    let mut graph = empty_graph();
    let outer = graph.add_loop_header();
    let inner = graph.add_loop_header();
    let inner_body = graph.add_block();
    let outer_latch = graph.add_block();
    let exit = graph.add_block();
    let p = graph.parameter(0, ValueKind::Int);

    goto(&mut graph, b(0), outer);
    goto(&mut graph, outer, inner);
    branch(&mut graph, inner, p, inner_body, outer_latch);
    goto(&mut graph, inner_body, inner);
    branch(&mut graph, outer_latch, p, outer, exit);
    graph.append_fixed(exit, NodeKind::Return, &[]);
    graph
}

#[test]
fn nested_loop_depths_and_parents() {
    let graph = nested_loops();
    let cfg = ControlFlowGraph::compute(&graph);
    let loops = cfg.loops();
    assert_eq!(loops.len(), 2);
    assert_eq!(loops[0].header, b(1));
    assert_eq!(loops[0].depth, 0);
    assert_eq!(loops[0].blocks, vec![b(1), b(2), b(3), b(4)]);
    assert_eq!(loops[1].header, b(2));
    assert_eq!(loops[1].depth, 1);
    assert_eq!(loops[1].parent, Some(loops[0].id));
    assert_eq!(loops[1].blocks, vec![b(2), b(3)]);
    assert_eq!(cfg.loop_of(b(3)), Some(loops[1].id));
    assert_eq!(cfg.loop_of(b(4)), Some(loops[0].id));
}

#[test]
fn block_order_keeps_loop_bodies_contiguous() {
    let graph = nested_loops();
    let cfg = ControlFlowGraph::compute(&graph);
    let order = cfg.block_order();
    assert_eq!(order.len(), 6);
    assert_eq!(order[0], b(0));
    assert_eq!(*order.last().unwrap(), b(5));

    for lp in cfg.loops() {
        let positions: Vec<usize> = lp
            .blocks
            .iter()
            .map(|blk| order.iter().position(|o| o == blk).unwrap())
            .collect();
        let lo = *positions.iter().min().unwrap();
        let hi = *positions.iter().max().unwrap();
        assert_eq!(hi - lo + 1, lp.blocks.len(), "loop {} is split", lp.id);
        assert_eq!(order[lo], lp.header);
    }
}

#[test]
fn unreachable_blocks_are_not_predecessors() {
    let mut graph = empty_graph();
    let target = graph.add_block();
    let dead = graph.add_block();
    goto(&mut graph, b(0), target);
    goto(&mut graph, dead, target);
    graph.append_fixed(target, NodeKind::Return, &[]);

    let cfg = ControlFlowGraph::compute(&graph);
    assert!(!cfg.is_reachable(dead));
    assert_eq!(cfg.predecessors(target), &[b(0)]);
    assert!(!cfg.block_order().contains(&dead));
}

#[test]
fn irreducible_graph_is_detected() {
    // B0 branches into both B1 and B2, which jump to each other.
    let mut graph = empty_graph();
    let left = graph.add_block();
    let right = graph.add_block();
    let exit = graph.add_block();
    let p = graph.parameter(0, ValueKind::Int);
    branch(&mut graph, b(0), p, left, right);
    branch(&mut graph, left, p, right, exit);
    branch(&mut graph, right, p, left, exit);
    graph.append_fixed(exit, NodeKind::Return, &[]);

    let cfg = ControlFlowGraph::compute(&graph);
    assert!(cfg.is_irreducible());
    assert!(cfg.loops().is_empty());
}
