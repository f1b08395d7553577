use pretty_assertions::assert_eq;

use super::*;
use crate::interval::UseType;
use crate::lir::{LirInstruction, LirKind, Operand};

fn nop() -> LirInstruction {
    LirInstruction::new("nop", [])
}

#[test]
fn def_at_ten_and_use_at_fifty() {
    let mut func = LirFunction::new("f");
    let b0 = func.add_block();
    let slot = func.new_virtual_slot(LirKind::DWord);
    for _ in 0..5 {
        func.push(b0, nop());
    }
    func.push(b0, LirInstruction::new("spill", [Operand::slot(OperandMode::Def, slot)]));
    for _ in 0..19 {
        func.push(b0, nop());
    }
    func.push(b0, LirInstruction::new("reload", [Operand::slot(OperandMode::Use, slot)]));
    func.push(b0, LirInstruction::new("ret", []));
    func.number_instructions();

    let intervals = build_intervals(&func).unwrap();
    let si = intervals[0].as_ref().unwrap();

    assert_eq!((si.from(), si.to()), (10, 50));
    assert_eq!(
        si.use_positions().iter().map(|(&p, &u)| (p, u)).collect::<Vec<_>>(),
        vec![(10, UseType::Def), (50, UseType::Use)]
    );
    assert_eq!(si.kind(), LirKind::DWord);
}

#[test]
fn loop_carried_slot_covers_the_whole_loop() {
    let mut func = LirFunction::new("loop");
    let entry = func.add_block();
    let body = func.add_block();
    let exit = func.add_block();
    let slot = func.new_virtual_slot(LirKind::QWord);
    func.push(entry, LirInstruction::new("spill", [Operand::slot(OperandMode::Def, slot)]));
    func.push(entry, LirInstruction::new("jump", []));
    func.push(body, LirInstruction::new("reload", [Operand::slot(OperandMode::Use, slot)]));
    func.push(body, LirInstruction::new("branch", []));
    func.push(exit, LirInstruction::new("ret", []));
    func.add_edge(entry, body);
    func.add_edge(body, body);
    func.add_edge(body, exit);
    func.number_instructions();

    let liveness = compute_slot_liveness(&func);
    assert!(liveness.live_in[body.index()].contains(&slot));
    assert!(liveness.live_out[body.index()].contains(&slot));
    assert!(liveness.live_in[exit.index()].is_empty());

    let intervals = build_intervals(&func).unwrap();
    let si = intervals[0].as_ref().unwrap();
    assert_eq!((si.from(), si.to()), (0, 7));
}

#[test]
fn slot_read_without_a_def_is_fixed() {
    let mut func = LirFunction::new("param");
    let b0 = func.add_block();
    let slot = func.new_virtual_slot(LirKind::Reference);
    func.push(b0, nop());
    func.push(b0, LirInstruction::new("reload", [Operand::slot(OperandMode::Use, slot)]));
    func.push(b0, LirInstruction::new("ret", []));
    func.number_instructions();

    let intervals = build_intervals(&func).unwrap();
    let si = intervals[0].as_ref().unwrap();
    assert!(si.is_fixed());
    assert_eq!((si.from(), si.to()), (0, 2));
}

#[test]
fn alive_operands_extend_past_the_instruction() {
    let mut func = LirFunction::new("alive");
    let b0 = func.add_block();
    let slot = func.new_virtual_slot(LirKind::QWord);
    func.push(b0, LirInstruction::new("spill", [Operand::slot(OperandMode::Def, slot)]));
    func.push(b0, LirInstruction::new("op", [Operand::slot(OperandMode::Alive, slot)]));
    func.push(b0, LirInstruction::new("ret", []));
    func.number_instructions();

    let intervals = build_intervals(&func).unwrap();
    let si = intervals[0].as_ref().unwrap();
    assert_eq!((si.from(), si.to()), (0, 3));
}

#[test]
fn unreferenced_slots_get_no_interval() {
    let mut func = LirFunction::new("f");
    let b0 = func.add_block();
    let used = func.new_virtual_slot(LirKind::QWord);
    func.new_virtual_slot(LirKind::QWord);
    func.push(b0, LirInstruction::new("spill", [Operand::slot(OperandMode::Def, used)]));
    func.number_instructions();

    let intervals = build_intervals(&func).unwrap();
    assert!(intervals[0].is_some());
    assert!(intervals[1].is_none());
}
