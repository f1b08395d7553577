use pretty_assertions::assert_eq;

use super::*;

#[test]
fn instructions_are_numbered_by_two_across_blocks() {
    let mut func = LirFunction::new("f");
    let b0 = func.add_block();
    let b1 = func.add_block();
    let slot = func.new_virtual_slot(LirKind::QWord);
    func.push(b0, LirInstruction::new("store", [Operand::slot(OperandMode::Def, slot)]));
    func.push(b0, LirInstruction::new("jump", []));
    func.push(b1, LirInstruction::new("load", [Operand::slot(OperandMode::Use, slot)]));

    let max = func.number_instructions();

    assert_eq!(max, 4);
    assert_eq!(func.max_op_id(), 4);
    assert_eq!(func.block(b0).first_op_id(), Some(0));
    assert_eq!(func.block(b0).last_op_id(), Some(2));
    assert_eq!(func.block(b1).first_op_id(), Some(4));
}

#[test]
fn empty_blocks_have_no_op_ids() {
    let mut func = LirFunction::new("f");
    let b0 = func.add_block();
    let b1 = func.add_block();
    func.push(b0, LirInstruction::new("ret", []));

    assert_eq!(func.number_instructions(), 0);
    assert_eq!(func.block(b1).first_op_id(), None);
    assert_eq!(func.max_op_id(), 0);
}

#[test]
fn operand_constructors_set_flags() {
    let slot = VirtualStackSlot::new(3);
    let op = Operand::slot(OperandMode::Alive, slot);
    assert_eq!(op.virtual_slot(), Some(slot));
    assert!(op.flags.contains(OperandFlags::STACK));

    let imm = Operand::immediate(7);
    assert_eq!(imm.mode, OperandMode::Use);
    assert_eq!(imm.flags, OperandFlags::CONST);
    assert_eq!(imm.virtual_slot(), None);
    assert_eq!(Operand::register(OperandMode::Def, 2).flags, OperandFlags::REG);
}

#[test]
fn kinds_report_size_and_reference_ness() {
    assert_eq!(LirKind::Word.size_in_bytes(), 2);
    assert_eq!(LirKind::Single.size_in_bytes(), 4);
    assert_eq!(LirKind::Reference.size_in_bytes(), 8);
    assert!(LirKind::Reference.is_reference());
    assert!(!LirKind::QWord.is_reference());
}
