use pretty_assertions::assert_eq;

use super::*;

#[test]
fn slots_are_naturally_aligned() {
    let mut frame = FrameMap::new();
    let a = frame.allocate_spill_slot(LirKind::Byte);
    let b = frame.allocate_spill_slot(LirKind::DWord);
    let c = frame.allocate_spill_slot(LirKind::QWord);
    let d = frame.allocate_spill_slot(LirKind::Word);

    assert_eq!([a.offset, b.offset, c.offset, d.offset], [0, 4, 8, 16]);
    assert_eq!(frame.spill_size(), 18);
    assert_eq!(frame.finish(), 32);
    assert_eq!(frame.reserved_slots(), 4);
}

#[test]
fn freed_slots_are_reused_within_their_class() {
    let mut frame = FrameMap::new();
    let long = frame.allocate_spill_slot(LirKind::QWord);
    frame.free_spill_slot(long);

    let reference = frame.allocate_spill_slot(LirKind::Reference);
    assert_ne!(reference.offset, long.offset);

    let double = frame.allocate_spill_slot(LirKind::Double);
    assert_eq!(double.offset, long.offset);
    assert_eq!(double.kind, LirKind::Double);
    assert_eq!(frame.reserved_slots(), 2);
}

#[test]
fn empty_frame_has_size_zero() {
    assert_eq!(FrameMap::new().finish(), 0);
}
