//! Spill area layout of one frame.

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::lir::{LirKind, StackSlot};

/// Final frame sizes are multiples of this.
pub const FRAME_ALIGNMENT: u32 = 16;

/// Slots of one class are interchangeable when reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct SlotClass {
    size: u32,
    reference: bool,
}

impl SlotClass {
    fn of(kind: LirKind) -> Self {
        Self {
            size: kind.size_in_bytes(),
            reference: kind.is_reference(),
        }
    }
}

/// Reserves spill slots at their natural alignment and recycles freed ones.
#[derive(Clone, Debug, Default)]
pub struct FrameMap {
    spill_size: u32,
    free: FxHashMap<SlotClass, Vec<StackSlot>>,
    reserved: usize,
}

impl FrameMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A slot for `kind`, reusing a freed slot of the same class if any.
    pub fn allocate_spill_slot(&mut self, kind: LirKind) -> StackSlot {
        let class = SlotClass::of(kind);
        if let Some(slot) = self.free.get_mut(&class).and_then(Vec::pop) {
            trace!(%slot, ?kind, "reused spill slot");
            return StackSlot {
                offset: slot.offset,
                kind,
            };
        }
        let offset = align_up(self.spill_size, class.size);
        self.spill_size = offset + class.size;
        self.reserved += 1;
        let slot = StackSlot { offset, kind };
        trace!(%slot, "reserved spill slot");
        slot
    }

    /// Make `slot` available to later requests of the same class.
    pub fn free_spill_slot(&mut self, slot: StackSlot) {
        self.free.entry(SlotClass::of(slot.kind)).or_default().push(slot);
    }

    /// Number of distinct slots reserved so far.
    pub fn reserved_slots(&self) -> usize {
        self.reserved
    }

    /// Bytes used by spill slots, before frame alignment.
    pub fn spill_size(&self) -> u32 {
        self.spill_size
    }

    /// The final frame size.
    pub fn finish(&self) -> u32 {
        align_up(self.spill_size, FRAME_ALIGNMENT)
    }
}

fn align_up(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests;
