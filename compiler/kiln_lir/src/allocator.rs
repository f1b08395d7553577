//! Linear-scan assignment of physical stack slots.
//!
//! Intervals are visited by increasing start. Before an interval gets a
//! slot, every active interval that ended strictly before its start hands
//! its slot back to the [`FrameMap`], so slots of the same class are reused
//! as soon as their previous occupant is dead.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::builder::build_intervals;
use crate::frame_map::FrameMap;
use crate::interval::{StackAllocError, StackInterval};
use crate::lir::{LirFunction, LirValue, StackSlot, VirtualStackSlot};

/// Physical slot of every virtual stack slot; `None` for slots that never
/// occur in the LIR.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StackSlotAssignment {
    slots: Vec<Option<StackSlot>>,
}

impl StackSlotAssignment {
    pub fn get(&self, slot: VirtualStackSlot) -> Option<StackSlot> {
        self.slots.get(slot.index()).copied().flatten()
    }

    /// Number of virtual slots that received a location.
    pub fn assigned(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VirtualStackSlot, StackSlot)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            let slot = (*s)?;
            u32::try_from(i).ok().map(|raw| (VirtualStackSlot::new(raw), slot))
        })
    }
}

/// Result of stack slot allocation for one function.
#[derive(Clone, Debug)]
pub struct StackAllocation {
    pub assignment: StackSlotAssignment,
    pub intervals: Vec<StackInterval>,
    /// Final frame size in bytes.
    pub frame_size: u32,
}

/// Number `func`, build its stack intervals, assign physical slots and
/// rewrite every virtual slot operand to its slot.
pub fn allocate_stack_slots(
    func: &mut LirFunction,
    frame: &mut FrameMap,
) -> Result<StackAllocation, StackAllocError> {
    func.number_instructions();
    let mut intervals: Vec<StackInterval> = build_intervals(func)?.into_iter().flatten().collect();
    intervals.sort_by_key(|si| (si.from(), si.operand()));

    let mut slots = vec![None; func.num_virtual_slots()];
    let mut active: Vec<(i32, StackSlot)> = Vec::new();
    for si in &mut intervals {
        let start = si.from();
        active.retain(|&(end, slot)| {
            if end < start {
                frame.free_spill_slot(slot);
                false
            } else {
                true
            }
        });
        let slot = frame.allocate_spill_slot(si.kind());
        si.set_location(slot);
        slots[si.operand().index()] = Some(slot);
        active.push((si.to(), slot));
        trace!(interval = %si, "assigned");
    }
    let assignment = StackSlotAssignment { slots };
    verify_assignment(&intervals, &assignment)?;

    rewrite_operands(func, &assignment);
    let frame_size = frame.finish();
    debug!(
        function = %func.name,
        intervals = intervals.len(),
        slots = frame.reserved_slots(),
        frame_size,
        "stack slots allocated"
    );
    Ok(StackAllocation {
        assignment,
        intervals,
        frame_size,
    })
}

/// Check that no two overlapping intervals share a physical slot.
pub fn verify_assignment(
    intervals: &[StackInterval],
    assignment: &StackSlotAssignment,
) -> Result<(), StackAllocError> {
    let mut by_offset: BTreeMap<u32, Vec<&StackInterval>> = BTreeMap::new();
    for si in intervals {
        if let Some(slot) = assignment.get(si.operand()) {
            by_offset.entry(slot.offset).or_default().push(si);
        }
    }
    for (offset, mut sharing) in by_offset {
        sharing.sort_by_key(|si| si.from());
        for pair in sharing.windows(2) {
            if pair[0].overlaps(pair[1]) {
                let kind = pair[1].kind();
                return Err(StackAllocError::SlotConflict {
                    first: pair[0].operand(),
                    second: pair[1].operand(),
                    slot: StackSlot { offset, kind },
                });
            }
        }
    }
    Ok(())
}

fn rewrite_operands(func: &mut LirFunction, assignment: &StackSlotAssignment) {
    let operands = func
        .blocks_mut()
        .iter_mut()
        .flat_map(|b| &mut b.instructions)
        .flat_map(|i| &mut i.operands);
    for op in operands {
        if let LirValue::VirtualSlot(vs) = op.value {
            if let Some(slot) = assignment.get(vs) {
                op.value = LirValue::Stack(slot);
            }
        }
    }
}
