//! Building stack intervals from LIR liveness.
//!
//! Liveness of virtual stack slots is a backward dataflow problem over the
//! LIR blocks:
//!
//! - `live_out(B) = ∪ live_in(S)` over the successors `S`,
//! - `live_in(B) = gen(B) ∪ (live_out(B) - kill(B))`,
//!
//! iterated until nothing changes. Each block is then walked backwards:
//! slots live out extend to the block's write position, defs and uses are
//! recorded at their op ids, and slots live in extend to the block start.

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::interval::{StackAllocError, StackInterval};
use crate::lir::{LirBlock, LirFunction, OperandMode, VirtualStackSlot};

pub type LiveSet = FxHashSet<VirtualStackSlot>;

/// Virtual stack slots live at block boundaries, indexed by block.
pub struct SlotLiveness {
    pub live_in: Vec<LiveSet>,
    pub live_out: Vec<LiveSet>,
}

pub fn compute_slot_liveness(func: &LirFunction) -> SlotLiveness {
    let blocks = func.blocks();
    let (gen, kill): (Vec<LiveSet>, Vec<LiveSet>) = blocks.iter().map(gen_kill).unzip();

    let mut live_in = vec![LiveSet::default(); blocks.len()];
    let mut live_out = vec![LiveSet::default(); blocks.len()];
    let mut iterations = 0u32;
    loop {
        iterations += 1;
        let mut changed = false;
        for (b, block) in blocks.iter().enumerate().rev() {
            let mut out = LiveSet::default();
            for succ in &block.successors {
                out.extend(live_in[succ.index()].iter().copied());
            }
            let mut inn = gen[b].clone();
            inn.extend(out.iter().copied().filter(|s| !kill[b].contains(s)));
            if inn != live_in[b] || out != live_out[b] {
                live_in[b] = inn;
                live_out[b] = out;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    debug!(function = %func.name, iterations, "stack slot liveness converged");
    SlotLiveness { live_in, live_out }
}

/// Slots read before being written in `block`, and slots written in it.
fn gen_kill(block: &LirBlock) -> (LiveSet, LiveSet) {
    let mut gen = LiveSet::default();
    let mut kill = LiveSet::default();
    for instruction in &block.instructions {
        for op in &instruction.operands {
            let Some(slot) = op.virtual_slot() else { continue };
            if matches!(op.mode, OperandMode::Use | OperandMode::Alive) && !kill.contains(&slot) {
                gen.insert(slot);
            }
        }
        for op in &instruction.operands {
            let Some(slot) = op.virtual_slot() else { continue };
            if matches!(op.mode, OperandMode::Def | OperandMode::Temp) {
                kill.insert(slot);
            }
        }
    }
    (gen, kill)
}

/// One interval per virtual stack slot that occurs in `func`, indexed by
/// slot. The function must already be numbered.
pub fn build_intervals(func: &LirFunction) -> Result<Vec<Option<StackInterval>>, StackAllocError> {
    let liveness = compute_slot_liveness(func);
    let mut intervals: Vec<Option<StackInterval>> = vec![None; func.num_virtual_slots()];

    for (b, block) in func.blocks().iter().enumerate().rev() {
        let (Some(first), Some(last)) = (block.first_op_id(), block.last_op_id()) else {
            continue;
        };
        for &slot in &liveness.live_out[b] {
            interval_of(&mut intervals, func, slot).add_to(last + 1);
        }
        for instruction in block.instructions.iter().rev() {
            let id = instruction.id;
            for op in &instruction.operands {
                let Some(slot) = op.virtual_slot() else { continue };
                let si = interval_of(&mut intervals, func, slot);
                match op.mode {
                    OperandMode::Def | OperandMode::Temp => si.add_def(id),
                    OperandMode::Use => si.add_use(id),
                    OperandMode::Alive => {
                        si.add_to(id + 1);
                        si.add_use(id);
                    }
                }
            }
        }
        for &slot in &liveness.live_in[b] {
            interval_of(&mut intervals, func, slot).add_from(first);
        }
    }

    let max_op_id = func.max_op_id();
    for si in intervals.iter_mut().flatten() {
        si.fix_from();
        si.verify(max_op_id)?;
    }
    Ok(intervals)
}

fn interval_of<'a>(
    intervals: &'a mut [Option<StackInterval>],
    func: &LirFunction,
    slot: VirtualStackSlot,
) -> &'a mut StackInterval {
    intervals[slot.index()].get_or_insert_with(|| StackInterval::new(slot, func.slot_kind(slot)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "tests use unwrap to panic on unexpected state")]
mod tests;
