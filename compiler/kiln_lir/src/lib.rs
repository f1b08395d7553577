//! Linear low-level IR and stack slot allocation for the kiln optimizing
//! compiler.
//!
//! - **LIR** ([`LirFunction`]): blocks of instructions whose operands may
//!   name virtual stack slots.
//! - **Intervals** ([`StackInterval`], [`build_intervals`]): one live range
//!   per virtual stack slot, from a backward liveness scan.
//! - **Allocation** ([`allocate_stack_slots`]): linear scan over the
//!   intervals, reusing [`FrameMap`] slots once their occupant is dead.
//!
//! # Crate Dependencies
//!
//! `kiln_lir` does not depend on the graph IR. Lowering a graph to LIR
//! happens outside this workspace.

pub mod allocator;
pub mod builder;
pub mod frame_map;
pub mod interval;
pub mod lir;

pub use allocator::{allocate_stack_slots, verify_assignment, StackAllocation, StackSlotAssignment};
pub use builder::{build_intervals, compute_slot_liveness, SlotLiveness};
pub use frame_map::{FrameMap, FRAME_ALIGNMENT};
pub use interval::{StackAllocError, StackInterval, UseType};
pub use lir::{
    LirBlock, LirBlockId, LirFunction, LirInstruction, LirKind, LirValue, Operand, OperandFlags,
    OperandMode, StackSlot, VirtualStackSlot,
};
