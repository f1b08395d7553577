//! Live range of one virtual stack slot.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;
use tracing::trace;

use crate::lir::{LirKind, StackSlot, VirtualStackSlot};

const INVALID_START: i32 = i32::MAX;
const INVALID_END: i32 = i32::MIN;

/// How an instruction touches a stack slot at a use position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UseType {
    /// The slot is read.
    Use,
    /// The slot is written.
    Def,
}

/// Failures of stack slot allocation; each one aborts the unit.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StackAllocError {
    /// An interval bound lies outside the numbered instructions.
    #[error("interval of {slot} is [{from}, {to}], outside [0, {max_op_id} + 1]")]
    IntervalOutOfRange {
        slot: VirtualStackSlot,
        from: i32,
        to: i32,
        max_op_id: i32,
    },
    /// Two live-at-once slots were given the same frame location.
    #[error("{first} and {second} overlap but share {slot}")]
    SlotConflict {
        first: VirtualStackSlot,
        second: VirtualStackSlot,
        slot: StackSlot,
    },
}

/// The `[from, to]` op id range over which a virtual stack slot is live.
///
/// Bounds start at sentinels and only ever widen. Use positions are kept
/// for dumps; allocation looks at the range alone.
#[derive(Clone, Debug)]
pub struct StackInterval {
    operand: VirtualStackSlot,
    kind: LirKind,
    from: i32,
    to: i32,
    use_positions: BTreeMap<i32, UseType>,
    location: Option<StackSlot>,
}

impl StackInterval {
    /// An empty interval; both bounds are unset.
    pub fn new(operand: VirtualStackSlot, kind: LirKind) -> Self {
        Self {
            operand,
            kind,
            from: INVALID_START,
            to: INVALID_END,
            use_positions: BTreeMap::new(),
            location: None,
        }
    }

    pub fn operand(&self) -> VirtualStackSlot {
        self.operand
    }

    pub fn kind(&self) -> LirKind {
        self.kind
    }

    pub fn from(&self) -> i32 {
        self.from
    }

    pub fn to(&self) -> i32 {
        self.to
    }

    /// Frame slot assigned by the allocator.
    pub fn location(&self) -> Option<StackSlot> {
        self.location
    }

    pub fn set_location(&mut self, location: StackSlot) {
        self.location = Some(location);
    }

    pub fn use_positions(&self) -> &BTreeMap<i32, UseType> {
        &self.use_positions
    }

    /// Record a read at `op_id`. A later record at the same position
    /// replaces this one.
    pub fn add_use(&mut self, op_id: i32) {
        self.add_to(op_id);
        trace!(slot = %self.operand, op_id, "use");
        self.use_positions.insert(op_id, UseType::Use);
    }

    /// Record a write at `op_id`. A later record at the same position
    /// replaces this one.
    pub fn add_def(&mut self, op_id: i32) {
        self.add_from(op_id);
        trace!(slot = %self.operand, op_id, "def");
        self.use_positions.insert(op_id, UseType::Def);
    }

    /// Raise `to` to `op_id` if it is not already past it.
    pub fn add_to(&mut self, op_id: i32) {
        if op_id >= self.to {
            self.to = op_id;
        }
    }

    /// Lower `from` to `op_id`. Also sets `to` if nothing set it yet, so a
    /// dead def still yields an interval of length zero.
    pub fn add_from(&mut self, op_id: i32) {
        if self.from > op_id {
            self.from = op_id;
            if self.to == INVALID_END {
                self.to = op_id;
            }
        }
    }

    /// A slot never defined is live from the start of the unit.
    pub fn fix_from(&mut self) {
        if self.from == INVALID_START {
            self.from = 0;
        }
    }

    /// Live from the start of the unit.
    pub fn is_fixed(&self) -> bool {
        self.from == 0
    }

    /// `max_op_id + 1` is the write position at the end of the last block.
    pub fn verify(&self, max_op_id: i32) -> Result<(), StackAllocError> {
        if self.from >= 0 && self.to <= max_op_id + 1 {
            return Ok(());
        }
        Err(StackAllocError::IntervalOutOfRange {
            slot: self.operand,
            from: self.from,
            to: self.to,
            max_op_id,
        })
    }

    /// Whether the closed ranges of `self` and `other` intersect.
    pub fn overlaps(&self, other: &StackInterval) -> bool {
        self.from <= other.to && other.from <= self.to
    }
}

impl fmt::Display for StackInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SI[{}-{}] k={:?} o={}", self.from, self.to, self.kind, self.operand)?;
        match self.location {
            Some(slot) => write!(f, " l={slot}"),
            None => write!(f, " l=-"),
        }
    }
}
