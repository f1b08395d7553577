//! Linear low-level IR.
//!
//! A [`LirFunction`] is a list of blocks of [`LirInstruction`]s. Operands
//! name registers, immediates, virtual stack slots or physical stack slots;
//! the stack slot allocator replaces every virtual slot with a physical one.
//!
//! Instructions carry an op id assigned by
//! [`LirFunction::number_instructions`]: `0, 2, 4, ...` in block order. The
//! odd position after an instruction is its write position.

use std::fmt;

use bitflags::bitflags;
use smallvec::SmallVec;

// ── ID newtypes ─────────────────────────────────────────────────────

/// LIR block index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct LirBlockId(u32);

impl LirBlockId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LirBlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A stack slot that has not been given a frame offset yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct VirtualStackSlot(u32);

impl VirtualStackSlot {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VirtualStackSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vstack:{}", self.0)
    }
}

// ── Kinds and slots ─────────────────────────────────────────────────

/// Machine-level kind of a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LirKind {
    Byte,
    Word,
    DWord,
    QWord,
    Single,
    Double,
    /// A heap reference; slots holding one are visible to the GC.
    Reference,
}

impl LirKind {
    /// Bytes a spill slot of this kind occupies; also its alignment.
    pub fn size_in_bytes(self) -> u32 {
        match self {
            LirKind::Byte => 1,
            LirKind::Word => 2,
            LirKind::DWord | LirKind::Single => 4,
            LirKind::QWord | LirKind::Double | LirKind::Reference => 8,
        }
    }

    pub fn is_reference(self) -> bool {
        self == LirKind::Reference
    }
}

/// A slot at a fixed offset in the frame's spill area.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StackSlot {
    pub offset: u32,
    pub kind: LirKind,
}

impl fmt::Display for StackSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stack:{}|{:?}", self.offset, self.kind)
    }
}

// ── Operands ────────────────────────────────────────────────────────

/// How an instruction accesses an operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperandMode {
    /// Read at the start of the instruction.
    Use,
    /// Read, and must stay intact until the instruction's outputs are written.
    Alive,
    /// Scratch storage clobbered by the instruction.
    Temp,
    /// Written by the instruction.
    Def,
}

bitflags! {
    /// Locations an operand position accepts.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct OperandFlags: u8 {
        const REG = 1 << 0;
        const STACK = 1 << 1;
        const CONST = 1 << 2;
        /// The operand may be left undefined on some paths.
        const UNINITIALIZED = 1 << 3;
        /// Allocation hint only; the value is not read.
        const HINT = 1 << 4;
    }
}

/// Where an operand's value lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LirValue {
    Register(u16),
    Immediate(i64),
    VirtualSlot(VirtualStackSlot),
    Stack(StackSlot),
}

/// One operand of an instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Operand {
    pub value: LirValue,
    pub mode: OperandMode,
    pub flags: OperandFlags,
}

impl Operand {
    /// An operand with explicit flags.
    pub fn new(mode: OperandMode, value: LirValue, flags: OperandFlags) -> Self {
        Self { value, mode, flags }
    }

    /// A virtual stack slot operand accepting a stack location.
    pub fn slot(mode: OperandMode, slot: VirtualStackSlot) -> Self {
        Self::new(mode, LirValue::VirtualSlot(slot), OperandFlags::STACK)
    }

    /// A physical register operand.
    pub fn register(mode: OperandMode, reg: u16) -> Self {
        Self::new(mode, LirValue::Register(reg), OperandFlags::REG)
    }

    /// A constant input.
    pub fn immediate(value: i64) -> Self {
        Self::new(OperandMode::Use, LirValue::Immediate(value), OperandFlags::CONST)
    }

    /// The virtual stack slot this operand names, if any.
    pub fn virtual_slot(&self) -> Option<VirtualStackSlot> {
        match self.value {
            LirValue::VirtualSlot(slot) => Some(slot),
            _ => None,
        }
    }
}

// ── Instructions and blocks ─────────────────────────────────────────

/// A named instruction and its operands.
#[derive(Clone, Debug)]
pub struct LirInstruction {
    /// Mnemonic, for dumps and tests.
    pub name: &'static str,
    pub operands: SmallVec<[Operand; 4]>,
    /// Op id; `-1` until the function is numbered.
    pub id: i32,
}

impl LirInstruction {
    /// An unnumbered instruction.
    pub fn new(name: &'static str, operands: impl IntoIterator<Item = Operand>) -> Self {
        Self {
            name,
            operands: operands.into_iter().collect(),
            id: -1,
        }
    }
}

/// Straight-line instructions plus the CFG edges leaving them.
#[derive(Clone, Debug, Default)]
pub struct LirBlock {
    pub instructions: Vec<LirInstruction>,
    pub successors: SmallVec<[LirBlockId; 2]>,
}

impl LirBlock {
    /// Op id of the first instruction; `None` for an empty block.
    pub fn first_op_id(&self) -> Option<i32> {
        self.instructions.first().map(|i| i.id)
    }

    pub fn last_op_id(&self) -> Option<i32> {
        self.instructions.last().map(|i| i.id)
    }
}

/// The LIR of one compilation unit.
#[derive(Clone, Debug)]
pub struct LirFunction {
    pub name: String,
    blocks: Vec<LirBlock>,
    /// Kind of every virtual stack slot, indexed by `VirtualStackSlot::index`.
    slot_kinds: Vec<LirKind>,
}

impl LirFunction {
    /// An empty function with no blocks or slots.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: Vec::new(),
            slot_kinds: Vec::new(),
        }
    }

    /// Append an empty block.
    #[expect(clippy::cast_possible_truncation, reason = "block count fits in u32")]
    pub fn add_block(&mut self) -> LirBlockId {
        self.blocks.push(LirBlock::default());
        LirBlockId::new((self.blocks.len() - 1) as u32)
    }

    /// Allocate a virtual stack slot of `kind`.
    #[expect(clippy::cast_possible_truncation, reason = "slot count fits in u32")]
    pub fn new_virtual_slot(&mut self, kind: LirKind) -> VirtualStackSlot {
        self.slot_kinds.push(kind);
        VirtualStackSlot::new((self.slot_kinds.len() - 1) as u32)
    }

    /// Append `instruction` to `block`.
    pub fn push(&mut self, block: LirBlockId, instruction: LirInstruction) {
        self.blocks[block.index()].instructions.push(instruction);
    }

    /// Record a control-flow edge `from -> to`.
    pub fn add_edge(&mut self, from: LirBlockId, to: LirBlockId) {
        self.blocks[from.index()].successors.push(to);
    }

    pub fn block(&self, block: LirBlockId) -> &LirBlock {
        &self.blocks[block.index()]
    }

    pub fn blocks(&self) -> &[LirBlock] {
        &self.blocks
    }

    pub(crate) fn blocks_mut(&mut self) -> &mut [LirBlock] {
        &mut self.blocks
    }

    pub fn num_virtual_slots(&self) -> usize {
        self.slot_kinds.len()
    }

    /// Kind the slot was created with.
    pub fn slot_kind(&self, slot: VirtualStackSlot) -> LirKind {
        self.slot_kinds[slot.index()]
    }

    /// Assign op ids `0, 2, 4, ...` in block order. Returns the highest id,
    /// or 0 for a function without instructions.
    pub fn number_instructions(&mut self) -> i32 {
        let mut next = 0;
        let mut max = 0;
        for instruction in self.blocks.iter_mut().flat_map(|b| &mut b.instructions) {
            instruction.id = next;
            max = next;
            next += 2;
        }
        max
    }

    /// Highest op id, as assigned by the last numbering.
    pub fn max_op_id(&self) -> i32 {
        self.blocks
            .iter()
            .rev()
            .find_map(LirBlock::last_op_id)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests;
