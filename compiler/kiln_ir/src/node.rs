//! Node kinds and the per-node payload stored in the graph arena.
//!
//! Every operation is one [`NodeKind`] variant. Inputs are kept positionally
//! in [`Node::inputs`]; the comment on each variant documents the input
//! layout. The four [`NodeClass`]es split the variants into the capabilities
//! the passes care about:
//!
//! - **Control**: block begins and terminators; they shape the CFG.
//! - **Fixed**: side-effecting operations with a position inside a block.
//! - **Floating**: pure values; the [`Schedule`](crate::Schedule) places them.
//! - **Virtual**: placeholders for allocations removed by escape analysis.

use std::fmt;

use smallvec::SmallVec;

use crate::meta::{FieldId, MethodId, StorageKind, TypeId, ValueKind};

// ── ID newtypes ─────────────────────────────────────────────────────

/// Stable index of a node in the graph arena.
///
/// IDs are never reused: a killed node leaves a hole in the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
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

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Basic block index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
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

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

// ── Constants and operators ─────────────────────────────────────────

/// A compile-time constant. Floating-point values are stored as raw bits so
/// constants can be hashed and uniqued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(u32),
    Double(u64),
    Null,
}

impl Constant {
    /// The zero value a freshly allocated slot of `kind` holds.
    pub fn default_for(kind: StorageKind) -> Self {
        match kind.stack_kind() {
            ValueKind::Long => Constant::Long(0),
            ValueKind::Float => Constant::Float(0),
            ValueKind::Double => Constant::Double(0),
            ValueKind::Object => Constant::Null,
            ValueKind::Int | ValueKind::Void => Constant::Int(0),
        }
    }

    pub fn value_kind(self) -> ValueKind {
        match self {
            Constant::Int(_) => ValueKind::Int,
            Constant::Long(_) => ValueKind::Long,
            Constant::Float(_) => ValueKind::Float,
            Constant::Double(_) => ValueKind::Double,
            Constant::Null => ValueKind::Object,
        }
    }

    /// Integer payload widened to `i64`, for `Int` and `Long` constants.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Constant::Int(v) => Some(i64::from(v)),
            Constant::Long(v) => Some(v),
            _ => None,
        }
    }

    /// Build an integer constant of `kind` from a wide value (truncating for `Int`).
    pub fn from_i64(kind: ValueKind, value: i64) -> Option<Self> {
        match kind {
            ValueKind::Int => {
                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "Int arithmetic wraps at 32 bits"
                )]
                let narrowed = value as i32;
                Some(Constant::Int(narrowed))
            }
            ValueKind::Long => Some(Constant::Long(value)),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl BinaryOp {
    /// Evaluate on 64-bit operands. Shifts mask the distance like the JVM.
    pub fn evaluate(self, x: i64, y: i64, kind: ValueKind) -> i64 {
        let mask = if kind == ValueKind::Int { 31 } else { 63 };
        #[expect(
            clippy::cast_sign_loss,
            clippy::cast_possible_truncation,
            reason = "masked shift distance"
        )]
        let shift = (y & mask) as u32;
        match self {
            BinaryOp::Add => x.wrapping_add(y),
            BinaryOp::Sub => x.wrapping_sub(y),
            BinaryOp::Mul => x.wrapping_mul(y),
            BinaryOp::And => x & y,
            BinaryOp::Or => x | y,
            BinaryOp::Xor => x ^ y,
            BinaryOp::Shl => x.wrapping_shl(shift),
            BinaryOp::Shr => x.wrapping_shr(shift),
        }
    }
}

/// Signed integer comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// `!(x op y)` as `x op' y`.
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Le => CompareOp::Gt,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Ge => CompareOp::Lt,
        }
    }

    /// `x op y` as `y op' x`.
    pub fn mirror(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::Ne => CompareOp::Ne,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
        }
    }

    pub fn evaluate(self, x: i64, y: i64) -> bool {
        match self {
            CompareOp::Eq => x == y,
            CompareOp::Ne => x != y,
            CompareOp::Lt => x < y,
            CompareOp::Le => x <= y,
            CompareOp::Gt => x > y,
            CompareOp::Ge => x >= y,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeoptReason {
    NullCheck,
    BoundsCheck,
    TypeCheck,
    UnreachedCode,
}

// ── Node kinds ──────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeClass {
    Control,
    Fixed,
    Floating,
    Virtual,
}

/// One operation in the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    // ── Block begins (control, no inputs) ───────────────────────
    /// Begin of the entry block.
    Start,
    /// Begin of an ordinary block (single predecessor or merge).
    Begin,
    /// Begin of a loop header block.
    LoopBegin,

    // ── Terminators (control) ───────────────────────────────────
    Goto { target: BlockId },
    /// Inputs: `[condition]`. Branches on `condition != 0`.
    If {
        true_target: BlockId,
        false_target: BlockId,
    },
    /// Inputs: `[]` or `[value]`.
    Return,
    /// Inputs: the frame values the interpreter needs to resume, followed by
    /// any [`NodeKind::VirtualObjectState`] describing virtual frame values.
    Deoptimize { reason: DeoptReason },

    // ── Fixed operations ────────────────────────────────────────
    NewInstance { ty: TypeId },
    /// Inputs: `[length]`.
    NewArray { elem: StorageKind },
    /// Inputs: `[object]`.
    LoadField { field: FieldId },
    /// Inputs: `[object, value]`.
    StoreField { field: FieldId },
    /// Inputs: `[array, index]`.
    LoadIndexed { elem: StorageKind },
    /// Inputs: `[array, index, value]`.
    StoreIndexed { elem: StorageKind },
    /// Inputs: `[array]`.
    ArrayLength,
    /// Inputs: `[object]`.
    MonitorEnter,
    /// Inputs: `[object]`.
    MonitorExit,
    /// Opaque call. Inputs: the arguments.
    Invoke { target: MethodId },

    // ── Floating values ─────────────────────────────────────────
    Constant(Constant),
    Parameter { index: u32, kind: ValueKind },
    /// Inputs: one value per predecessor of `block`, in CFG predecessor order.
    Phi { block: BlockId, kind: ValueKind },
    /// Inputs: `[x, y]`.
    Binary(BinaryOp),
    /// Inputs: `[x, y]`. Produces `Int` 0 or 1.
    Compare(CompareOp),
    /// Inputs: `[object]`. Produces `Int` 0 or 1.
    IsNull,
    /// Reference identity. Inputs: `[x, y]`. Produces `Int` 0 or 1.
    ObjectEquals,
    /// Inputs: `[condition, true_value, false_value]`.
    Conditional,

    // ── Virtual objects ─────────────────────────────────────────
    VirtualInstance { ty: TypeId },
    VirtualArray { elem: StorageKind, length: u32 },
    /// Deoptimization description of a virtual object.
    /// Inputs: `[virtual_object, entry_0, .., entry_n]`.
    VirtualObjectState { lock_count: u32 },
}

impl NodeKind {
    pub fn class(self) -> NodeClass {
        match self {
            NodeKind::Start
            | NodeKind::Begin
            | NodeKind::LoopBegin
            | NodeKind::Goto { .. }
            | NodeKind::If { .. }
            | NodeKind::Return
            | NodeKind::Deoptimize { .. } => NodeClass::Control,

            NodeKind::NewInstance { .. }
            | NodeKind::NewArray { .. }
            | NodeKind::LoadField { .. }
            | NodeKind::StoreField { .. }
            | NodeKind::LoadIndexed { .. }
            | NodeKind::StoreIndexed { .. }
            | NodeKind::ArrayLength
            | NodeKind::MonitorEnter
            | NodeKind::MonitorExit
            | NodeKind::Invoke { .. } => NodeClass::Fixed,

            NodeKind::Constant(_)
            | NodeKind::Parameter { .. }
            | NodeKind::Phi { .. }
            | NodeKind::Binary(_)
            | NodeKind::Compare(_)
            | NodeKind::IsNull
            | NodeKind::ObjectEquals
            | NodeKind::Conditional => NodeClass::Floating,

            NodeKind::VirtualInstance { .. }
            | NodeKind::VirtualArray { .. }
            | NodeKind::VirtualObjectState { .. } => NodeClass::Virtual,
        }
    }

    /// Fixed and control nodes live in a block's node list.
    #[inline]
    pub fn is_scheduled_in_block(self) -> bool {
        matches!(self.class(), NodeClass::Control | NodeClass::Fixed)
    }

    #[inline]
    pub fn is_block_begin(self) -> bool {
        matches!(self, NodeKind::Start | NodeKind::Begin | NodeKind::LoopBegin)
    }

    #[inline]
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            NodeKind::Goto { .. }
                | NodeKind::If { .. }
                | NodeKind::Return
                | NodeKind::Deoptimize { .. }
        )
    }

    #[inline]
    pub fn is_allocation(self) -> bool {
        matches!(self, NodeKind::NewInstance { .. } | NodeKind::NewArray { .. })
    }

    /// Virtual object placeholders (not their deoptimization states).
    #[inline]
    pub fn is_virtual_object(self) -> bool {
        matches!(
            self,
            NodeKind::VirtualInstance { .. } | NodeKind::VirtualArray { .. }
        )
    }

    /// Successor blocks of a terminator; empty for every other kind.
    pub fn successors(self) -> SmallVec<[BlockId; 2]> {
        match self {
            NodeKind::Goto { target } => smallvec::smallvec![target],
            NodeKind::If {
                true_target,
                false_target,
            } => smallvec::smallvec![true_target, false_target],
            _ => SmallVec::new(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Start => "Start",
            NodeKind::Begin => "Begin",
            NodeKind::LoopBegin => "LoopBegin",
            NodeKind::Goto { .. } => "Goto",
            NodeKind::If { .. } => "If",
            NodeKind::Return => "Return",
            NodeKind::Deoptimize { .. } => "Deoptimize",
            NodeKind::NewInstance { .. } => "NewInstance",
            NodeKind::NewArray { .. } => "NewArray",
            NodeKind::LoadField { .. } => "LoadField",
            NodeKind::StoreField { .. } => "StoreField",
            NodeKind::LoadIndexed { .. } => "LoadIndexed",
            NodeKind::StoreIndexed { .. } => "StoreIndexed",
            NodeKind::ArrayLength => "ArrayLength",
            NodeKind::MonitorEnter => "MonitorEnter",
            NodeKind::MonitorExit => "MonitorExit",
            NodeKind::Invoke { .. } => "Invoke",
            NodeKind::Constant(_) => "Constant",
            NodeKind::Parameter { .. } => "Parameter",
            NodeKind::Phi { .. } => "Phi",
            NodeKind::Binary(_) => "Binary",
            NodeKind::Compare(_) => "Compare",
            NodeKind::IsNull => "IsNull",
            NodeKind::ObjectEquals => "ObjectEquals",
            NodeKind::Conditional => "Conditional",
            NodeKind::VirtualInstance { .. } => "VirtualInstance",
            NodeKind::VirtualArray { .. } => "VirtualArray",
            NodeKind::VirtualObjectState { .. } => "VirtualObjectState",
        }
    }
}

// ── Node payload ────────────────────────────────────────────────────

/// A live node in the arena.
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) inputs: SmallVec<[NodeId; 4]>,
    /// One entry per input edge pointing at this node (a multiset).
    pub(crate) usages: SmallVec<[NodeId; 4]>,
    pub(crate) value_kind: ValueKind,
    /// Block for fixed/control nodes that have been placed.
    pub(crate) block: Option<BlockId>,
}

impl Node {
    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    #[inline]
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    #[inline]
    pub fn usages(&self) -> &[NodeId] {
        &self.usages
    }

    #[inline]
    pub fn value_kind(&self) -> ValueKind {
        self.value_kind
    }

    #[inline]
    pub fn block(&self) -> Option<BlockId> {
        self.block
    }
}
