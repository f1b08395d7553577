//! Graph intermediate representation for the kiln optimizing compiler.
//!
//! This crate provides:
//!
//! - **Host metadata** ([`HostTypes`]): immutable type, field and method
//!   descriptors shared by all compilations.
//!
//! - **Graph & node model** ([`Graph`], [`NodeKind`], [`NodeId`]): an arena of
//!   nodes with bidirectionally consistent inputs and usages, organized into
//!   blocks that begin with a begin node and end with a terminator.
//!
//! - **Control-flow analysis** ([`ControlFlowGraph`], [`Loop`]): predecessors,
//!   dominators, the natural-loop forest and a block order in which every
//!   loop body is contiguous.
//!
//! - **Scheduling** ([`Schedule`]): placement of floating nodes and a
//!   per-block execution order.
//!
//! - **Canonicalization** ([`canonicalize`], [`dead_code_elimination`]).
//!
//! # Crate Dependencies
//!
//! `kiln_ir` is the leaf of the workspace. Loop analysis, escape analysis
//! and the pipeline driver all build on it; the LIR crate does not.

pub mod canonicalize;
pub mod cfg;
pub mod graph;
pub mod meta;
pub mod node;
pub mod schedule;

#[cfg(test)]
mod test_helpers;

pub use canonicalize::{canonicalize, dead_code_elimination, CanonicalizeStats};
pub use cfg::{ControlFlowGraph, Loop, LoopId};
pub use graph::{Graph, GraphError};
pub use meta::{
    FieldDesc, FieldId, HostTypes, MethodDesc, MethodId, StorageKind, TypeDesc, TypeId, ValueKind,
    OBJECT_HEADER_SIZE,
};
pub use node::{
    BinaryOp, BlockId, CompareOp, Constant, DeoptReason, Node, NodeClass, NodeId, NodeKind,
};
pub use schedule::Schedule;
