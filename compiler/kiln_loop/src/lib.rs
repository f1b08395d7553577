//! Loop analysis for the kiln optimizing compiler.
//!
//! [`LoopsData`] wraps every natural loop of a [`ControlFlowGraph`] in a
//! [`LoopEx`] carrying derived facts: the header's begin node, the basic
//! [`InductionVariable`]s, and the [`CountedLoopInfo`] when the loop has a
//! recognizable trip count. The analysis is computed once per compilation
//! unit and is immutable afterwards.
//!
//! Failing to recognize a pattern is never an error: the loop is just not
//! counted.
//!
//! [`ControlFlowGraph`]: kiln_ir::ControlFlowGraph

mod counted;
mod induction;
mod loop_ex;
mod loops_data;

#[cfg(test)]
mod test_helpers;

pub use counted::{CountedLoopInfo, Direction};
pub use induction::InductionVariable;
pub use loop_ex::LoopEx;
pub use loops_data::LoopsData;
