//! Partial escape analysis for the kiln optimizing compiler.
//!
//! Allocations are tracked as virtual objects whose fields live in
//! per-block [`PartialEscapeBlockState`]s. Loads and stores on a virtual
//! object become scalar values, and an object is only materialized on the
//! paths where it escapes. Control-flow merges reconcile predecessor states
//! with phis, and loops are iterated until their header state is stable.
//!
//! The analysis records [`Effect`]s instead of editing the graph, so loop
//! iterations can be thrown away. Effects are applied in one pass once
//! the whole graph has been analyzed.

pub mod effects;
mod pea;
pub mod state;
pub mod virtual_object;

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "tests use unwrap to panic on unexpected state")]
mod test_helpers;

pub use effects::Effect;
pub use pea::{run, EscapeAnalysisConfig, EscapeAnalysisStats};
pub use state::{EffectsBlockState, ObjectState, PartialEscapeBlockState};
pub use virtual_object::VirtualShape;
