//! Pipeline driver for the kiln optimizing compiler.
//!
//! [`compile_unit`] runs one method's graph through canonicalization, loop
//! analysis and partial escape analysis, then allocates stack slots for its
//! LIR when one is supplied. [`compile_units`] does the same for many
//! independent units on the rayon pool. A failing unit yields a
//! [`CompilationError`] and leaves the others untouched.

mod config;
mod error;
mod pipeline;

use std::sync::Once;

pub use config::CompilerConfig;
pub use error::CompilationError;
pub use pipeline::{compile_unit, compile_units, CompilationUnit, CompiledUnit, LoopSummary};

static TRACING_INIT: Once = Once::new();

/// Install the global tracing subscriber.
///
/// Does nothing unless `RUST_LOG` is set; the filter is taken from it.
/// `KILN_LOG_TREE=1` selects the indented span tree output. Safe to call
/// more than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_err() {
            return;
        }
        let filter = EnvFilter::from_default_env();
        let tree = std::env::var("KILN_LOG_TREE").is_ok_and(|v| v == "1");
        let registry = tracing_subscriber::registry().with(filter);
        if tree {
            registry
                .with(tracing_tree::HierarchicalLayer::new(2).with_targets(true))
                .init();
        } else {
            registry
                .with(fmt::layer().with_target(true).with_level(true))
                .init();
        }
    });
}
