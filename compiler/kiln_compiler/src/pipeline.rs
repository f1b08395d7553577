//! The per-unit pipeline.
//!
//! ```text
//! verify → canonicalize → CFG + loops → partial escape analysis
//!        → canonicalize → verify → stack slot allocation (if LIR given)
//! ```

use rayon::prelude::*;
use tracing::{debug, error, info_span};

use kiln_ea::EscapeAnalysisStats;
use kiln_ir::{canonicalize, CanonicalizeStats, ControlFlowGraph, Graph, GraphError};
use kiln_lir::{allocate_stack_slots, FrameMap, LirFunction, StackAllocation};
use kiln_loop::LoopsData;

use crate::config::CompilerConfig;
use crate::error::CompilationError;

/// One method to compile: its graph and, optionally, its LIR.
#[derive(Clone, Debug)]
pub struct CompilationUnit {
    pub name: String,
    pub graph: Graph,
    pub lir: Option<LirFunction>,
}

impl CompilationUnit {
    pub fn new(name: impl Into<String>, graph: Graph) -> Self {
        Self {
            name: name.into(),
            graph,
            lir: None,
        }
    }

    #[must_use]
    pub fn with_lir(mut self, lir: LirFunction) -> Self {
        self.lir = Some(lir);
        self
    }
}

/// Loop structure found before escape analysis.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub loops: usize,
    pub counted: usize,
    /// Nesting depth of every loop, outermost first.
    pub depths: Vec<u32>,
    /// Trip counts of the counted loops that have a constant one.
    pub constant_trip_counts: Vec<u64>,
}

impl LoopSummary {
    fn of(loops: &LoopsData) -> Self {
        Self {
            loops: loops.len(),
            counted: loops.counted_loops().len(),
            depths: loops.outermost_first().iter().map(|l| l.depth()).collect(),
            constant_trip_counts: loops
                .counted_loops()
                .iter()
                .filter_map(|l| l.counted().and_then(|c| c.constant_trip_count))
                .collect(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CompiledUnit {
    pub name: String,
    pub graph: Graph,
    pub loops: LoopSummary,
    pub escape_analysis: EscapeAnalysisStats,
    /// Canonicalization totals over both runs.
    pub canonicalize: CanonicalizeStats,
    /// The LIR with physical stack slots, if the unit had LIR.
    pub lir: Option<LirFunction>,
    pub stack: Option<StackAllocation>,
}

/// Run the pipeline on one unit.
pub fn compile_unit(
    unit: CompilationUnit,
    config: &CompilerConfig,
) -> Result<CompiledUnit, CompilationError> {
    let CompilationUnit {
        name,
        mut graph,
        mut lir,
    } = unit;
    let _span = info_span!("compile_unit", unit = %name).entered();

    let graph_err = |source: GraphError| {
        error!(unit = %name, %source, "graph invariant violated; unit aborted");
        CompilationError::InvalidGraph {
            unit: name.clone(),
            source,
        }
    };

    if config.verify_graph {
        graph.verify().map_err(graph_err)?;
    }
    let mut canon = CanonicalizeStats::default();
    if config.canonicalize {
        add_stats(&mut canon, canonicalize(&mut graph).map_err(graph_err)?);
    }

    let cfg = ControlFlowGraph::compute(&graph);
    let loops = LoopsData::compute(&graph, &cfg);
    let loop_summary = LoopSummary::of(&loops);
    let escape_analysis =
        kiln_ea::run(&mut graph, &cfg, &loops, &config.escape_analysis).map_err(graph_err)?;

    if config.canonicalize {
        add_stats(&mut canon, canonicalize(&mut graph).map_err(graph_err)?);
    }
    if config.verify_graph {
        graph.verify().map_err(graph_err)?;
    }

    let stack = match lir.as_mut() {
        Some(func) => {
            let mut frame = FrameMap::new();
            let allocation = allocate_stack_slots(func, &mut frame).map_err(|source| {
                error!(unit = %name, %source, "stack slot allocation failed; unit aborted");
                CompilationError::StackAllocation {
                    unit: name.clone(),
                    source,
                }
            })?;
            Some(allocation)
        }
        None => None,
    };

    debug!(
        loops = loop_summary.loops,
        counted = loop_summary.counted,
        virtualized = escape_analysis.virtualized,
        materialized = escape_analysis.materialized,
        frame_size = stack.as_ref().map(|s| s.frame_size),
        "unit compiled"
    );
    Ok(CompiledUnit {
        name,
        graph,
        loops: loop_summary,
        escape_analysis,
        canonicalize: canon,
        lir,
        stack,
    })
}

/// Compile independent units in parallel. Results keep the input order.
pub fn compile_units(
    units: Vec<CompilationUnit>,
    config: &CompilerConfig,
) -> Vec<Result<CompiledUnit, CompilationError>> {
    units
        .into_par_iter()
        .map(|unit| compile_unit(unit, config))
        .collect()
}

fn add_stats(total: &mut CanonicalizeStats, run: CanonicalizeStats) {
    total.replaced += run.replaced;
    total.removed += run.removed;
}
