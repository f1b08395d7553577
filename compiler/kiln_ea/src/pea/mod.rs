//! Partial escape analysis.
//!
//! Blocks are visited in the loop-contiguous order of the CFG with one
//! [`PartialEscapeBlockState`] per block. Allocations start out virtual;
//! an object is materialized only at the points where it actually escapes,
//! so it can stay virtual on every other path.
//!
//! A loop body is analyzed under an assumed header state. When the merge of
//! the back edges disagrees with that assumption, the body's effects are
//! dropped and it is analyzed again under the merged state, up to
//! [`EscapeAnalysisConfig::max_loop_iterations`] times.

mod materialize;
mod merge;
mod virtualize;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use kiln_ir::{
    dead_code_elimination, BlockId, ControlFlowGraph, Graph, GraphError, NodeId, Schedule,
};
use kiln_loop::LoopsData;

use crate::effects::{self, Effect};
use crate::state::{ObjectState, PartialEscapeBlockState};
use crate::virtual_object::VirtualShape;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EscapeAnalysisConfig {
    pub enabled: bool,
    /// Analyses of one loop body before virtualization across it is given up.
    pub max_loop_iterations: u32,
    /// Longest array allocation that is virtualized.
    pub max_virtual_array_length: u32,
}

impl Default for EscapeAnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_loop_iterations: 10,
            max_virtual_array_length: 32,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EscapeAnalysisStats {
    /// Original allocations removed from the graph.
    pub virtualized: usize,
    /// Allocations inserted where a virtual object escapes.
    pub materialized: usize,
    /// Loop body analyses, summed over all loops.
    pub loop_iterations: usize,
    /// Loops that did not converge within the iteration cap.
    pub loops_capped: usize,
    /// Nodes removed by the final dead code elimination.
    pub removed_nodes: usize,
    /// The graph was left untouched.
    pub skipped: bool,
}

/// Run partial escape analysis over `graph` and apply its effects.
///
/// `cfg` and `loops` must describe the current block structure of `graph`.
/// Graphs with irreducible control flow are left untouched.
pub fn run(
    graph: &mut Graph,
    cfg: &ControlFlowGraph,
    loops: &LoopsData,
    config: &EscapeAnalysisConfig,
) -> Result<EscapeAnalysisStats, GraphError> {
    let skipped = EscapeAnalysisStats {
        skipped: true,
        ..EscapeAnalysisStats::default()
    };
    if !config.enabled {
        return Ok(skipped);
    }
    if cfg.is_irreducible() {
        warn!("irreducible control flow; escape analysis skipped");
        return Ok(skipped);
    }
    let schedule = Schedule::compute(graph, cfg);
    let mut pea = PartialEscapeAnalysis::new(graph, cfg, loops, &schedule, *config);
    pea.analyze();
    let stats = pea.commit()?;
    debug!(
        virtualized = stats.virtualized,
        materialized = stats.materialized,
        loop_iterations = stats.loop_iterations,
        loops_capped = stats.loops_capped,
        removed = stats.removed_nodes,
        "escape analysis"
    );
    Ok(stats)
}

/// Exit state of one predecessor, with its position among the merge
/// block's CFG predecessors.
#[derive(Clone, Debug)]
pub(crate) struct PredState {
    pub index: usize,
    pub block: BlockId,
    pub state: PartialEscapeBlockState,
}

/// A loop whose body is being analyzed.
struct LoopFrame {
    header: BlockId,
    /// Positions of the header and the last body block in the block order.
    start: usize,
    end: usize,
    iteration: u32,
    header_state: PartialEscapeBlockState,
    forward: Vec<PredState>,
    /// Materializations in the forward predecessors made when the cap hit.
    entry_effects: Vec<Effect>,
    capped: bool,
}

/// Entry key of the phi merging an object's materialized value.
const MATERIALIZED_VALUE: usize = usize::MAX;

pub(crate) struct PartialEscapeAnalysis<'a> {
    graph: &'a mut Graph,
    cfg: &'a ControlFlowGraph,
    loops: &'a LoopsData,
    schedule: &'a Schedule,
    config: EscapeAnalysisConfig,
    /// Phis present before the analysis, per block.
    program_phis: Vec<Vec<NodeId>>,
    /// Virtual node standing for each allocation, reused across iterations.
    virtual_of: FxHashMap<NodeId, NodeId>,
    shapes: FxHashMap<NodeId, VirtualShape>,
    /// `(block, object, entry)` -> phi, so repeated merges converge.
    phi_cache: FxHashMap<(BlockId, NodeId, usize), NodeId>,
    /// `(anchor, object, merge block)` -> allocation.
    allocation_cache: FxHashMap<(NodeId, NodeId, Option<BlockId>), NodeId>,
    end_states: Vec<Option<PartialEscapeBlockState>>,
    block_effects: Vec<Vec<Effect>>,
    merge_effects: Vec<Vec<Effect>>,
    loop_iterations: usize,
    loops_capped: usize,
}

impl<'a> PartialEscapeAnalysis<'a> {
    fn new(
        graph: &'a mut Graph,
        cfg: &'a ControlFlowGraph,
        loops: &'a LoopsData,
        schedule: &'a Schedule,
        config: EscapeAnalysisConfig,
    ) -> Self {
        let num_blocks = graph.num_blocks();
        let program_phis = graph.block_ids().map(|b| graph.phis(b).to_vec()).collect();
        Self {
            graph,
            cfg,
            loops,
            schedule,
            config,
            program_phis,
            virtual_of: FxHashMap::default(),
            shapes: FxHashMap::default(),
            phi_cache: FxHashMap::default(),
            allocation_cache: FxHashMap::default(),
            end_states: vec![None; num_blocks],
            block_effects: vec![Vec::new(); num_blocks],
            merge_effects: vec![Vec::new(); num_blocks],
            loop_iterations: 0,
            loops_capped: 0,
        }
    }

    fn analyze(&mut self) {
        let cfg = self.cfg;
        let order = cfg.block_order();
        let mut frames: Vec<LoopFrame> = Vec::new();
        let mut pos = 0;
        while pos < order.len() {
            let block = order[pos];
            let mut state = match frames.last() {
                Some(frame) if frame.header == block => frame.header_state.clone(),
                _ => match self.enter_loop(block, pos) {
                    Some(frame) => {
                        let state = frame.header_state.clone();
                        frames.push(frame);
                        state
                    }
                    None => self.entry_state(block),
                },
            };
            let mut effects = Vec::new();
            self.process_block(block, &mut state, &mut effects);
            self.block_effects[block.index()] = effects;
            self.end_states[block.index()] = Some(state);
            pos = self.close_loops(&mut frames, pos);
        }
    }

    /// Entry state of a block that is not a loop header.
    fn entry_state(&mut self, block: BlockId) -> PartialEscapeBlockState {
        let cfg = self.cfg;
        let preds = cfg.predecessors(block);
        match preds {
            [] => PartialEscapeBlockState::new(),
            [pred] if self.program_phis[block.index()].is_empty() => self.end_state(*pred),
            _ => {
                let inputs: Vec<PredState> = preds
                    .iter()
                    .enumerate()
                    .map(|(index, &pred)| PredState {
                        index,
                        block: pred,
                        state: self.end_state(pred),
                    })
                    .collect();
                let (state, effects) = self.merge(block, &inputs, true);
                self.merge_effects[block.index()] = effects;
                state
            }
        }
    }

    fn end_state(&self, block: BlockId) -> PartialEscapeBlockState {
        self.end_states[block.index()].clone().unwrap_or_default()
    }

    /// Start analyzing the loop headed by `block`, if it is a header.
    fn enter_loop(&mut self, block: BlockId, pos: usize) -> Option<LoopFrame> {
        let loops = self.loops;
        let ex = loops.loop_for_header(self.graph.begin(block))?;
        let back_edges = &ex.loop_data().back_edges;
        let forward: Vec<PredState> = self
            .cfg
            .predecessors(block)
            .iter()
            .enumerate()
            .filter(|(_, pred)| !back_edges.contains(pred))
            .map(|(index, &pred)| PredState {
                index,
                block: pred,
                state: self.end_state(pred),
            })
            .collect();
        let end = pos + ex.blocks().len() - 1;
        let (header_state, effects) = self.merge(block, &forward, false);
        self.merge_effects[block.index()] = effects;
        self.loop_iterations += 1;
        Some(LoopFrame {
            header: block,
            start: pos,
            end,
            iteration: 1,
            header_state,
            forward,
            entry_effects: Vec::new(),
            capped: false,
        })
    }

    /// Check every loop whose last body block sits at `pos`, innermost
    /// first. Returns the next position to analyze.
    fn close_loops(&mut self, frames: &mut Vec<LoopFrame>, pos: usize) -> usize {
        while let Some(frame) = frames.last_mut() {
            if frame.end != pos {
                break;
            }
            let preds = self.all_pred_states(frame);
            let (merged, effects) = self.merge(frame.header, &preds, true);
            if frame.capped || merged.equivalent_to(&frame.header_state) {
                let mut header_effects = std::mem::take(&mut frame.entry_effects);
                header_effects.extend(effects);
                self.merge_effects[frame.header.index()] = header_effects;
                debug!(
                    header = %frame.header,
                    iterations = frame.iteration,
                    capped = frame.capped,
                    "loop state converged"
                );
                frames.pop();
                continue;
            }

            frame.iteration += 1;
            self.loop_iterations += 1;
            if frame.iteration > self.config.max_loop_iterations {
                self.cap_loop(frame);
            } else {
                frame.header_state = merged;
                self.merge_effects[frame.header.index()] = effects;
            }
            self.discard_body(frame.start, frame.end);
            return frame.start;
        }
        pos + 1
    }

    fn all_pred_states(&self, frame: &LoopFrame) -> Vec<PredState> {
        let mut preds = frame.forward.clone();
        for (index, &pred) in self.cfg.predecessors(frame.header).iter().enumerate() {
            if !preds.iter().any(|p| p.index == index) {
                preds.push(PredState {
                    index,
                    block: pred,
                    state: self.end_state(pred),
                });
            }
        }
        preds.sort_by_key(|p| p.index);
        preds
    }

    /// Give up virtualization across the loop: materialize every object
    /// virtual at entry in the forward predecessors and analyze the body one
    /// last time without scalar aliases.
    fn cap_loop(&mut self, frame: &mut LoopFrame) {
        self.loops_capped += 1;
        debug!(
            header = %frame.header,
            iterations = self.config.max_loop_iterations,
            "loop state did not converge; materializing at loop entry"
        );
        let (entry, _) = self.merge(frame.header, &frame.forward, false);
        let virtual_at_entry: Vec<NodeId> = entry
            .objects()
            .filter(|(_, o)| o.is_virtual())
            .map(|(v, _)| v)
            .collect();

        let mut entry_effects = Vec::new();
        for pred in &mut frame.forward {
            let anchor = self.terminator(pred.block);
            for &object in &virtual_at_entry {
                if pred.state.object(object).is_some_and(ObjectState::is_virtual) {
                    self.materialize(
                        &mut pred.state,
                        object,
                        anchor,
                        Some(frame.header),
                        &mut entry_effects,
                    );
                }
            }
        }
        let (mut state, effects) = self.merge(frame.header, &frame.forward, false);
        state.clear_scalar_aliases();

        let mut header_effects = entry_effects.clone();
        header_effects.extend(effects);
        self.merge_effects[frame.header.index()] = header_effects;
        frame.entry_effects = entry_effects;
        frame.header_state = state;
        frame.capped = true;
    }

    fn discard_body(&mut self, start: usize, end: usize) {
        let cfg = self.cfg;
        let order = cfg.block_order();
        for (offset, &block) in order[start..=end].iter().enumerate() {
            self.block_effects[block.index()].clear();
            self.end_states[block.index()] = None;
            if offset > 0 {
                self.merge_effects[block.index()].clear();
            }
        }
    }

    fn terminator(&self, block: BlockId) -> NodeId {
        self.graph
            .terminator(block)
            .unwrap_or_else(|| self.graph.begin(block))
    }

    fn shape(&self, virtual_node: NodeId) -> Option<&VirtualShape> {
        self.shapes.get(&virtual_node)
    }

    /// Apply the retained effects in block order, then clean up.
    fn commit(self) -> Result<EscapeAnalysisStats, GraphError> {
        let Self {
            graph,
            cfg,
            block_effects,
            merge_effects,
            loop_iterations,
            loops_capped,
            ..
        } = self;
        let lists = cfg.block_order().iter().flat_map(|b| {
            [
                merge_effects[b.index()].as_slice(),
                block_effects[b.index()].as_slice(),
            ]
        });
        let applied = effects::apply(graph, lists)?;
        let removed_nodes = dead_code_elimination(graph)?;
        Ok(EscapeAnalysisStats {
            virtualized: applied.removed_allocations,
            materialized: applied.placed_allocations,
            loop_iterations,
            loops_capped,
            removed_nodes,
            skipped: false,
        })
    }
}
