use kiln_ir::{BlockId, ControlFlowGraph, Graph, Loop, LoopId, NodeId};

use crate::counted::{self, CountedLoopInfo};
use crate::induction::{self, InductionVariable};

/// A CFG loop together with the facts derived from it.
#[derive(Clone, Debug)]
pub struct LoopEx {
    raw: Loop,
    begin: NodeId,
    induction_variables: Vec<InductionVariable>,
    counted: Option<CountedLoopInfo>,
}

impl LoopEx {
    pub(crate) fn analyze(graph: &Graph, cfg: &ControlFlowGraph, raw: Loop) -> Self {
        let begin = graph.begin(raw.header);
        let induction_variables = induction::find_induction_variables(graph, cfg, &raw);
        let counted = counted::recognize(graph, &raw, &induction_variables);
        Self {
            raw,
            begin,
            induction_variables,
            counted,
        }
    }

    #[inline]
    pub fn id(&self) -> LoopId {
        self.raw.id
    }

    /// The raw CFG loop record.
    #[inline]
    pub fn loop_data(&self) -> &Loop {
        &self.raw
    }

    #[inline]
    pub fn header(&self) -> BlockId {
        self.raw.header
    }

    /// The begin node of the header block.
    #[inline]
    pub fn begin(&self) -> NodeId {
        self.begin
    }

    #[inline]
    pub fn depth(&self) -> u32 {
        self.raw.depth
    }

    #[inline]
    pub fn parent(&self) -> Option<LoopId> {
        self.raw.parent
    }

    #[inline]
    pub fn blocks(&self) -> &[BlockId] {
        &self.raw.blocks
    }

    #[inline]
    pub fn contains(&self, block: BlockId) -> bool {
        self.raw.contains(block)
    }

    #[inline]
    pub fn induction_variables(&self) -> &[InductionVariable] {
        &self.induction_variables
    }

    #[inline]
    pub fn counted(&self) -> Option<&CountedLoopInfo> {
        self.counted.as_ref()
    }

    #[inline]
    pub fn is_counted(&self) -> bool {
        self.counted.is_some()
    }
}
