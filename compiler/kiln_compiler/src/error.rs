use kiln_ir::GraphError;
use kiln_lir::StackAllocError;
use thiserror::Error;

/// Why one compilation unit was abandoned. Other units are unaffected.
#[derive(Debug, Error)]
pub enum CompilationError {
    #[error("invalid graph in `{unit}`: {source}")]
    InvalidGraph {
        unit: String,
        #[source]
        source: GraphError,
    },
    #[error("stack slot allocation failed in `{unit}`: {source}")]
    StackAllocation {
        unit: String,
        #[source]
        source: StackAllocError,
    },
}

impl CompilationError {
    pub fn unit(&self) -> &str {
        match self {
            CompilationError::InvalidGraph { unit, .. }
            | CompilationError::StackAllocation { unit, .. } => unit,
        }
    }
}
