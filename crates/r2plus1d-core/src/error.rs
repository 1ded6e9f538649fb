use thiserror::Error;

/// Error type shared by graph construction, shape inference and configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Unsupported model depth: {0} (expected one of 10, 16, 18, 26, 34)")]
    UnsupportedDepth(u32),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Duplicate node name: {0}")]
    DuplicateName(String),

    #[error("Unknown node id {id} in graph with {len} nodes")]
    UnknownNode { id: usize, len: usize },

    #[error("Shape mismatch in {op}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        op: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Invalid shape for {op}: {reason}")]
    InvalidShape { op: String, reason: String },

    #[error("No input variable named '{0}'")]
    UnknownInput(String),
}

pub type GraphResult<T> = Result<T, GraphError>;
