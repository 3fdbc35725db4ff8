//! Engine error types

use thiserror::Error;

/// Result type for formula compilation and evaluation
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors raised while compiling or evaluating formulas
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed formula text (mismatched parentheses, unrecognized tokens)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid address syntax or a conflicting sheet qualifier
    #[error(transparent)]
    Address(#[from] cellgraph_core::Error),

    /// Function name not present in the registry
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// A specially-handled function invoked with an unsupported argument count
    #[error("Unsupported argument count for {function}: got {actual}")]
    UnsupportedArity { function: String, actual: usize },

    /// Invalid argument during evaluation
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// Reference to a cell or range that is not part of the compiled graph
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// The dependency graph contains a cycle
    #[error("Circular reference involving {0}")]
    CircularReference(String),

    /// Failure while executing a cell's compiled expression, carrying the
    /// offending cell's address and original formula text
    #[error("Error evaluating {address} ({formula}): {source}")]
    Evaluation {
        address: String,
        formula: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Wrap an evaluation failure with the offending cell's address and
    /// formula text. Errors that are already wrapped pass through unchanged.
    pub fn into_evaluation(self, address: &str, formula: &str) -> Self {
        match self {
            err @ EngineError::Evaluation { .. } => err,
            other => EngineError::Evaluation {
                address: address.to_string(),
                formula: formula.to_string(),
                source: Box::new(other),
            },
        }
    }
}
