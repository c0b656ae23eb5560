//! Executor error types
//!
//! Every failure is classified as either a processing error (the request is
//! invalid or the data makes it fail) or a component error (an internal
//! invariant was violated). Blocked is not an error and has no variant here.

use thiserror::Error;

use crate::planner::PlannerError;

use super::NodeId;

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Which party a failure should be reported to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Business or user-input problem
    Processing,
    /// Internal defect or infrastructure failure
    Component,
}

/// Executor errors
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// Type mismatch during evaluation
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Invalid operation (e.g., division by zero)
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Column index out of bounds
    #[error("column index {index} out of bounds (row has {row_len} columns)")]
    ColumnIndexOutOfBounds { index: usize, row_len: usize },

    /// Reference to an unbound procedure variable
    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    /// Lookup of a result register that does not exist
    #[error("unknown result set: {0}")]
    UnknownResultSet(String),

    /// Error raised by procedure logic
    #[error("{0}")]
    Raised(String),

    /// Procedure loop exceeded the configured iteration limit
    #[error("loop exceeded {0} iterations")]
    IterationLimit(usize),

    /// Error reported by a physical source
    #[error("source '{source_name}' failed: {message}")]
    Source {
        source_name: String,
        message: String,
    },

    /// Tuple buffer misuse
    #[error("buffer error: {0}")]
    Buffer(String),

    /// Internal invariant violation attributed to a request and node
    #[error("component error in request {request_id} (node {node_id:?}): {message}")]
    Component {
        request_id: String,
        node_id: Option<NodeId>,
        message: String,
    },

    /// Planning failed
    #[error(transparent)]
    Planner(#[from] PlannerError),
}

impl ExecutorError {
    /// Build a component error for `node_id` within `request_id`
    pub fn component(
        request_id: impl Into<String>,
        node_id: Option<NodeId>,
        message: impl Into<String>,
    ) -> Self {
        ExecutorError::Component {
            request_id: request_id.into(),
            node_id,
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ExecutorError::TypeMismatch(_)
            | ExecutorError::InvalidOperation(_)
            | ExecutorError::UnknownVariable(_)
            | ExecutorError::UnknownResultSet(_)
            | ExecutorError::Raised(_)
            | ExecutorError::IterationLimit(_)
            | ExecutorError::Source { .. } => ErrorCategory::Processing,
            ExecutorError::ColumnIndexOutOfBounds { .. }
            | ExecutorError::Buffer(_)
            | ExecutorError::Component { .. } => ErrorCategory::Component,
            ExecutorError::Planner(e) => e.category(),
        }
    }

    pub fn is_processing(&self) -> bool {
        self.category() == ErrorCategory::Processing
    }
}
