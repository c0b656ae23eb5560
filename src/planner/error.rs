//! Planner error types

use thiserror::Error;

use crate::executor::ErrorCategory;

/// Planner error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlannerError {
    /// Invalid plan structure
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// Unsupported operation
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// None of a group's access patterns is covered by the pushed criteria
    #[error(
        "access patterns not satisfied for {}: one of {} must be referenced in the criteria",
        .groups.join(", "),
        .patterns.join(" or ")
    )]
    UnsatisfiedAccessPattern {
        groups: Vec<String>,
        patterns: Vec<String>,
    },

    #[error("unknown group: {0}")]
    UnknownGroup(String),

    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// Rules kept pushing follow-up rules past the configured cap
    #[error("rule execution limit of {0} exceeded")]
    RuleLimitExceeded(usize),

    /// Internal error
    #[error("internal planner error: {0}")]
    Internal(String),
}

impl PlannerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PlannerError::RuleLimitExceeded(_) | PlannerError::Internal(_) => {
                ErrorCategory::Component
            }
            _ => ErrorCategory::Processing,
        }
    }
}

/// Result type for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;
