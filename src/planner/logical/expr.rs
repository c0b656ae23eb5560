//! Aggregate expressions used by grouping plans

use std::fmt;

use crate::sql::Expr;

/// Supported aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateKind {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateKind::Count => "COUNT",
            AggregateKind::Sum => "SUM",
            AggregateKind::Avg => "AVG",
            AggregateKind::Min => "MIN",
            AggregateKind::Max => "MAX",
        }
    }
}

/// Aggregate function specification
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateFunc {
    pub kind: AggregateKind,
    /// Argument; `None` only for COUNT(*)
    pub arg: Option<Expr>,
    /// Whether DISTINCT is specified
    pub distinct: bool,
}

impl AggregateFunc {
    pub fn new(kind: AggregateKind, arg: Option<Expr>) -> Self {
        Self {
            kind,
            arg,
            distinct: false,
        }
    }

    /// COUNT(*)
    pub fn count_star() -> Self {
        Self::new(AggregateKind::Count, None)
    }

    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let distinct = if self.distinct { "DISTINCT " } else { "" };
        match &self.arg {
            Some(arg) => write!(f, "{}({}{})", self.kind.name(), distinct, arg),
            None => write!(f, "{}(*)", self.kind.name()),
        }
    }
}
