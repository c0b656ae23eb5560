//! Logical plan representation
//!
//! A `PlanNode` tree describes a command before the optimizer has decided
//! which physical sources serve each access. Rules rewrite the tree; the
//! physical planner then turns it into relational nodes.

pub mod block;
pub mod builder;
pub mod expr;

pub use block::{Block, Statement};
pub use builder::LogicalPlanBuilder;
pub use expr::{AggregateFunc, AggregateKind};

use crate::catalog::SourceBinding;
use crate::sql::{Command, Expr, JoinType};

/// A command sent to one model
#[derive(Debug, Clone, PartialEq)]
pub struct AccessSpec {
    /// Group the command targets
    pub group: String,
    /// Model owning the group
    pub model: String,
    /// Physical source; bound by source planning
    pub source: Option<SourceBinding>,
    pub command: Command,
    /// Output element names
    pub columns: Vec<String>,
}

/// Logical plan node
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    /// Command pushed to a source
    Access(AccessSpec),

    /// Filter rows
    Select {
        input: Box<PlanNode>,
        criteria: Expr,
    },

    /// Compute output expressions
    Project {
        input: Box<PlanNode>,
        /// (expression, output name)
        expressions: Vec<(Expr, String)>,
    },

    Join {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        join_type: JoinType,
        condition: Option<Expr>,
    },

    /// Concatenate inputs in order
    UnionAll {
        inputs: Vec<PlanNode>,
        columns: Vec<String>,
    },

    Sort {
        input: Box<PlanNode>,
        /// (expression, ascending)
        order_by: Vec<(Expr, bool)>,
    },

    /// Grouping with aggregates
    Group {
        input: Box<PlanNode>,
        group_by: Vec<(Expr, String)>,
        aggregates: Vec<(AggregateFunc, String)>,
    },

    Limit {
        input: Box<PlanNode>,
        limit: Option<u64>,
        offset: u64,
    },

    /// Remove duplicate rows
    DupRemove { input: Box<PlanNode> },

    /// Produces no rows
    Null { columns: Vec<String> },

    /// Several updates against one source sent as one request
    BatchedUpdate {
        model: String,
        source: SourceBinding,
        commands: Vec<Command>,
    },
}

impl PlanNode {
    /// Output element names of this node
    pub fn output_columns(&self) -> Vec<String> {
        match self {
            PlanNode::Access(spec) => spec.columns.clone(),
            PlanNode::Select { input, .. }
            | PlanNode::Sort { input, .. }
            | PlanNode::Limit { input, .. }
            | PlanNode::DupRemove { input } => input.output_columns(),
            PlanNode::Project { expressions, .. } => {
                expressions.iter().map(|(_, n)| n.clone()).collect()
            }
            PlanNode::Join { left, right, .. } => {
                let mut cols = left.output_columns();
                cols.extend(right.output_columns());
                cols
            }
            PlanNode::UnionAll { columns, .. } | PlanNode::Null { columns } => columns.clone(),
            PlanNode::Group {
                group_by,
                aggregates,
                ..
            } => group_by
                .iter()
                .map(|(_, n)| n.clone())
                .chain(aggregates.iter().map(|(_, n)| n.clone()))
                .collect(),
            PlanNode::BatchedUpdate { .. } => vec!["count".to_string()],
        }
    }

    /// Direct children
    pub fn children(&self) -> Vec<&PlanNode> {
        match self {
            PlanNode::Access(_) | PlanNode::Null { .. } | PlanNode::BatchedUpdate { .. } => {
                vec![]
            }
            PlanNode::Select { input, .. }
            | PlanNode::Project { input, .. }
            | PlanNode::Sort { input, .. }
            | PlanNode::Group { input, .. }
            | PlanNode::Limit { input, .. }
            | PlanNode::DupRemove { input } => vec![input],
            PlanNode::Join { left, right, .. } => vec![left, right],
            PlanNode::UnionAll { inputs, .. } => inputs.iter().collect(),
        }
    }

    /// Rebuild the tree bottom-up; `f` sees each node after its children
    /// were rewritten. The first error aborts the rewrite.
    pub fn try_transform<E>(
        self,
        f: &mut dyn FnMut(PlanNode) -> Result<PlanNode, E>,
    ) -> Result<PlanNode, E> {
        let rebuilt = match self {
            PlanNode::Select { input, criteria } => PlanNode::Select {
                input: Box::new(input.try_transform(f)?),
                criteria,
            },
            PlanNode::Project { input, expressions } => PlanNode::Project {
                input: Box::new(input.try_transform(f)?),
                expressions,
            },
            PlanNode::Join {
                left,
                right,
                join_type,
                condition,
            } => PlanNode::Join {
                left: Box::new(left.try_transform(f)?),
                right: Box::new(right.try_transform(f)?),
                join_type,
                condition,
            },
            PlanNode::UnionAll { inputs, columns } => PlanNode::UnionAll {
                inputs: inputs
                    .into_iter()
                    .map(|i| i.try_transform(f))
                    .collect::<Result<_, E>>()?,
                columns,
            },
            PlanNode::Sort { input, order_by } => PlanNode::Sort {
                input: Box::new(input.try_transform(f)?),
                order_by,
            },
            PlanNode::Group {
                input,
                group_by,
                aggregates,
            } => PlanNode::Group {
                input: Box::new(input.try_transform(f)?),
                group_by,
                aggregates,
            },
            PlanNode::Limit {
                input,
                limit,
                offset,
            } => PlanNode::Limit {
                input: Box::new(input.try_transform(f)?),
                limit,
                offset,
            },
            PlanNode::DupRemove { input } => PlanNode::DupRemove {
                input: Box::new(input.try_transform(f)?),
            },
            leaf => leaf,
        };
        f(rebuilt)
    }

    /// Infallible form of `try_transform`
    pub fn transform(self, f: &mut dyn FnMut(PlanNode) -> PlanNode) -> PlanNode {
        match self.try_transform::<std::convert::Infallible>(&mut |n| Ok(f(n))) {
            Ok(node) => node,
            Err(never) => match never {},
        }
    }

    /// Visit every node, parents before children
    pub fn visit<E>(&self, f: &mut dyn FnMut(&PlanNode) -> Result<(), E>) -> Result<(), E> {
        f(self)?;
        for child in self.children() {
            child.visit(f)?;
        }
        Ok(())
    }

    /// Number of nodes in the tree
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(|c| c.node_count()).sum::<usize>()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PlanNode::Null { .. })
    }

    // ============ Builder helpers ============

    #[must_use]
    pub fn select(self, criteria: Expr) -> PlanNode {
        PlanNode::Select {
            input: Box::new(self),
            criteria,
        }
    }

    #[must_use]
    pub fn project(self, expressions: Vec<(Expr, String)>) -> PlanNode {
        PlanNode::Project {
            input: Box::new(self),
            expressions,
        }
    }

    #[must_use]
    pub fn join(self, right: PlanNode, join_type: JoinType, condition: Option<Expr>) -> PlanNode {
        PlanNode::Join {
            left: Box::new(self),
            right: Box::new(right),
            join_type,
            condition,
        }
    }

    #[must_use]
    pub fn sort(self, order_by: Vec<(Expr, bool)>) -> PlanNode {
        PlanNode::Sort {
            input: Box::new(self),
            order_by,
        }
    }

    #[must_use]
    pub fn group(
        self,
        group_by: Vec<(Expr, String)>,
        aggregates: Vec<(AggregateFunc, String)>,
    ) -> PlanNode {
        PlanNode::Group {
            input: Box::new(self),
            group_by,
            aggregates,
        }
    }

    #[must_use]
    pub fn limit(self, limit: Option<u64>, offset: u64) -> PlanNode {
        PlanNode::Limit {
            input: Box::new(self),
            limit,
            offset,
        }
    }

    #[must_use]
    pub fn dup_remove(self) -> PlanNode {
        PlanNode::DupRemove {
            input: Box::new(self),
        }
    }

    /// Union of `inputs`; output names come from the first input
    pub fn union_all(inputs: Vec<PlanNode>) -> PlanNode {
        let columns = inputs
            .first()
            .map(|i| i.output_columns())
            .unwrap_or_default();
        PlanNode::UnionAll { inputs, columns }
    }
}

/// Input to the optimizer
#[derive(Debug, Clone)]
pub enum LogicalCommand {
    /// A relational query or single update
    Query(PlanNode),
    /// A procedure body
    Procedure(Block),
    /// Independent update commands executed in order
    BatchedUpdate(Vec<Command>),
}
