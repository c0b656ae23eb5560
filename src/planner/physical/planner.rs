//! Physical planner
//!
//! Converts logical plans into relational node trees.

use crate::executor::access::AccessNode;
use crate::executor::aggregate::GroupingNode;
use crate::executor::batched_update::BatchedUpdateNode;
use crate::executor::distinct::DupRemoveNode;
use crate::executor::filter::SelectNode;
use crate::executor::join::JoinNode;
use crate::executor::limit::LimitNode;
use crate::executor::null::NullNode;
use crate::executor::project::ProjectNode;
use crate::executor::sort::SortNode;
use crate::executor::union::UnionAllNode;
use crate::executor::RelationalNode;
use crate::planner::error::{PlannerError, PlannerResult};
use crate::planner::logical::PlanNode;

use super::NodeIdAllocator;

/// Physical planner - converts logical plans to relational nodes
pub struct PhysicalPlanner;

impl PhysicalPlanner {
    /// Convert a logical plan into a node tree
    pub fn plan(logical: PlanNode) -> PlannerResult<Box<dyn RelationalNode>> {
        Self::plan_node(logical, &mut NodeIdAllocator::new())
    }

    fn plan_node(
        logical: PlanNode,
        ids: &mut NodeIdAllocator,
    ) -> PlannerResult<Box<dyn RelationalNode>> {
        let id = ids.next_id();
        let node: Box<dyn RelationalNode> = match logical {
            PlanNode::Access(spec) => {
                let source = spec.source.ok_or_else(|| {
                    PlannerError::Internal(format!("access to {} has no source", spec.group))
                })?;
                Box::new(AccessNode::new(
                    id,
                    spec.columns,
                    spec.model,
                    source.name,
                    source.connector,
                    spec.command,
                ))
            }

            PlanNode::Select { input, criteria } => {
                Box::new(SelectNode::new(id, Self::plan_node(*input, ids)?, criteria))
            }

            PlanNode::Project { input, expressions } => {
                Box::new(ProjectNode::new(id, Self::plan_node(*input, ids)?, expressions))
            }

            PlanNode::Join {
                left,
                right,
                join_type,
                condition,
            } => {
                let left = Self::plan_node(*left, ids)?;
                let right = Self::plan_node(*right, ids)?;
                Box::new(JoinNode::new(id, left, right, join_type, condition))
            }

            PlanNode::UnionAll { inputs, columns } => {
                let children = inputs
                    .into_iter()
                    .map(|i| Self::plan_node(i, ids))
                    .collect::<PlannerResult<Vec<_>>>()?;
                Box::new(UnionAllNode::new(id, columns, children))
            }

            PlanNode::Sort { input, order_by } => {
                Box::new(SortNode::new(id, Self::plan_node(*input, ids)?, order_by))
            }

            PlanNode::Group {
                input,
                group_by,
                aggregates,
            } => Box::new(GroupingNode::new(
                id,
                Self::plan_node(*input, ids)?,
                group_by,
                aggregates,
            )),

            PlanNode::Limit {
                input,
                limit,
                offset,
            } => Box::new(LimitNode::new(id, Self::plan_node(*input, ids)?, limit, offset)),

            PlanNode::DupRemove { input } => {
                Box::new(DupRemoveNode::new(id, Self::plan_node(*input, ids)?))
            }

            PlanNode::Null { columns } => Box::new(NullNode::new(id, columns)),

            PlanNode::BatchedUpdate {
                model,
                source,
                commands,
            } => Box::new(BatchedUpdateNode::new(
                id,
                model,
                source.name,
                source.connector,
                commands,
            )),
        };
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SourceBinding;
    use crate::planner::logical::AccessSpec;
    use crate::sql::{Command, Expr, Query};

    fn bound_access(source: &str) -> PlanNode {
        PlanNode::Access(AccessSpec {
            group: "ms.items".into(),
            model: "ms".into(),
            source: Some(SourceBinding::new(source, "mem")),
            command: Command::Query(Query::new("ms.items", ["id"])),
            columns: vec!["id".into()],
        })
    }

    fn ids(node: &dyn RelationalNode, out: &mut Vec<u32>) {
        out.push(node.id());
        for child in node.children() {
            ids(child, out);
        }
    }

    #[test]
    fn test_pre_order_ids() {
        let plan = PlanNode::union_all(vec![bound_access("a"), bound_access("b")])
            .select(Expr::eq(Expr::column("ms.items", "id", 0), Expr::int(1)))
            .limit(Some(3), 0);
        let root = PhysicalPlanner::plan(plan).unwrap();
        let mut seen = Vec::new();
        ids(root.as_ref(), &mut seen);
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert_eq!(root.name(), "Limit");
        assert_eq!(root.output_columns(), ["id".to_string()]);
    }

    #[test]
    fn test_unbound_access_is_internal_error() {
        let plan = PlanNode::Access(AccessSpec {
            group: "pm.parts".into(),
            model: "pm".into(),
            source: None,
            command: Command::Query(Query::new("pm.parts", ["id"])),
            columns: vec!["id".into()],
        });
        let err = PhysicalPlanner::plan(plan).err().unwrap();
        assert!(matches!(err, PlannerError::Internal(_)));
    }

    #[test]
    fn test_batched_update_outputs_count() {
        let plan = PlanNode::BatchedUpdate {
            model: "pm".into(),
            source: SourceBinding::new("pm", "mem"),
            commands: Vec::new(),
        };
        let root = PhysicalPlanner::plan(plan).unwrap();
        assert_eq!(root.name(), "BatchedUpdate");
        assert_eq!(root.output_columns(), ["count".to_string()]);
    }
}
