//! Logical plan builder
//!
//! Resolves commands against metadata and wraps them in access nodes.

use crate::catalog::Metadata;
use crate::sql::{Command, Query};

use super::{AccessSpec, PlanNode};
use crate::planner::error::{PlannerError, PlannerResult};

/// Builder for logical plans
pub struct LogicalPlanBuilder<'a> {
    metadata: &'a dyn Metadata,
}

impl<'a> LogicalPlanBuilder<'a> {
    pub fn new(metadata: &'a dyn Metadata) -> Self {
        Self { metadata }
    }

    /// Access node selecting `columns` of `group`
    pub fn scan(&self, group: &str, columns: &[&str]) -> PlannerResult<PlanNode> {
        let def = self
            .metadata
            .group(group)
            .ok_or_else(|| PlannerError::UnknownGroup(group.to_string()))?;
        let names: Vec<String> = if columns.is_empty() {
            def.columns.iter().map(|c| c.name.clone()).collect()
        } else {
            columns
                .iter()
                .map(|c| {
                    def.get_column(c).map(|col| col.name.clone()).ok_or_else(|| {
                        PlannerError::InvalidPlan(format!("unknown element {}.{}", def.name, c))
                    })
                })
                .collect::<PlannerResult<_>>()?
        };
        self.access(Command::Query(Query::new(def.name.clone(), names)))
    }

    /// Access node for an arbitrary command
    pub fn access(&self, command: Command) -> PlannerResult<PlanNode> {
        let group = command
            .group()
            .ok_or_else(|| PlannerError::InvalidPlan(format!("command has no group: {}", command)))?
            .to_string();
        let def = self
            .metadata
            .group(&group)
            .ok_or_else(|| PlannerError::UnknownGroup(group.clone()))?;
        if self.metadata.model(&def.model).is_none() {
            return Err(PlannerError::UnknownModel(def.model.clone()));
        }
        let columns = match &command {
            Command::Query(q) => q.select.iter().map(|(_, n)| n.clone()).collect(),
            _ => vec!["count".to_string()],
        };
        Ok(PlanNode::Access(AccessSpec {
            group: def.name.clone(),
            model: def.model.clone(),
            source: None,
            command,
            columns,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::test_utils::test_catalog;
    use crate::sql::{Delete, Expr};

    #[test]
    fn test_scan_resolves_model_and_columns() {
        let catalog = test_catalog();
        let builder = LogicalPlanBuilder::new(&catalog);
        match builder.scan("PM.PARTS", &["ID"]).unwrap() {
            PlanNode::Access(spec) => {
                assert_eq!(spec.model, "pm");
                assert_eq!(spec.columns, vec!["id"]);
                assert!(spec.source.is_none());
            }
            other => panic!("expected access, got {:?}", other),
        }
    }

    #[test]
    fn test_scan_all_columns() {
        let catalog = test_catalog();
        let plan = LogicalPlanBuilder::new(&catalog).scan("pm.parts", &[]).unwrap();
        assert_eq!(plan.output_columns(), vec!["id", "name", "qty"]);
    }

    #[test]
    fn test_unknown_group_and_column() {
        let catalog = test_catalog();
        let builder = LogicalPlanBuilder::new(&catalog);
        assert!(matches!(
            builder.scan("nope", &[]),
            Err(PlannerError::UnknownGroup(_))
        ));
        assert!(matches!(
            builder.scan("pm.parts", &["color"]),
            Err(PlannerError::InvalidPlan(_))
        ));
    }

    #[test]
    fn test_update_access_outputs_count() {
        let catalog = test_catalog();
        let plan = LogicalPlanBuilder::new(&catalog)
            .access(Command::Delete(Delete {
                group: "pm.parts".into(),
                criteria: Some(Expr::eq(Expr::column("pm.parts", "id", 0), Expr::int(1))),
            }))
            .unwrap();
        assert_eq!(plan.output_columns(), vec!["count"]);
    }
}
