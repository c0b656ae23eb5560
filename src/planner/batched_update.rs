//! Batched update planning
//!
//! Groups consecutive update commands that target the same single-source
//! model into one batched request when the source supports it. Every other
//! command becomes its own access. The resulting plan yields one update
//! count per input command, in input order: a multi-source command sums the
//! counts of the sources it fans out to, and counts 0 when every source is
//! pruned.

use tracing::debug;

use crate::catalog::{CapabilitiesFinder, Metadata};
use crate::sql::{Command, Expr};

use super::error::{PlannerError, PlannerResult};
use super::logical::{AggregateFunc, AggregateKind, LogicalPlanBuilder, PlanNode};

/// Plans a list of independent update commands
pub struct BatchedUpdatePlanner;

impl BatchedUpdatePlanner {
    pub fn plan(
        commands: Vec<Command>,
        metadata: &dyn Metadata,
        capabilities: &dyn CapabilitiesFinder,
    ) -> PlannerResult<PlanNode> {
        let count = vec!["count".to_string()];
        if let Some(query) = commands.iter().find(|c| !c.is_update()) {
            return Err(PlannerError::InvalidPlan(format!(
                "batched update contains a query: {}",
                query
            )));
        }
        if commands.is_empty() {
            return Ok(PlanNode::Null { columns: count });
        }

        let builder = LogicalPlanBuilder::new(metadata);
        let mut units = Vec::new();
        let mut run: Vec<Command> = Vec::new();
        let mut run_model: Option<String> = None;

        for command in commands {
            let model = batchable_model(&command, metadata, capabilities);
            if model.is_some() && model == run_model {
                run.push(command);
                continue;
            }
            Self::flush(&mut run, run_model.take(), &builder, metadata, &mut units)?;
            run_model = model;
            run.push(command);
        }
        Self::flush(&mut run, run_model, &builder, metadata, &mut units)?;

        Ok(match units.len() {
            1 => units.remove(0),
            _ => PlanNode::UnionAll {
                inputs: units,
                columns: count,
            },
        })
    }

    /// Turn the pending run into plan units
    fn flush(
        run: &mut Vec<Command>,
        model: Option<String>,
        builder: &LogicalPlanBuilder<'_>,
        metadata: &dyn Metadata,
        units: &mut Vec<PlanNode>,
    ) -> PlannerResult<()> {
        let commands = std::mem::take(run);
        match model {
            Some(model) if commands.len() > 1 => {
                let source = metadata
                    .model(&model)
                    .and_then(|m| m.primary_source())
                    .cloned()
                    .ok_or_else(|| PlannerError::UnknownModel(model.clone()))?;
                debug!(model = %model, commands = commands.len(), "batching updates");
                units.push(PlanNode::BatchedUpdate {
                    model,
                    source,
                    commands,
                });
            }
            _ => {
                for command in commands {
                    let multi_source = is_multi_source(&command, metadata);
                    let access = builder.access(command)?;
                    units.push(if multi_source {
                        summed_count(access)
                    } else {
                        access
                    });
                }
            }
        }
        Ok(())
    }
}

fn is_multi_source(command: &Command, metadata: &dyn Metadata) -> bool {
    command
        .group()
        .and_then(|g| metadata.model_for_group(g))
        .is_some_and(|m| m.multi_source)
}

/// One count row for an access that may fan out to any number of sources
///
/// The global SUM survives an access pruned to Null and yields NULL there,
/// hence the COALESCE.
fn summed_count(access: PlanNode) -> PlanNode {
    let group = match &access {
        PlanNode::Access(spec) => spec.group.clone(),
        _ => String::new(),
    };
    let sum = AggregateFunc::new(AggregateKind::Sum, Some(Expr::column(group.as_str(), "count", 0)));
    access
        .group(Vec::new(), vec![(sum, "count".to_string())])
        .project(vec![(
            Expr::Function {
                name: "COALESCE".to_string(),
                args: vec![Expr::column(group, "count", 0), Expr::int(0)],
            },
            "count".to_string(),
        )])
}

/// Model name if `command` may join a batch
fn batchable_model(
    command: &Command,
    metadata: &dyn Metadata,
    capabilities: &dyn CapabilitiesFinder,
) -> Option<String> {
    let model = metadata.model_for_group(command.group()?)?;
    if model.multi_source || !capabilities.find_capabilities(&model.name).supports_batched_updates {
        return None;
    }
    Some(model.name.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::test_utils::{test_capabilities, test_catalog};
    use crate::sql::{Delete, Expr, Query, Update};

    fn delete(group: &str, id: i64) -> Command {
        Command::Delete(Delete {
            group: group.into(),
            criteria: Some(Expr::eq(Expr::column(group, "id", 0), Expr::int(id))),
        })
    }

    fn plan(commands: Vec<Command>) -> PlannerResult<PlanNode> {
        BatchedUpdatePlanner::plan(commands, &test_catalog(), &test_capabilities())
    }

    #[test]
    fn test_consecutive_commands_batched() {
        let plan = plan(vec![delete("pm.parts", 1), delete("pm.parts", 2)]).unwrap();
        match plan {
            PlanNode::BatchedUpdate {
                model,
                source,
                commands,
            } => {
                assert_eq!(model, "pm");
                assert_eq!(source.name, "pm");
                assert_eq!(commands.len(), 2);
            }
            other => panic!("expected batched update, got {:?}", other),
        }
    }

    #[test]
    fn test_runs_split_by_model() {
        let update = Command::Update(Update {
            group: "legacy.orders".into(),
            assignments: vec![("customer".into(), Expr::string("x"))],
            criteria: None,
        });
        let plan = plan(vec![
            delete("pm.parts", 1),
            delete("pm.parts", 2),
            update.clone(),
            update,
            delete("pm.parts", 3),
        ])
        .unwrap();
        let PlanNode::UnionAll { inputs, columns } = plan else {
            panic!("expected union");
        };
        assert_eq!(columns, vec!["count"]);
        let kinds: Vec<&str> = inputs
            .iter()
            .map(|n| match n {
                PlanNode::BatchedUpdate { .. } => "batch",
                PlanNode::Access(_) => "access",
                _ => "other",
            })
            .collect();
        // legacy does not support batching
        assert_eq!(kinds, vec!["batch", "access", "access", "access"]);
    }

    #[test]
    fn test_multi_source_never_batched() {
        let plan = plan(vec![delete("ms.items", 1), delete("ms.items", 2)]).unwrap();
        let PlanNode::UnionAll { inputs, .. } = plan else {
            panic!("expected union");
        };
        assert_eq!(inputs.len(), 2);
        for input in &inputs {
            // one summed count per command, whatever the fan-out
            let PlanNode::Project { input, expressions } = input else {
                panic!("expected project, got {:?}", input);
            };
            assert_eq!(expressions[0].1, "count");
            assert!(matches!(
                input.as_ref(),
                PlanNode::Group { input, group_by, .. }
                    if group_by.is_empty() && matches!(input.as_ref(), PlanNode::Access(_))
            ));
        }
    }

    #[test]
    fn test_query_rejected() {
        let err = plan(vec![Command::Query(Query::new("pm.parts", ["id"]))]).unwrap_err();
        assert!(matches!(err, PlannerError::InvalidPlan(_)));
    }

    #[test]
    fn test_empty_is_null() {
        assert!(plan(Vec::new()).unwrap().is_null());
    }
}
