//! Source planning
//!
//! Binds every access to a physical source. Accesses against a
//! multi-source model are fanned out to one access per source, in
//! declaration order, with the model's discriminator element replaced by
//! the source name. Sources whose rewritten command provably selects
//! nothing are dropped.

use tracing::debug;

use crate::catalog::SourceBinding;
use crate::sql::rewriter::{is_false_criteria, selects_nothing, simplify, simplify_command};
use crate::sql::{Command, Expr, Insert, Literal};

use super::{OptimizerRule, RuleConstant, RuleContext, RuleStack};
use crate::planner::error::{PlannerError, PlannerResult};
use crate::planner::logical::{AccessSpec, PlanNode};

/// Multi-source fan-out
pub struct PlanSources;

impl OptimizerRule for PlanSources {
    fn name(&self) -> &'static str {
        "plan_sources"
    }

    fn execute(
        &self,
        plan: PlanNode,
        ctx: &RuleContext<'_>,
        rules: &mut RuleStack,
    ) -> PlannerResult<PlanNode> {
        let mut pruned = false;
        let plan = plan.try_transform(&mut |node| match node {
            PlanNode::Access(spec) if spec.source.is_none() => {
                let planned = plan_access(spec, ctx)?;
                pruned |= planned.is_null();
                Ok(planned)
            }
            other => Ok(other),
        })?;
        if pruned {
            rules.push(RuleConstant::RaiseNull);
        }
        Ok(plan)
    }
}

fn plan_access(mut spec: AccessSpec, ctx: &RuleContext<'_>) -> PlannerResult<PlanNode> {
    let model = ctx
        .metadata
        .model(&spec.model)
        .ok_or_else(|| PlannerError::UnknownModel(spec.model.clone()))?;

    if !model.multi_source {
        let source = model
            .primary_source()
            .cloned()
            .ok_or_else(|| PlannerError::InvalidPlan(format!("model {} has no source", model.name)))?;
        spec.source = Some(source);
        return Ok(PlanNode::Access(spec));
    }

    let discriminator = model
        .discriminator
        .clone()
        .unwrap_or_else(|| ctx.command.config().source_discriminator.clone());

    let mut accesses = Vec::with_capacity(model.sources.len());
    for binding in &model.sources {
        let command = command_for_source(&spec.command, &discriminator, binding);
        if selects_nothing(&command) {
            debug!(
                request_id = ctx.command.request_id(),
                model = %model.name,
                source = %binding.name,
                "source eliminated"
            );
            continue;
        }
        accesses.push(PlanNode::Access(AccessSpec {
            group: spec.group.clone(),
            model: spec.model.clone(),
            source: Some(binding.clone()),
            command,
            columns: spec.columns.clone(),
        }));
    }

    Ok(match accesses.len() {
        0 => PlanNode::Null {
            columns: spec.columns,
        },
        1 => accesses.remove(0),
        _ => PlanNode::UnionAll {
            inputs: accesses,
            columns: spec.columns,
        },
    })
}

/// Copy of `command` specialised to one source
pub fn command_for_source(command: &Command, discriminator: &str, source: &SourceBinding) -> Command {
    let value = Literal::String(source.name.clone());
    let mut copy = match command {
        Command::Insert(insert) => Command::Insert(route_insert(insert, discriminator, &value)),
        other => other.clone(),
    };
    copy.transform_exprs(&mut |e| match e {
        Expr::Column(col) if col.is_named(discriminator) => Expr::Literal(value.clone()),
        other => other,
    });
    simplify_command(&mut copy);
    copy
}

/// Keep the rows addressed to `source` and drop the discriminator column;
/// an insert without the discriminator goes to every source
fn route_insert(insert: &Insert, discriminator: &str, source: &Literal) -> Insert {
    let Some(pos) = insert
        .columns
        .iter()
        .position(|c| c.eq_ignore_ascii_case(discriminator))
    else {
        return insert.clone();
    };
    let mut columns = insert.columns.clone();
    columns.remove(pos);
    let values = insert
        .values
        .iter()
        .filter(|row| {
            row.get(pos).map_or(true, |value| {
                let test = Expr::eq(value.clone(), Expr::Literal(source.clone()));
                !is_false_criteria(&simplify(test))
            })
        })
        .map(|row| {
            let mut row = row.clone();
            if pos < row.len() {
                row.remove(pos);
            }
            row
        })
        .collect();
    Insert {
        group: insert.group.clone(),
        columns,
        values,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::datamgr::DataManager;
    use crate::executor::test_utils::ScriptedDataManager;
    use crate::executor::CommandContext;
    use crate::planner::logical::LogicalPlanBuilder;
    use crate::planner::test_utils::{test_capabilities, test_catalog};
    use crate::sql::{BinaryOp, Query, Update};

    fn run(plan: PlanNode) -> (PlannerResult<PlanNode>, RuleStack) {
        let catalog = test_catalog();
        let caps = test_capabilities();
        let dm: Arc<dyn DataManager> = ScriptedDataManager::new(Vec::new());
        let command = CommandContext::new("fanout", "tester", dm);
        let ctx = RuleContext {
            metadata: &catalog,
            capabilities: &caps,
            command: &command,
        };
        let mut stack = RuleStack::new();
        let plan = PlanSources.execute(plan, &ctx, &mut stack);
        (plan, stack)
    }

    fn items(criteria: Option<Expr>) -> PlanNode {
        let catalog = test_catalog();
        let mut query = Query::new("ms.items", ["id", "SOURCE_NAME"]);
        query.criteria = criteria;
        LogicalPlanBuilder::new(&catalog)
            .access(Command::Query(query))
            .unwrap()
    }

    fn source_col() -> Expr {
        Expr::column("ms.items", "SOURCE_NAME", 1)
    }

    fn sources(plan: &PlanNode) -> Vec<String> {
        let mut out = Vec::new();
        let _ = plan.visit::<()>(&mut |n| {
            if let PlanNode::Access(spec) = n {
                out.push(spec.source.as_ref().map(|s| s.name.clone()).unwrap_or_default());
            }
            Ok(())
        });
        out
    }

    #[test]
    fn test_fan_out_eliminates_source() {
        let criteria = Expr::binary(source_col(), BinaryOp::NotEq, Expr::string("b"));
        let (plan, stack) = run(items(Some(criteria)));
        let plan = plan.unwrap();
        assert!(matches!(plan, PlanNode::UnionAll { .. }));
        assert_eq!(sources(&plan), vec!["a", "c"]);
        assert!(stack.is_empty());

        if let PlanNode::UnionAll { inputs, .. } = &plan {
            match &inputs[0] {
                PlanNode::Access(spec) => {
                    assert_eq!(spec.command.to_string(), "SELECT id, 'a' FROM ms.items")
                }
                other => panic!("expected access, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_fan_out_to_single_source() {
        let criteria = Expr::eq(source_col(), Expr::string("c"));
        let (plan, _) = run(items(Some(criteria)));
        let plan = plan.unwrap();
        assert!(matches!(plan, PlanNode::Access(_)));
        assert_eq!(sources(&plan), vec!["c"]);
    }

    #[test]
    fn test_fan_out_to_no_source() {
        let criteria = Expr::eq(source_col(), Expr::string("z"));
        let (plan, stack) = run(items(Some(criteria)));
        assert!(plan.unwrap().is_null());
        assert!(stack.contains(RuleConstant::RaiseNull));
    }

    #[test]
    fn test_unprovable_criteria_keeps_every_source() {
        let criteria = Expr::or(
            Expr::eq(source_col(), Expr::string("a")),
            Expr::eq(Expr::column("ms.items", "id", 0), Expr::int(3)),
        );
        let (plan, _) = run(items(Some(criteria)));
        assert_eq!(sources(&plan.unwrap()), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_single_source_binding() {
        let catalog = test_catalog();
        let plan = LogicalPlanBuilder::new(&catalog).scan("pm.parts", &[]).unwrap();
        let (plan, _) = run(plan);
        assert_eq!(sources(&plan.unwrap()), vec!["pm"]);
    }

    #[test]
    fn test_update_fan_out() {
        let catalog = test_catalog();
        let update = Command::Update(Update {
            group: "ms.items".into(),
            assignments: vec![("name".into(), Expr::string("x"))],
            criteria: Some(Expr::in_list(
                source_col(),
                vec![Expr::string("a"), Expr::string("b")],
            )),
        });
        let plan = LogicalPlanBuilder::new(&catalog).access(update).unwrap();
        let (plan, _) = run(plan);
        assert_eq!(sources(&plan.unwrap()), vec!["a", "b"]);
    }

    #[test]
    fn test_insert_routed_by_discriminator() {
        let insert = Insert {
            group: "ms.items".into(),
            columns: vec!["id".into(), "SOURCE_NAME".into()],
            values: vec![
                vec![Expr::int(1), Expr::string("a")],
                vec![Expr::int(2), Expr::string("c")],
            ],
        };
        let routed = command_for_source(
            &Command::Insert(insert),
            "source_name",
            &SourceBinding::new("c", "mem"),
        );
        match routed {
            Command::Insert(i) => {
                assert_eq!(i.columns, vec!["id"]);
                assert_eq!(i.values, vec![vec![Expr::int(2)]]);
            }
            other => panic!("expected insert, got {}", other),
        }
    }
}
