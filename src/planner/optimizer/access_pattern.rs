//! Access pattern validation
//!
//! A group that declares access patterns may only be accessed with criteria
//! that mention every element of at least one pattern. This runs after
//! criteria pushdown, so only criteria the source actually receives count.

use std::collections::HashSet;

use crate::catalog::AccessPattern;
use crate::sql::rewriter::conjuncts;
use crate::sql::Command;

use super::{OptimizerRule, RuleContext, RuleStack};
use crate::planner::error::{PlannerError, PlannerResult};
use crate::planner::logical::PlanNode;

/// Rejects accesses whose criteria satisfy none of the group's patterns
pub struct ValidateAccessPatterns;

impl OptimizerRule for ValidateAccessPatterns {
    fn name(&self) -> &'static str {
        "validate_access_patterns"
    }

    fn execute(
        &self,
        plan: PlanNode,
        ctx: &RuleContext<'_>,
        _rules: &mut RuleStack,
    ) -> PlannerResult<PlanNode> {
        plan.visit(&mut |node| match node {
            PlanNode::Access(spec) => validate(&spec.command, ctx),
            PlanNode::BatchedUpdate { commands, .. } => {
                commands.iter().try_for_each(|c| validate(c, ctx))
            }
            _ => Ok(()),
        })?;
        Ok(plan)
    }
}

fn validate(command: &Command, ctx: &RuleContext<'_>) -> PlannerResult<()> {
    if let Command::Batched(commands) = command {
        return commands.iter().try_for_each(|c| validate(c, ctx));
    }
    let Some(group) = command.group() else {
        return Ok(());
    };
    let patterns = ctx.metadata.access_patterns(group);
    if patterns.is_empty() {
        return Ok(());
    }
    let referenced = referenced_elements(command);
    if patterns.iter().any(|p| is_satisfied(p, &referenced)) {
        return Ok(());
    }
    Err(PlannerError::UnsatisfiedAccessPattern {
        groups: vec![group.to_string()],
        patterns: patterns.iter().map(ToString::to_string).collect(),
    })
}

/// Lowercase names of the elements a command constrains
fn referenced_elements(command: &Command) -> HashSet<String> {
    match command {
        Command::Insert(insert) => insert.columns.iter().map(|c| c.to_lowercase()).collect(),
        other => other
            .criteria()
            .map(|criteria| {
                conjuncts(criteria)
                    .into_iter()
                    .flat_map(|c| c.columns())
                    .map(|col| col.name.to_lowercase())
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn is_satisfied(pattern: &AccessPattern, referenced: &HashSet<String>) -> bool {
    pattern
        .columns
        .iter()
        .all(|c| referenced.contains(&c.to_lowercase()))
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
    use crate::sql::{Expr, Insert, Query};

    fn check(command: Command) -> PlannerResult<PlanNode> {
        let catalog = test_catalog();
        let caps = test_capabilities();
        let dm: Arc<dyn DataManager> = ScriptedDataManager::new(Vec::new());
        let ctx = CommandContext::new("ap", "tester", dm);
        let rule_ctx = RuleContext {
            metadata: &catalog,
            capabilities: &caps,
            command: &ctx,
        };
        let plan = LogicalPlanBuilder::new(&catalog).access(command)?;
        ValidateAccessPatterns.execute(plan, &rule_ctx, &mut RuleStack::new())
    }

    fn lookup(criteria: Expr) -> Command {
        Command::Query(Query::new("pm.lookup", ["colx", "coly"]).with_criteria(criteria))
    }

    fn colx() -> Expr {
        Expr::column("pm.lookup", "colx", 0)
    }

    fn coly() -> Expr {
        Expr::column("pm.lookup", "coly", 1)
    }

    #[test]
    fn test_missing_pattern_element_fails() {
        let err = check(lookup(Expr::eq(coly(), Expr::int(1)))).unwrap_err();
        assert_eq!(
            err,
            PlannerError::UnsatisfiedAccessPattern {
                groups: vec!["pm.lookup".into()],
                patterns: vec!["{colx}".into()],
            }
        );
        assert!(err.to_string().contains("{colx}"));
    }

    #[test]
    fn test_pattern_satisfied_by_conjunct() {
        let criteria = Expr::and(Expr::eq(colx(), Expr::int(1)), Expr::eq(coly(), Expr::int(1)));
        assert!(check(lookup(criteria)).is_ok());
    }

    #[test]
    fn test_no_criteria_fails() {
        let command = Command::Query(Query::new("pm.lookup", ["colx"]));
        assert!(matches!(
            check(command),
            Err(PlannerError::UnsatisfiedAccessPattern { .. })
        ));
    }

    #[test]
    fn test_unrestricted_group_passes() {
        let command = Command::Query(Query::new("pm.parts", ["id"]));
        assert!(check(command).is_ok());
    }

    #[test]
    fn test_insert_supplying_pattern_passes() {
        let insert = Command::Insert(Insert {
            group: "pm.lookup".into(),
            columns: vec!["COLX".into()],
            values: vec![vec![Expr::int(1)]],
        });
        assert!(check(insert).is_ok());
    }
}
