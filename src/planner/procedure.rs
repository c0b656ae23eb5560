//! Procedure planning
//!
//! Compiles a statement block into a program. Every relational statement is
//! optimized on its own into a nested plan.

use crate::planner::error::{PlannerError, PlannerResult};
use crate::planner::logical::{Block, PlanNode, Statement};
use crate::planner::optimizer::{Optimizer, RuleContext};
use crate::procedure::{Instruction, Program, ProcedurePlan};

/// Compiles procedure blocks
pub struct ProcedurePlanner<'a> {
    optimizer: &'a Optimizer,
    ctx: &'a RuleContext<'a>,
}

impl<'a> ProcedurePlanner<'a> {
    pub fn new(optimizer: &'a Optimizer, ctx: &'a RuleContext<'a>) -> Self {
        Self { optimizer, ctx }
    }

    /// Compile `block`; the output columns are those of the returning
    /// statement, if any
    pub fn plan(&self, block: Block) -> PlannerResult<ProcedurePlan> {
        let mut columns = None;
        let program = self.compile(block, false, &mut columns)?;
        Ok(ProcedurePlan::new(columns.unwrap_or_default(), program))
    }

    fn compile(
        &self,
        block: Block,
        in_loop: bool,
        columns: &mut Option<Vec<String>>,
    ) -> PlannerResult<Program> {
        let mut instructions = Vec::with_capacity(block.statements.len());
        for statement in block.statements {
            instructions.push(self.compile_statement(statement, in_loop, columns)?);
        }
        Ok(Program::new(instructions))
    }

    fn compile_statement(
        &self,
        statement: Statement,
        in_loop: bool,
        columns: &mut Option<Vec<String>>,
    ) -> PlannerResult<Instruction> {
        Ok(match statement {
            Statement::Assign {
                variable,
                expr,
                declare,
            } => Instruction::Assignment {
                variable,
                expr,
                declare,
            },
            Statement::Command {
                plan,
                into,
                returns,
            } => {
                if returns {
                    check_returned_columns(&plan, columns)?;
                }
                Instruction::ExecSql {
                    plan: self.optimizer.plan_query(plan, self.ctx)?,
                    into,
                    returns,
                }
            }
            Statement::Loop { cursor, plan, body } => Instruction::Loop {
                cursor,
                plan: self.optimizer.plan_query(plan, self.ctx)?,
                body: self.compile(body, true, columns)?,
            },
            Statement::While { condition, body } => Instruction::While {
                condition,
                body: self.compile(body, true, columns)?,
            },
            Statement::If {
                condition,
                then_block,
                else_block,
            } => Instruction::If {
                condition,
                then_program: self.compile(then_block, in_loop, columns)?,
                else_program: else_block
                    .map(|b| self.compile(b, in_loop, columns))
                    .transpose()?,
            },
            Statement::Break | Statement::Continue if !in_loop => {
                return Err(PlannerError::InvalidPlan(
                    "BREAK or CONTINUE outside of a loop".to_string(),
                ));
            }
            Statement::Break => Instruction::Break,
            Statement::Continue => Instruction::Continue,
            Statement::Raise { message } => Instruction::Raise { message },
        })
    }
}

/// Every returning statement must produce the same number of columns
fn check_returned_columns(plan: &PlanNode, columns: &mut Option<Vec<String>>) -> PlannerResult<()> {
    let produced = plan.output_columns();
    match columns {
        Some(existing) if existing.len() != produced.len() => Err(PlannerError::InvalidPlan(format!(
            "returned result has {} columns, expected {}",
            produced.len(),
            existing.len()
        ))),
        Some(_) => Ok(()),
        None => {
            *columns = Some(produced);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::datamgr::DataManager;
    use crate::executor::test_utils::ScriptedDataManager;
    use crate::executor::{CommandContext, ProcessorPlan};
    use crate::planner::logical::LogicalPlanBuilder;
    use crate::planner::test_utils::{test_capabilities, test_catalog};

    fn compile(block: Block) -> PlannerResult<ProcedurePlan> {
        let catalog = test_catalog();
        let caps = test_capabilities();
        let dm: Arc<dyn DataManager> = ScriptedDataManager::new(Vec::new());
        let command = CommandContext::new("proc", "tester", dm);
        let ctx = RuleContext {
            metadata: &catalog,
            capabilities: &caps,
            command: &command,
        };
        let optimizer = Optimizer::new();
        ProcedurePlanner::new(&optimizer, &ctx).plan(block)
    }

    fn parts(columns: &[&str]) -> PlanNode {
        LogicalPlanBuilder::new(&test_catalog())
            .scan("pm.parts", columns)
            .unwrap()
    }

    #[test]
    fn test_returning_statement_sets_columns() {
        let block = Block::new(vec![
            Statement::exec(parts(&["id"])),
            Statement::returning(parts(&["id", "name"])),
        ]);
        let plan = compile(block).unwrap();
        assert_eq!(plan.output_columns(), vec!["id", "name"]);
        assert_eq!(plan.program().len(), 2);
    }

    #[test]
    fn test_no_returning_statement_has_no_columns() {
        let block = Block::new(vec![Statement::declare("x", crate::sql::Expr::int(1))]);
        assert!(compile(block).unwrap().output_columns().is_empty());
    }

    #[test]
    fn test_mismatched_returns_rejected() {
        let block = Block::new(vec![
            Statement::returning(parts(&["id"])),
            Statement::returning(parts(&["id", "qty"])),
        ]);
        assert!(matches!(compile(block), Err(PlannerError::InvalidPlan(_))));
    }

    #[test]
    fn test_break_outside_loop_rejected() {
        let block = Block::new(vec![Statement::Break]);
        assert!(matches!(compile(block), Err(PlannerError::InvalidPlan(_))));

        let block = Block::new(vec![Statement::Loop {
            cursor: "rs".into(),
            plan: parts(&["id"]),
            body: Block::new(vec![Statement::If {
                condition: crate::sql::Expr::boolean(true),
                then_block: Block::new(vec![Statement::Break]),
                else_block: None,
            }]),
        }]);
        assert!(compile(block).is_ok());
    }

    #[test]
    fn test_nested_plans_are_optimized() {
        let block = Block::new(vec![Statement::returning(parts(&["id"]))]);
        let plan = compile(block).unwrap();
        let text = plan.describe();
        assert!(text.contains("ExecSql -> RETURN"));
        assert!(text.contains("Access"));
    }
}
