//! Procedure bodies before planning
//!
//! Statements hold logical plans; the procedure planner compiles each one
//! into an instruction with its own executable plan.

use crate::sql::Expr;

use super::PlanNode;

/// Ordered list of statements
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub statements: Vec<Statement>,
}

impl Block {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }
}

/// A procedure statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `DECLARE variable = expr` when `declare`, otherwise `variable = expr`
    Assign {
        variable: String,
        expr: Expr,
        declare: bool,
    },
    /// Run a command; rows go to `into` when named, to the caller when
    /// `returns` is set, and are otherwise discarded
    Command {
        plan: PlanNode,
        into: Option<String>,
        returns: bool,
    },
    /// Iterate over the rows of `plan`, exposing each column as
    /// `<cursor>.<column>`
    Loop {
        cursor: String,
        plan: PlanNode,
        body: Block,
    },
    While {
        condition: Expr,
        body: Block,
    },
    If {
        condition: Expr,
        then_block: Block,
        else_block: Option<Block>,
    },
    Break,
    Continue,
    /// Fail with the value of `message`
    Raise { message: Expr },
}

impl Statement {
    /// Command statement whose rows are discarded
    pub fn exec(plan: PlanNode) -> Self {
        Statement::Command {
            plan,
            into: None,
            returns: false,
        }
    }

    /// Command statement whose rows are the procedure's result
    pub fn returning(plan: PlanNode) -> Self {
        Statement::Command {
            plan,
            into: None,
            returns: true,
        }
    }

    pub fn assign(variable: impl Into<String>, expr: Expr) -> Self {
        Statement::Assign {
            variable: variable.into(),
            expr,
            declare: false,
        }
    }

    pub fn declare(variable: impl Into<String>, expr: Expr) -> Self {
        Statement::Assign {
            variable: variable.into(),
            expr,
            declare: true,
        }
    }
}
