//! Procedure instructions

use std::fmt::Write;

use crate::executor::ProcessorPlan;
use crate::sql::Expr;

use super::program::Program;

/// One step of a procedure program
///
/// Nested plans are cloned before every execution, so an instruction can be
/// run any number of times and a cloned program never shares state with its
/// original.
#[derive(Clone)]
pub enum Instruction {
    /// Bind `variable` to the value of `expr`
    Assignment {
        variable: String,
        expr: Expr,
        /// Declare in the current scope instead of updating an outer binding
        declare: bool,
    },

    /// Execute a nested plan to completion
    ExecSql {
        plan: Box<dyn ProcessorPlan>,
        /// Result register receiving the rows
        into: Option<String>,
        /// Rows become the procedure's output
        returns: bool,
    },

    /// Materialize `plan` into register `cursor`, then run `body` once per
    /// row with `<cursor>.<column>` bound
    Loop {
        cursor: String,
        plan: Box<dyn ProcessorPlan>,
        body: Program,
    },

    /// Run `body` while `condition` holds
    While { condition: Expr, body: Program },

    If {
        condition: Expr,
        then_program: Program,
        else_program: Option<Program>,
    },

    /// Leave the innermost loop
    Break,

    /// Start the next iteration of the innermost loop
    Continue,

    /// Fail with the value of `message`
    Raise { message: Expr },
}

impl Instruction {
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::Assignment { .. } => "Assignment",
            Instruction::ExecSql { .. } => "ExecSql",
            Instruction::Loop { .. } => "Loop",
            Instruction::While { .. } => "While",
            Instruction::If { .. } => "If",
            Instruction::Break => "Break",
            Instruction::Continue => "Continue",
            Instruction::Raise { .. } => "Raise",
        }
    }

    /// Append an indented description of this instruction
    pub fn describe(&self, depth: usize, out: &mut String) {
        let prefix = "  ".repeat(depth);
        match self {
            Instruction::Assignment { variable, expr, .. } => {
                let _ = writeln!(out, "{}Assignment: {} = {}", prefix, variable, expr);
            }
            Instruction::ExecSql {
                plan,
                into,
                returns,
            } => {
                let target = match (into, returns) {
                    (_, true) => " -> RETURN".to_string(),
                    (Some(name), false) => format!(" -> {}", name),
                    (None, false) => String::new(),
                };
                let _ = writeln!(out, "{}ExecSql{}", prefix, target);
                indent(&plan.describe(), depth + 1, out);
            }
            Instruction::Loop { cursor, plan, body } => {
                let _ = writeln!(out, "{}Loop: {}", prefix, cursor);
                indent(&plan.describe(), depth + 1, out);
                body.describe(depth + 1, out);
            }
            Instruction::While { condition, body } => {
                let _ = writeln!(out, "{}While: {}", prefix, condition);
                body.describe(depth + 1, out);
            }
            Instruction::If {
                condition,
                then_program,
                else_program,
            } => {
                let _ = writeln!(out, "{}If: {}", prefix, condition);
                then_program.describe(depth + 1, out);
                if let Some(else_program) = else_program {
                    let _ = writeln!(out, "{}Else", prefix);
                    else_program.describe(depth + 1, out);
                }
            }
            Instruction::Raise { message } => {
                let _ = writeln!(out, "{}Raise: {}", prefix, message);
            }
            Instruction::Break | Instruction::Continue => {
                let _ = writeln!(out, "{}{}", prefix, self.name());
            }
        }
    }
}

fn indent(text: &str, depth: usize, out: &mut String) {
    let prefix = "  ".repeat(depth);
    for line in text.lines() {
        let _ = writeln!(out, "{}{}", prefix, line);
    }
}
