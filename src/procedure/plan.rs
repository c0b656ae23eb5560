//! Procedure interpreter
//!
//! `ProcedurePlan` runs a `Program` as a `ProcessorPlan`. Execution state is
//! a stack of frames, one per active block or loop body, plus at most one
//! nested plan in flight. A nested plan that reports Blocked suspends the
//! whole procedure; the next pull resumes exactly where it stopped.
//!
//! Every frame except the outermost owns a variable scope. The procedure
//! pushes its own scope at open and restores the caller's depth at close.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::executor::collector::{BatchCollector, CollectStep};
use crate::executor::eval::{eval_criteria, eval_with};
use crate::executor::node::NodeBase;
use crate::executor::{
    BatchStatus, CommandContext, ExecutorError, ExecutorResult, ProcessorPlan, Row, TupleBuffer,
};
use crate::sql::Expr;

use super::instructions::Instruction;
use super::program::Program;

enum FrameKind {
    Block,
    /// Iterates the rows of register `cursor`; `position` is the next row
    Loop { cursor: String, position: usize },
    While { condition: Expr, iterations: usize },
}

impl FrameKind {
    fn is_loop(&self) -> bool {
        !matches!(self, FrameKind::Block)
    }
}

struct Frame {
    program: Program,
    pc: usize,
    kind: FrameKind,
    scoped: bool,
}

impl Frame {
    fn new(program: Program, kind: FrameKind, scoped: bool) -> Self {
        // loops test their condition before the first iteration
        let pc = if kind.is_loop() { program.len() } else { 0 };
        Self {
            program,
            pc,
            kind,
            scoped,
        }
    }
}

/// Where the rows of a nested plan go
enum Target {
    Discard,
    Return,
    Register(String, BatchCollector),
    Cursor {
        cursor: String,
        body: Program,
        collector: BatchCollector,
    },
}

struct Running {
    plan: Box<dyn ProcessorPlan>,
    target: Target,
}

/// Executable procedure
pub struct ProcedurePlan {
    base: NodeBase,
    program: Program,
    frames: Vec<Frame>,
    running: Option<Running>,
    /// Result registers by lowercase name
    registers: HashMap<String, TupleBuffer>,
    /// Caller's scope depth, recorded while the procedure scope is pushed
    base_depth: Option<usize>,
    finished: bool,
}

impl ProcedurePlan {
    /// Procedure producing rows with `columns`; empty when nothing is returned
    pub fn new(columns: Vec<String>, program: Program) -> Self {
        Self {
            base: NodeBase::new(0, "Procedure", columns),
            program,
            frames: Vec::new(),
            running: None,
            registers: HashMap::new(),
            base_depth: None,
            finished: false,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Result register `name`
    pub fn register(&self, name: &str) -> ExecutorResult<&TupleBuffer> {
        self.registers
            .get(&name.to_lowercase())
            .ok_or_else(|| ExecutorError::UnknownResultSet(name.to_string()))
    }

    fn push_frame(&mut self, ctx: &CommandContext, program: Program, kind: FrameKind) {
        ctx.variables_mut().push_scope();
        self.frames.push(Frame::new(program, kind, true));
    }

    fn pop_frame(&mut self, ctx: &CommandContext) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        if let FrameKind::Loop { cursor, .. } = &frame.kind {
            self.release_cursor(ctx, cursor);
        }
        if frame.scoped {
            ctx.variables_mut().pop_scope();
        }
        if self.frames.is_empty() {
            self.finished = true;
        }
    }

    fn release_cursor(&mut self, ctx: &CommandContext, cursor: &str) {
        if let Some(mut buffer) = self.registers.remove(&cursor.to_lowercase()) {
            buffer.remove();
        }
        ctx.variables_mut().remove_prefixed(&format!("{}.", cursor));
    }

    fn store_register(&mut self, name: &str, mut buffer: TupleBuffer) {
        buffer.close();
        if let Some(mut old) = self.registers.insert(name.to_lowercase(), buffer) {
            old.remove();
        }
    }

    fn start(
        &mut self,
        ctx: &Arc<CommandContext>,
        mut plan: Box<dyn ProcessorPlan>,
        target: Target,
    ) -> ExecutorResult<()> {
        plan.initialize(ctx.clone());
        plan.open()?;
        self.running = Some(Running { plan, target });
        Ok(())
    }

    /// Advance the nested plan by one batch; false when it is blocked
    fn step_running(&mut self, ctx: &CommandContext) -> ExecutorResult<bool> {
        let Some(running) = self.running.as_mut() else {
            return Ok(true);
        };
        let complete = match &mut running.target {
            Target::Discard => match running.plan.next_batch()? {
                BatchStatus::Blocked => return Ok(false),
                BatchStatus::Ready(batch) => batch.is_terminal(),
                BatchStatus::Done => true,
            },
            Target::Return => match running.plan.next_batch()? {
                BatchStatus::Blocked => return Ok(false),
                BatchStatus::Ready(batch) => {
                    let terminal = batch.is_terminal();
                    for row in batch.into_rows() {
                        self.base.add_row(row);
                    }
                    terminal
                }
                BatchStatus::Done => true,
            },
            Target::Register(_, collector) | Target::Cursor { collector, .. } => {
                match collector.collect_batch(running.plan.as_mut())? {
                    CollectStep::Blocked => return Ok(false),
                    CollectStep::Appended(_) => false,
                    CollectStep::Complete => true,
                }
            }
        };
        if complete {
            self.finish_running(ctx)?;
        }
        Ok(true)
    }

    fn finish_running(&mut self, ctx: &CommandContext) -> ExecutorResult<()> {
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };
        running.plan.close()?;
        match running.target {
            Target::Discard | Target::Return => {}
            Target::Register(name, collector) => {
                self.store_register(&name, collector.into_buffer());
            }
            Target::Cursor {
                cursor,
                body,
                collector,
            } => {
                self.store_register(&cursor, collector.into_buffer());
                self.push_frame(ctx, body, FrameKind::Loop { cursor, position: 1 });
            }
        }
        Ok(())
    }

    /// Execute the next instruction of the innermost frame
    fn step(&mut self, ctx: &Arc<CommandContext>) -> ExecutorResult<()> {
        let Some(frame) = self.frames.last_mut() else {
            self.finished = true;
            return Ok(());
        };
        let Some(instruction) = frame.program.get(frame.pc).cloned() else {
            return self.test_condition(ctx);
        };
        frame.pc += 1;

        match instruction {
            Instruction::Assignment {
                variable,
                expr,
                declare,
            } => {
                let value = eval_with(&expr, &Row::empty(), &**ctx)?;
                let mut vars = ctx.variables_mut();
                if declare {
                    vars.declare(&variable, value);
                } else {
                    vars.set(&variable, value);
                }
            }
            Instruction::ExecSql {
                plan,
                into,
                returns,
            } => {
                let target = match into {
                    _ if returns => Target::Return,
                    Some(name) => {
                        Target::Register(name, BatchCollector::new(TupleBuffer::new(plan.output_columns())))
                    }
                    None => Target::Discard,
                };
                self.start(ctx, plan, target)?;
            }
            Instruction::Loop { cursor, plan, body } => {
                let collector = BatchCollector::new(TupleBuffer::new(plan.output_columns()));
                self.start(
                    ctx,
                    plan,
                    Target::Cursor {
                        cursor,
                        body,
                        collector,
                    },
                )?;
            }
            Instruction::While { condition, body } => {
                self.push_frame(
                    ctx,
                    body,
                    FrameKind::While {
                        condition,
                        iterations: 0,
                    },
                );
            }
            Instruction::If {
                condition,
                then_program,
                else_program,
            } => {
                if eval_criteria(&condition, &Row::empty(), &**ctx)? {
                    self.push_frame(ctx, then_program, FrameKind::Block);
                } else if let Some(else_program) = else_program {
                    self.push_frame(ctx, else_program, FrameKind::Block);
                }
            }
            Instruction::Break => {
                self.require_loop("BREAK")?;
                while let Some(frame) = self.frames.last() {
                    let was_loop = frame.kind.is_loop();
                    self.pop_frame(ctx);
                    if was_loop {
                        break;
                    }
                }
            }
            Instruction::Continue => {
                self.require_loop("CONTINUE")?;
                while self.frames.last().is_some_and(|f| !f.kind.is_loop()) {
                    self.pop_frame(ctx);
                }
                if let Some(frame) = self.frames.last_mut() {
                    frame.pc = frame.program.len();
                }
            }
            Instruction::Raise { message } => {
                let value = eval_with(&message, &Row::empty(), &**ctx)?;
                return Err(ExecutorError::Raised(value.to_string()));
            }
        }
        Ok(())
    }

    /// Planning rejects BREAK and CONTINUE outside loops
    fn require_loop(&self, keyword: &str) -> ExecutorResult<()> {
        if self.frames.iter().any(|f| f.kind.is_loop()) {
            Ok(())
        } else {
            Err(self
                .base
                .component_error(format!("{} outside of a loop", keyword)))
        }
    }

    /// Close the nested plan, drop registers and restore the caller's scope
    fn release(&mut self) -> ExecutorResult<()> {
        let mut result = Ok(());
        if let Some(mut running) = self.running.take() {
            result = running.plan.close();
        }
        self.frames.clear();
        for (_, mut buffer) in self.registers.drain() {
            buffer.remove();
        }
        if let (Some(depth), Ok(ctx)) = (self.base_depth.take(), self.base.context()) {
            let mut vars = ctx.variables_mut();
            while vars.depth() > depth.max(1) {
                vars.pop_scope();
            }
        }
        result
    }

    /// End of a frame's body: start the next iteration or leave the frame
    fn test_condition(&mut self, ctx: &CommandContext) -> ExecutorResult<()> {
        let max_iterations = ctx.config().max_while_iterations;
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        let repeat = match &mut frame.kind {
            FrameKind::Block => false,
            FrameKind::Loop { cursor, position } => {
                let buffer = self
                    .registers
                    .get(&cursor.to_lowercase())
                    .ok_or_else(|| ExecutorError::UnknownResultSet(cursor.clone()))?;
                match buffer.row(*position) {
                    Some(row) => {
                        let mut vars = ctx.variables_mut();
                        for (column, value) in buffer.columns().iter().zip(row.values().iter()) {
                            vars.declare(&format!("{}.{}", cursor, column), value.clone());
                        }
                        *position += 1;
                        true
                    }
                    None => false,
                }
            }
            FrameKind::While {
                condition,
                iterations,
            } => {
                if eval_criteria(condition, &Row::empty(), ctx)? {
                    *iterations += 1;
                    if *iterations > max_iterations {
                        return Err(ExecutorError::IterationLimit(max_iterations));
                    }
                    true
                } else {
                    false
                }
            }
        };
        if repeat {
            frame.pc = 0;
        } else {
            self.pop_frame(ctx);
        }
        Ok(())
    }
}

impl ProcessorPlan for ProcedurePlan {
    fn initialize(&mut self, ctx: Arc<CommandContext>) {
        self.base.initialize(ctx);
    }

    fn open(&mut self) -> ExecutorResult<()> {
        self.base.mark_open()?;
        let ctx = self.base.context()?.clone();
        {
            let mut vars = ctx.variables_mut();
            self.base_depth = Some(vars.depth());
            vars.push_scope();
        }
        self.frames
            .push(Frame::new(self.program.clone(), FrameKind::Block, false));
        self.finished = false;
        Ok(())
    }

    fn next_batch(&mut self) -> ExecutorResult<BatchStatus> {
        if let Some(status) = self.base.finished_status()? {
            return Ok(status);
        }
        let ctx = self.base.context()?.clone();
        loop {
            if self.base.is_full() {
                return self.base.emit(false);
            }
            if self.running.is_some() {
                if !self.step_running(&ctx)? {
                    return self.base.emit_or_block();
                }
                continue;
            }
            if self.finished {
                return self.base.emit(true);
            }
            self.step(&ctx)?;
        }
    }

    fn close(&mut self) -> ExecutorResult<()> {
        if !self.base.mark_closed() {
            return Ok(());
        }
        self.release()
    }

    fn cancel(&mut self) {
        debug!(request_id = self.base.request_id(), "cancelling procedure");
        self.base.cancel();
        if let Some(running) = self.running.as_mut() {
            running.plan.cancel();
        }
    }

    fn reset(&mut self) {
        if let Err(e) = self.release() {
            debug!(
                request_id = self.base.request_id(),
                error = %e,
                "nested plan failed to close on reset"
            );
        }
        self.base.reset();
        self.finished = false;
    }

    fn clone_plan(&self) -> Box<dyn ProcessorPlan> {
        let mut copy = ProcedurePlan::new(self.base.columns().to_vec(), self.program.clone());
        copy.base = self.base.fresh_copy();
        Box::new(copy)
    }

    fn output_columns(&self) -> Vec<String> {
        self.base.columns().to_vec()
    }

    fn describe(&self) -> String {
        let mut out = String::from("Procedure\n");
        self.program.describe(1, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::test_utils::{empty_context, int_rows, ints, ValuesNode};
    use crate::executor::{Datum, RelationalPlan, VariableLookup};
    use crate::sql::BinaryOp;

    fn values(rows: &[i64]) -> Box<dyn ProcessorPlan> {
        Box::new(RelationalPlan::new(Box::new(ValuesNode::new(&["n"], int_rows(rows)))))
    }

    fn blocking_values(rows: &[i64]) -> Box<dyn ProcessorPlan> {
        let node = ValuesNode::new(&["n"], int_rows(rows)).blocking();
        Box::new(RelationalPlan::new(Box::new(node)))
    }

    fn add(var: &str, expr: Expr) -> Instruction {
        Instruction::Assignment {
            variable: "total".into(),
            expr: Expr::binary(Expr::variable(var), BinaryOp::Add, expr),
            declare: false,
        }
    }

    fn declare_total() -> Instruction {
        Instruction::Assignment {
            variable: "total".into(),
            expr: Expr::int(0),
            declare: true,
        }
    }

    /// Pull to completion, retrying Blocked; returns output rows
    fn run(plan: &mut ProcedurePlan, ctx: &Arc<CommandContext>) -> ExecutorResult<Vec<Row>> {
        plan.initialize(ctx.clone());
        plan.open()?;
        let mut rows = Vec::new();
        for _ in 0..10_000 {
            match plan.next_batch()? {
                BatchStatus::Ready(batch) => {
                    let terminal = batch.is_terminal();
                    rows.extend(batch.into_rows());
                    if terminal {
                        return Ok(rows);
                    }
                }
                BatchStatus::Blocked => continue,
                BatchStatus::Done => return Ok(rows),
            }
        }
        panic!("procedure never finished");
    }

    fn loop_program(rows: Box<dyn ProcessorPlan>) -> Program {
        Program::new(vec![
            declare_total(),
            Instruction::Loop {
                cursor: "rs".into(),
                plan: rows,
                body: Program::new(vec![add("total", Expr::variable("rs.n"))]),
            },
        ])
    }

    #[test]
    fn test_loop_binds_each_row_then_drops_register() {
        let ctx = empty_context(10);
        let mut plan = ProcedurePlan::new(Vec::new(), loop_program(values(&[1, 2, 3])));
        let rows = run(&mut plan, &ctx).unwrap();
        assert!(rows.is_empty());
        assert_eq!(ctx.lookup("total"), Some(Datum::Int(6)));
        assert!(ctx.lookup("rs.n").is_none());
        assert!(matches!(
            plan.register("rs"),
            Err(ExecutorError::UnknownResultSet(_))
        ));
        plan.close().unwrap();
        assert!(ctx.lookup("total").is_none());
    }

    #[test]
    fn test_blocked_nested_plan_resumes() {
        let ctx = empty_context(1);
        let mut plan = ProcedurePlan::new(Vec::new(), loop_program(blocking_values(&[4, 5])));
        plan.initialize(ctx.clone());
        plan.open().unwrap();
        assert_eq!(plan.next_batch().unwrap(), BatchStatus::Blocked);
        plan.close().unwrap();
        let mut plan = ProcedurePlan::new(Vec::new(), loop_program(blocking_values(&[4, 5])));
        run(&mut plan, &ctx).unwrap();
        assert_eq!(ctx.lookup("total"), Some(Datum::Int(9)));
    }

    #[test]
    fn test_returned_rows_and_select_into() {
        let ctx = empty_context(2);
        let program = Program::new(vec![
            Instruction::ExecSql {
                plan: values(&[7, 8]),
                into: Some("saved".into()),
                returns: false,
            },
            Instruction::ExecSql {
                plan: values(&[1, 2, 3]),
                into: None,
                returns: true,
            },
        ]);
        let mut plan = ProcedurePlan::new(vec!["n".into()], program);
        let rows = run(&mut plan, &ctx).unwrap();
        assert_eq!(ints(&rows), vec![1, 2, 3]);
        let saved: Vec<Row> = plan.register("SAVED").unwrap().rows().cloned().collect();
        assert_eq!(ints(&saved), vec![7, 8]);
        plan.close().unwrap();
    }

    #[test]
    fn test_while_with_break_and_continue() {
        let ctx = empty_context(10);
        let i = || Expr::variable("i");
        // i counts to 10; odd values are skipped; stop once i reaches 6
        let body = Program::new(vec![
            Instruction::Assignment {
                variable: "i".into(),
                expr: Expr::binary(i(), BinaryOp::Add, Expr::int(1)),
                declare: false,
            },
            Instruction::If {
                condition: Expr::eq(Expr::binary(i(), BinaryOp::Mod, Expr::int(2)), Expr::int(1)),
                then_program: Program::new(vec![Instruction::Continue]),
                else_program: None,
            },
            Instruction::If {
                condition: Expr::binary(i(), BinaryOp::Gt, Expr::int(5)),
                then_program: Program::new(vec![Instruction::Break]),
                else_program: None,
            },
            add("total", i()),
        ]);
        let program = Program::new(vec![
            declare_total(),
            Instruction::Assignment {
                variable: "i".into(),
                expr: Expr::int(0),
                declare: true,
            },
            Instruction::While {
                condition: Expr::binary(i(), BinaryOp::Lt, Expr::int(10)),
                body,
            },
        ]);
        let mut plan = ProcedurePlan::new(Vec::new(), program);
        run(&mut plan, &ctx).unwrap();
        // 2 + 4
        assert_eq!(ctx.lookup("total"), Some(Datum::Int(6)));
        assert_eq!(ctx.lookup("i"), Some(Datum::Int(6)));
    }

    #[test]
    fn test_while_iteration_limit() {
        let ctx = Arc::new(
            CommandContext::new(
                "loop",
                "tester",
                crate::executor::test_utils::ScriptedDataManager::new(Vec::new()),
            )
            .with_config(crate::config::EngineConfig::default().with_max_while_iterations(5)),
        );
        let program = Program::new(vec![Instruction::While {
            condition: Expr::boolean(true),
            body: Program::default(),
        }]);
        let mut plan = ProcedurePlan::new(Vec::new(), program);
        let err = run(&mut plan, &ctx).unwrap_err();
        assert!(matches!(err, ExecutorError::IterationLimit(5)));
        assert!(err.is_processing());
    }

    #[test]
    fn test_raise_and_break_outside_loop() {
        let ctx = empty_context(10);
        let program = Program::new(vec![Instruction::Raise {
            message: Expr::string("bad part"),
        }]);
        let mut plan = ProcedurePlan::new(Vec::new(), program);
        let err = run(&mut plan, &ctx).unwrap_err();
        assert_eq!(err.to_string(), "bad part");
        plan.close().unwrap();

        let mut plan = ProcedurePlan::new(Vec::new(), Program::new(vec![Instruction::Break]));
        let err = run(&mut plan, &ctx).unwrap_err();
        assert!(matches!(err, ExecutorError::Component { .. }));
        assert!(!err.is_processing());
    }

    #[test]
    fn test_clone_runs_independently() {
        let original = ProcedurePlan::new(Vec::new(), loop_program(values(&[1, 2, 3])));
        let mut first = original.clone_plan();
        let mut second = original.clone_plan();
        for plan in [&mut first, &mut second] {
            let ctx = empty_context(10);
            plan.initialize(ctx.clone());
            plan.open().unwrap();
            while !matches!(plan.next_batch().unwrap(), BatchStatus::Ready(b) if b.is_terminal()) {}
            assert_eq!(ctx.lookup("total"), Some(Datum::Int(6)));
            plan.close().unwrap();
        }
    }

    #[test]
    fn test_reset_restores_scope_and_reruns() {
        let ctx = empty_context(1);
        let depth = ctx.variables().depth();
        let mut plan = ProcedurePlan::new(Vec::new(), loop_program(blocking_values(&[1, 2, 3])));
        run(&mut plan, &ctx).unwrap();
        assert_eq!(ctx.lookup("total"), Some(Datum::Int(6)));

        // reset mid-run, with the nested plan in flight
        plan.reset();
        assert_eq!(ctx.variables().depth(), depth);
        assert!(ctx.lookup("total").is_none());
        plan.open().unwrap();
        assert_eq!(plan.next_batch().unwrap(), BatchStatus::Blocked);
        assert!(ctx.lookup("total").is_some());
        plan.reset();
        plan.reset();
        assert_eq!(ctx.variables().depth(), depth);
        assert!(ctx.lookup("total").is_none());

        let rows = run(&mut plan, &ctx).unwrap();
        assert!(rows.is_empty());
        assert_eq!(ctx.lookup("total"), Some(Datum::Int(6)));
        plan.close().unwrap();
        assert_eq!(ctx.variables().depth(), depth);
        assert!(ctx.lookup("total").is_none());
    }

    #[test]
    fn test_describe() {
        let plan = ProcedurePlan::new(Vec::new(), loop_program(values(&[1])));
        let text = plan.describe();
        assert!(text.starts_with("Procedure\n"));
        assert!(text.contains("  Loop: rs"));
        assert!(text.contains("    Values"));
    }
}
