//! Project node
//!
//! Evaluates a list of expressions against each input row.

use std::sync::Arc;

use crate::sql::Expr;

use super::collector::{BatchIterator, RowStatus};
use super::context::CommandContext;
use super::error::ExecutorResult;
use super::eval::eval_with;
use super::node::NodeBase;
use super::row::Row;
use super::{BatchStatus, NodeId, RelationalNode};

/// Project node
pub struct ProjectNode {
    base: NodeBase,
    child: Box<dyn RelationalNode>,
    /// (expression, output name)
    exprs: Vec<(Expr, String)>,
    input: BatchIterator,
}

impl ProjectNode {
    pub fn new(id: NodeId, child: Box<dyn RelationalNode>, exprs: Vec<(Expr, String)>) -> Self {
        let columns = exprs.iter().map(|(_, name)| name.clone()).collect();
        Self {
            base: NodeBase::new(id, "Project", columns),
            child,
            exprs,
            input: BatchIterator::new(),
        }
    }
}

impl RelationalNode for ProjectNode {
    fn id(&self) -> NodeId {
        self.base.id()
    }

    fn name(&self) -> &'static str {
        "Project"
    }

    fn output_columns(&self) -> &[String] {
        self.base.columns()
    }

    fn initialize(&mut self, ctx: Arc<CommandContext>) {
        self.child.initialize(ctx.clone());
        self.base.initialize(ctx);
    }

    fn open(&mut self) -> ExecutorResult<()> {
        self.base.mark_open()?;
        self.child.open()
    }

    fn next_batch_direct(&mut self) -> ExecutorResult<BatchStatus> {
        if let Some(status) = self.base.finished_status()? {
            return Ok(status);
        }
        let ctx = self.base.context()?.clone();
        loop {
            if self.base.is_full() {
                return self.base.emit(false);
            }
            match self.input.next_row(self.child.as_mut())? {
                RowStatus::Row(row) => {
                    let projected = self
                        .exprs
                        .iter()
                        .map(|(e, _)| eval_with(e, &row, ctx.as_ref()))
                        .collect::<ExecutorResult<Row>>()?;
                    self.base.add_row(projected);
                }
                RowStatus::Blocked => return self.base.emit_or_block(),
                RowStatus::End => return self.base.emit(true),
            }
        }
    }

    fn close(&mut self) -> ExecutorResult<()> {
        if self.base.mark_closed() {
            self.child.close()?;
        }
        Ok(())
    }

    fn cancel(&mut self) {
        self.base.cancel();
        self.child.cancel();
    }

    fn reset(&mut self) {
        self.base.reset();
        self.input.reset();
        self.child.reset();
    }

    fn clone_node(&self) -> Box<dyn RelationalNode> {
        Box::new(ProjectNode {
            base: self.base.fresh_copy(),
            child: self.child.clone_node(),
            exprs: self.exprs.clone(),
            input: BatchIterator::new(),
        })
    }

    fn children(&self) -> Vec<&dyn RelationalNode> {
        vec![self.child.as_ref()]
    }

    fn describe(&self) -> String {
        let items: Vec<String> = self.exprs.iter().map(|(e, _)| e.to_string()).collect();
        format!("Project({})", items.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::datum::Datum;
    use crate::executor::test_utils::{drain_rows, empty_context, ValuesNode};
    use crate::sql::BinaryOp;

    #[test]
    fn test_project() {
        let rows = vec![
            Row::new(vec![Datum::Int(1), Datum::from("a")]),
            Row::new(vec![Datum::Int(2), Datum::from("b")]),
        ];
        let child = ValuesNode::new(&["id", "name"], rows).blocking();
        let exprs = vec![
            (Expr::column("t", "name", 1), "name".to_string()),
            (
                Expr::binary(Expr::column("t", "id", 0), BinaryOp::Mul, Expr::int(10)),
                "scaled".to_string(),
            ),
        ];
        let mut node = ProjectNode::new(1, Box::new(child), exprs);
        node.initialize(empty_context(10));
        node.open().unwrap();

        assert_eq!(node.output_columns(), &["name".to_string(), "scaled".to_string()]);
        let out = drain_rows(&mut node).unwrap();
        assert_eq!(
            out,
            vec![
                Row::new(vec![Datum::from("a"), Datum::Int(10)]),
                Row::new(vec![Datum::from("b"), Datum::Int(20)]),
            ]
        );
    }
}
