//! Select node
//!
//! Filters rows by a criteria expression. Rows whose criteria evaluate to
//! FALSE or NULL are dropped.

use std::sync::Arc;

use crate::sql::Expr;

use super::collector::{BatchIterator, RowStatus};
use super::context::CommandContext;
use super::error::ExecutorResult;
use super::eval::eval_criteria;
use super::node::NodeBase;
use super::{BatchStatus, NodeId, RelationalNode};

/// Select node
pub struct SelectNode {
    base: NodeBase,
    child: Box<dyn RelationalNode>,
    criteria: Expr,
    input: BatchIterator,
}

impl SelectNode {
    pub fn new(id: NodeId, child: Box<dyn RelationalNode>, criteria: Expr) -> Self {
        let columns = child.output_columns().to_vec();
        Self {
            base: NodeBase::new(id, "Select", columns),
            child,
            criteria,
            input: BatchIterator::new(),
        }
    }
}

impl RelationalNode for SelectNode {
    fn id(&self) -> NodeId {
        self.base.id()
    }

    fn name(&self) -> &'static str {
        "Select"
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
                    if eval_criteria(&self.criteria, &row, ctx.as_ref())? {
                        self.base.add_row(row);
                    }
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
        Box::new(SelectNode {
            base: self.base.fresh_copy(),
            child: self.child.clone_node(),
            criteria: self.criteria.clone(),
            input: BatchIterator::new(),
        })
    }

    fn children(&self) -> Vec<&dyn RelationalNode> {
        vec![self.child.as_ref()]
    }

    fn describe(&self) -> String {
        format!("Select({})", self.criteria)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::datum::Datum;
    use crate::executor::test_utils::{drain_rows, empty_context, int_rows, ints, ValuesNode};
    use crate::sql::{BinaryOp, Literal};

    fn select(values: &[i64], criteria: Expr, blocking: bool) -> SelectNode {
        let mut child = ValuesNode::new(&["n"], int_rows(values));
        if blocking {
            child = child.blocking();
        }
        let mut node = SelectNode::new(1, Box::new(child), criteria);
        node.initialize(empty_context(2));
        node.open().unwrap();
        node
    }

    #[test]
    fn test_filter() {
        // n > 1
        let criteria = Expr::binary(Expr::column("t", "n", 0), BinaryOp::Gt, Expr::int(1));
        let mut node = select(&[1, 2, 3, 0, 5], criteria, true);
        let rows = drain_rows(&mut node).unwrap();
        assert_eq!(ints(&rows), vec![2, 3, 5]);
    }

    #[test]
    fn test_null_criteria_drops_row() {
        let criteria = Expr::eq(Expr::column("t", "n", 0), Expr::Literal(Literal::Null));
        let mut node = select(&[1, 2], criteria, false);
        assert!(drain_rows(&mut node).unwrap().is_empty());
    }

    #[test]
    fn test_criteria_reads_variables() {
        let criteria = Expr::eq(Expr::column("t", "n", 0), Expr::variable("wanted"));
        let mut child = ValuesNode::new(&["n"], int_rows(&[1, 2, 3]));
        let ctx = empty_context(10);
        ctx.variables_mut().declare("wanted", Datum::Int(2));
        child.initialize(ctx.clone());
        let mut node = SelectNode::new(1, Box::new(child), criteria);
        node.initialize(ctx);
        node.open().unwrap();
        assert_eq!(ints(&drain_rows(&mut node).unwrap()), vec![2]);
    }

    #[test]
    fn test_type_error_is_processing_error() {
        let criteria = Expr::binary(Expr::column("t", "n", 0), BinaryOp::Add, Expr::string("x"));
        let mut node = select(&[1], criteria, false);
        let err = drain_rows(&mut node).unwrap_err();
        assert!(err.is_processing());
    }
}
