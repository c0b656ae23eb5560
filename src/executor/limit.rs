//! Limit node
//!
//! Implements LIMIT and OFFSET. Once the limit is reached the terminal batch
//! is emitted and the child is closed without being drained.

use std::sync::Arc;

use super::collector::{BatchIterator, RowStatus};
use super::context::CommandContext;
use super::error::ExecutorResult;
use super::node::NodeBase;
use super::{BatchStatus, NodeId, RelationalNode};

/// Limit node
pub struct LimitNode {
    base: NodeBase,
    child: Box<dyn RelationalNode>,
    /// Maximum rows to return (None = unlimited)
    limit: Option<u64>,
    /// Rows to skip
    offset: u64,
    input: BatchIterator,
    skipped: u64,
    returned: u64,
    child_closed: bool,
}

impl LimitNode {
    pub fn new(id: NodeId, child: Box<dyn RelationalNode>, limit: Option<u64>, offset: u64) -> Self {
        let columns = child.output_columns().to_vec();
        Self {
            base: NodeBase::new(id, "Limit", columns),
            child,
            limit,
            offset,
            input: BatchIterator::new(),
            skipped: 0,
            returned: 0,
            child_closed: false,
        }
    }

    fn limit_reached(&self) -> bool {
        self.limit.is_some_and(|l| self.returned >= l)
    }

    fn close_child(&mut self) -> ExecutorResult<()> {
        if !self.child_closed {
            self.child_closed = true;
            self.child.close()?;
        }
        Ok(())
    }
}

impl RelationalNode for LimitNode {
    fn id(&self) -> NodeId {
        self.base.id()
    }

    fn name(&self) -> &'static str {
        "Limit"
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
        loop {
            if self.limit_reached() {
                self.close_child()?;
                return self.base.emit(true);
            }
            if self.base.is_full() {
                return self.base.emit(false);
            }
            match self.input.next_row(self.child.as_mut())? {
                RowStatus::Row(row) => {
                    if self.skipped < self.offset {
                        self.skipped += 1;
                        continue;
                    }
                    self.returned += 1;
                    self.base.add_row(row);
                }
                RowStatus::Blocked => return self.base.emit_or_block(),
                RowStatus::End => return self.base.emit(true),
            }
        }
    }

    fn close(&mut self) -> ExecutorResult<()> {
        if self.base.mark_closed() {
            self.close_child()?;
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
        self.skipped = 0;
        self.returned = 0;
        self.child_closed = false;
        self.child.reset();
    }

    fn clone_node(&self) -> Box<dyn RelationalNode> {
        Box::new(LimitNode::new(
            self.base.id(),
            self.child.clone_node(),
            self.limit,
            self.offset,
        ))
    }

    fn children(&self) -> Vec<&dyn RelationalNode> {
        vec![self.child.as_ref()]
    }

    fn describe(&self) -> String {
        match self.limit {
            Some(l) => format!("Limit({}, offset {})", l, self.offset),
            None => format!("Limit(offset {})", self.offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::executor::test_utils::{drain_rows, empty_context, int_rows, ints, ValuesNode};

    fn run(limit: Option<u64>, offset: u64) -> (Vec<i64>, usize) {
        let values: Vec<i64> = (0..10).collect();
        let child = ValuesNode::new(&["n"], int_rows(&values)).blocking();
        let closes = child.close_counter();
        let mut node = LimitNode::new(1, Box::new(child), limit, offset);
        node.initialize(empty_context(3));
        node.open().unwrap();
        let rows = drain_rows(&mut node).unwrap();
        let closed_before_close = closes.load(Ordering::SeqCst);
        node.close().unwrap();
        node.close().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        (ints(&rows), closed_before_close)
    }

    #[test]
    fn test_limit_closes_child_early() {
        let (rows, closed_early) = run(Some(3), 0);
        assert_eq!(rows, vec![0, 1, 2]);
        assert_eq!(closed_early, 1);
    }

    #[test]
    fn test_limit_with_offset() {
        let (rows, _) = run(Some(3), 5);
        assert_eq!(rows, vec![5, 6, 7]);
    }

    #[test]
    fn test_offset_past_end() {
        let (rows, closed_early) = run(None, 20);
        assert!(rows.is_empty());
        assert_eq!(closed_early, 0);
    }

    #[test]
    fn test_limit_zero() {
        let (rows, _) = run(Some(0), 0);
        assert!(rows.is_empty());
    }
}
