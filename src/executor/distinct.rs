//! DupRemove node
//!
//! Streaming duplicate elimination; the first occurrence of a row wins.

use std::collections::HashSet;
use std::sync::Arc;

use super::collector::{BatchIterator, RowStatus};
use super::context::CommandContext;
use super::error::ExecutorResult;
use super::node::NodeBase;
use super::row::Row;
use super::{BatchStatus, NodeId, RelationalNode};

pub struct DupRemoveNode {
    base: NodeBase,
    child: Box<dyn RelationalNode>,
    input: BatchIterator,
    seen: HashSet<Row>,
}

impl DupRemoveNode {
    pub fn new(id: NodeId, child: Box<dyn RelationalNode>) -> Self {
        let columns = child.output_columns().to_vec();
        Self {
            base: NodeBase::new(id, "DupRemove", columns),
            child,
            input: BatchIterator::new(),
            seen: HashSet::new(),
        }
    }
}

impl RelationalNode for DupRemoveNode {
    fn id(&self) -> NodeId {
        self.base.id()
    }

    fn name(&self) -> &'static str {
        "DupRemove"
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
            if self.base.is_full() {
                return self.base.emit(false);
            }
            match self.input.next_row(self.child.as_mut())? {
                RowStatus::Row(row) => {
                    if !self.seen.contains(&row) {
                        self.seen.insert(row.clone());
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
            self.seen.clear();
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
        self.seen.clear();
        self.child.reset();
    }

    fn clone_node(&self) -> Box<dyn RelationalNode> {
        Box::new(DupRemoveNode::new(self.base.id(), self.child.clone_node()))
    }

    fn children(&self) -> Vec<&dyn RelationalNode> {
        vec![self.child.as_ref()]
    }
}
