//! Null node
//!
//! Produces no rows. Planning substitutes it for subtrees that provably
//! select nothing.

use std::sync::Arc;

use super::context::CommandContext;
use super::error::ExecutorResult;
use super::node::NodeBase;
use super::{BatchStatus, NodeId, RelationalNode};

pub struct NullNode {
    base: NodeBase,
}

impl NullNode {
    pub fn new(id: NodeId, columns: Vec<String>) -> Self {
        Self {
            base: NodeBase::new(id, "Null", columns),
        }
    }
}

impl RelationalNode for NullNode {
    fn id(&self) -> NodeId {
        self.base.id()
    }

    fn name(&self) -> &'static str {
        "Null"
    }

    fn output_columns(&self) -> &[String] {
        self.base.columns()
    }

    fn initialize(&mut self, ctx: Arc<CommandContext>) {
        self.base.initialize(ctx);
    }

    fn open(&mut self) -> ExecutorResult<()> {
        self.base.mark_open()
    }

    fn next_batch_direct(&mut self) -> ExecutorResult<BatchStatus> {
        if let Some(status) = self.base.finished_status()? {
            return Ok(status);
        }
        self.base.emit(true)
    }

    fn close(&mut self) -> ExecutorResult<()> {
        self.base.mark_closed();
        Ok(())
    }

    fn cancel(&mut self) {
        self.base.cancel();
    }

    fn reset(&mut self) {
        self.base.reset();
    }

    fn clone_node(&self) -> Box<dyn RelationalNode> {
        Box::new(NullNode {
            base: self.base.fresh_copy(),
        })
    }
}
