//! UnionAll node
//!
//! Concatenates the output of its children in child order. Rows are
//! renumbered into one contiguous stream.

use std::sync::Arc;

use super::context::CommandContext;
use super::error::ExecutorResult;
use super::node::NodeBase;
use super::{BatchStatus, NodeId, RelationalNode};

pub struct UnionAllNode {
    base: NodeBase,
    children: Vec<Box<dyn RelationalNode>>,
    /// Child currently being read
    current: usize,
}

impl UnionAllNode {
    pub fn new(id: NodeId, columns: Vec<String>, children: Vec<Box<dyn RelationalNode>>) -> Self {
        Self {
            base: NodeBase::new(id, "UnionAll", columns),
            children,
            current: 0,
        }
    }
}

impl RelationalNode for UnionAllNode {
    fn id(&self) -> NodeId {
        self.base.id()
    }

    fn name(&self) -> &'static str {
        "UnionAll"
    }

    fn output_columns(&self) -> &[String] {
        self.base.columns()
    }

    fn initialize(&mut self, ctx: Arc<CommandContext>) {
        for child in &mut self.children {
            child.initialize(ctx.clone());
        }
        self.base.initialize(ctx);
    }

    /// Opens every child so all source requests run concurrently
    fn open(&mut self) -> ExecutorResult<()> {
        self.base.mark_open()?;
        for child in &mut self.children {
            child.open()?;
        }
        Ok(())
    }

    fn next_batch_direct(&mut self) -> ExecutorResult<BatchStatus> {
        if let Some(status) = self.base.finished_status()? {
            return Ok(status);
        }
        loop {
            if self.base.is_full() {
                return self.base.emit(false);
            }
            let Some(child) = self.children.get_mut(self.current) else {
                return self.base.emit(true);
            };
            match child.next_batch_direct()? {
                BatchStatus::Ready(batch) => {
                    if batch.is_terminal() {
                        self.current += 1;
                    }
                    for row in batch.into_rows() {
                        self.base.add_row(row);
                    }
                }
                BatchStatus::Done => self.current += 1,
                BatchStatus::Blocked => return self.base.emit_or_block(),
            }
        }
    }

    fn close(&mut self) -> ExecutorResult<()> {
        if !self.base.mark_closed() {
            return Ok(());
        }
        let mut first_error = None;
        for child in &mut self.children {
            if let Err(e) = child.close() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn cancel(&mut self) {
        self.base.cancel();
        for child in &mut self.children {
            child.cancel();
        }
    }

    fn reset(&mut self) {
        self.base.reset();
        self.current = 0;
        for child in &mut self.children {
            child.reset();
        }
    }

    fn clone_node(&self) -> Box<dyn RelationalNode> {
        Box::new(UnionAllNode {
            base: self.base.fresh_copy(),
            children: self.children.iter().map(|c| c.clone_node()).collect(),
            current: 0,
        })
    }

    fn children(&self) -> Vec<&dyn RelationalNode> {
        self.children.iter().map(|c| c.as_ref()).collect()
    }
}
