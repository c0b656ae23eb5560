//! State shared by every relational node

use std::sync::Arc;

use tracing::debug;

use super::batch::BatchBuilder;
use super::context::CommandContext;
use super::error::{ExecutorError, ExecutorResult};
use super::row::Row;
use super::{BatchStatus, NodeId};

/// Node lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Created,
    Open,
    Closed,
}

/// Identity, context binding, lifecycle and output numbering of a node
#[derive(Debug)]
pub struct NodeBase {
    id: NodeId,
    name: &'static str,
    columns: Vec<String>,
    ctx: Option<Arc<CommandContext>>,
    output: BatchBuilder,
    state: NodeState,
    cancelled: bool,
}

impl NodeBase {
    pub fn new(id: NodeId, name: &'static str, columns: Vec<String>) -> Self {
        Self {
            id,
            name,
            columns,
            ctx: None,
            output: BatchBuilder::new(crate::config::DEFAULT_PROCESSOR_BATCH_SIZE),
            state: NodeState::Created,
            cancelled: false,
        }
    }

    /// Same identity and context, fresh state
    pub fn fresh_copy(&self) -> Self {
        let mut copy = Self::new(self.id, self.name, self.columns.clone());
        if let Some(ctx) = &self.ctx {
            copy.initialize(ctx.clone());
        }
        copy
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn initialize(&mut self, ctx: Arc<CommandContext>) {
        self.output.set_batch_size(ctx.batch_size());
        self.ctx = Some(ctx);
    }

    pub fn context(&self) -> ExecutorResult<&Arc<CommandContext>> {
        self.ctx.as_ref().ok_or_else(|| {
            ExecutorError::component("", Some(self.id), format!("{} not initialized", self.name))
        })
    }

    pub fn request_id(&self) -> &str {
        self.ctx.as_ref().map(|c| c.request_id()).unwrap_or("")
    }

    /// Component error attributed to this node
    pub fn component_error(&self, message: impl Into<String>) -> ExecutorError {
        ExecutorError::component(self.request_id(), Some(self.id), message)
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn mark_open(&mut self) -> ExecutorResult<()> {
        if self.state != NodeState::Created {
            return Err(self.component_error(format!(
                "{} opened in state {:?}",
                self.name, self.state
            )));
        }
        self.context()?;
        debug!(
            request_id = self.request_id(),
            node_id = self.id,
            node = self.name,
            "open"
        );
        self.state = NodeState::Open;
        Ok(())
    }

    /// Transition to Closed; false if the node was already closed
    pub fn mark_closed(&mut self) -> bool {
        if self.state == NodeState::Closed {
            return false;
        }
        debug!(
            request_id = self.request_id(),
            node_id = self.id,
            node = self.name,
            rows = self.output.highest_row(),
            "close"
        );
        self.state = NodeState::Closed;
        true
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Status to return before doing any work, if the stream is over
    ///
    /// Pulling an unopened or closed node is a component error.
    pub fn finished_status(&self) -> ExecutorResult<Option<BatchStatus>> {
        if self.state != NodeState::Open {
            return Err(self.component_error(format!(
                "{} pulled in state {:?}",
                self.name, self.state
            )));
        }
        if self.cancelled || self.output.is_terminated() {
            return Ok(Some(BatchStatus::Done));
        }
        Ok(None)
    }

    pub fn add_row(&mut self, row: Row) {
        self.output.add_row(row);
    }

    pub fn is_full(&self) -> bool {
        self.output.is_full()
    }

    pub fn has_pending(&self) -> bool {
        self.output.has_pending()
    }

    /// Cut the next output batch
    pub fn emit(&mut self, terminal: bool) -> ExecutorResult<BatchStatus> {
        Ok(BatchStatus::Ready(self.output.take_batch(terminal)?))
    }

    /// Emit what is pending, or report Blocked when nothing is
    pub fn emit_or_block(&mut self) -> ExecutorResult<BatchStatus> {
        if self.output.has_pending() {
            self.emit(false)
        } else {
            Ok(BatchStatus::Blocked)
        }
    }

    pub fn reset(&mut self) {
        self.output.reset();
        self.state = NodeState::Created;
        self.cancelled = false;
    }
}
