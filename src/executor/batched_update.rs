//! BatchedUpdate node
//!
//! Sends several update commands for one physical source as a single
//! batched request and returns one update count row per command, in the
//! original command order. Commands whose criteria are statically false are
//! not sent; their count is 0.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use crate::datamgr::{SourceHandle, SourcePoll, SourceRequest};
use crate::sql::rewriter::{selects_nothing, simplify_command};
use crate::sql::Command;

use super::access::bind_variables;
use super::context::CommandContext;
use super::datum::Datum;
use super::error::ExecutorResult;
use super::node::NodeBase;
use super::row::Row;
use super::{BatchStatus, NodeId, RelationalNode};

/// Batched update node
pub struct BatchedUpdateNode {
    base: NodeBase,
    model: String,
    source: String,
    connector: String,
    commands: Vec<Command>,
    /// Per command: true if it was filtered out at open
    filtered: Vec<bool>,
    handle: Option<SourceHandle>,
    /// Counts received from the source and not yet emitted
    counts: VecDeque<i64>,
    source_done: bool,
    /// Index of the next command to report
    next_command: usize,
}

impl BatchedUpdateNode {
    pub fn new(
        id: NodeId,
        model: impl Into<String>,
        source: impl Into<String>,
        connector: impl Into<String>,
        commands: Vec<Command>,
    ) -> Self {
        Self {
            base: NodeBase::new(id, "BatchedUpdate", vec!["count".to_string()]),
            model: model.into(),
            source: source.into(),
            connector: connector.into(),
            commands,
            filtered: Vec::new(),
            handle: None,
            counts: VecDeque::new(),
            source_done: false,
            next_command: 0,
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Pull counts from the source until one is available or it blocks
    fn fill_counts(&mut self) -> ExecutorResult<bool> {
        while self.counts.is_empty() && !self.source_done {
            let Some(handle) = self.handle.as_mut() else {
                return Err(self.base.component_error("no batched update request"));
            };
            match handle.poll()? {
                SourcePoll::Batch(batch) => {
                    for row in batch.rows {
                        let count = row.get(0).ok().and_then(Datum::as_int).ok_or_else(|| {
                            self.base.component_error("update count row without a count")
                        })?;
                        self.counts.push_back(count);
                    }
                    if batch.last {
                        self.source_done = true;
                        self.release();
                    }
                }
                SourcePoll::Blocked => return Ok(false),
            }
        }
        Ok(true)
    }

    fn submitted(&self) -> usize {
        self.filtered.iter().filter(|f| !**f).count()
    }

    fn release(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if handle.close() {
                debug!(
                    request_id = self.base.request_id(),
                    node_id = self.base.id(),
                    source = %self.source,
                    "released batched update request"
                );
            }
        }
    }
}

impl RelationalNode for BatchedUpdateNode {
    fn id(&self) -> NodeId {
        self.base.id()
    }

    fn name(&self) -> &'static str {
        "BatchedUpdate"
    }

    fn output_columns(&self) -> &[String] {
        self.base.columns()
    }

    fn initialize(&mut self, ctx: Arc<CommandContext>) {
        self.base.initialize(ctx);
    }

    fn open(&mut self) -> ExecutorResult<()> {
        self.base.mark_open()?;
        let ctx = self.base.context()?.clone();

        let mut to_send = Vec::with_capacity(self.commands.len());
        self.filtered = Vec::with_capacity(self.commands.len());
        for command in &self.commands {
            let mut bound = bind_variables(command, ctx.as_ref())?;
            simplify_command(&mut bound);
            let skip = selects_nothing(&bound);
            self.filtered.push(skip);
            if !skip {
                to_send.push(bound);
            }
        }

        if to_send.is_empty() {
            self.source_done = true;
            return Ok(());
        }
        debug!(
            request_id = ctx.request_id(),
            node_id = self.base.id(),
            commands = self.commands.len(),
            submitted = to_send.len(),
            "submitting batched update"
        );
        let request = SourceRequest {
            request_id: ctx.request_id().to_string(),
            node_id: self.base.id(),
            model: self.model.clone(),
            source: self.source.clone(),
            connector: self.connector.clone(),
            command: Command::Batched(to_send),
        };
        self.handle = Some(ctx.data_manager().register_request(request, &ctx)?);
        Ok(())
    }

    fn next_batch_direct(&mut self) -> ExecutorResult<BatchStatus> {
        if let Some(status) = self.base.finished_status()? {
            return Ok(status);
        }
        while self.next_command < self.commands.len() {
            if self.base.is_full() {
                return self.base.emit(false);
            }
            if self.filtered[self.next_command] {
                self.base.add_row(Row::single(Datum::Int(0)));
                self.next_command += 1;
                continue;
            }
            if !self.fill_counts()? {
                return self.base.emit_or_block();
            }
            match self.counts.pop_front() {
                Some(count) => {
                    self.base.add_row(Row::single(Datum::Int(count)));
                    self.next_command += 1;
                }
                None => {
                    return Err(self.base.component_error(format!(
                        "expected {} update counts, got fewer",
                        self.submitted()
                    )))
                }
            }
        }

        // Every command is answered; the source must not have more counts
        while !self.source_done {
            if !self.fill_counts()? {
                return self.base.emit_or_block();
            }
            if !self.counts.is_empty() {
                break;
            }
        }
        if !self.counts.is_empty() {
            return Err(self.base.component_error(format!(
                "expected {} update counts, got {}",
                self.submitted(),
                self.submitted() + self.counts.len()
            )));
        }
        self.base.emit(true)
    }

    fn close(&mut self) -> ExecutorResult<()> {
        if self.base.mark_closed() {
            self.release();
        }
        Ok(())
    }

    fn cancel(&mut self) {
        self.base.cancel();
        if let Some(handle) = self.handle.as_mut() {
            handle.cancel();
        }
    }

    fn reset(&mut self) {
        self.release();
        self.base.reset();
        self.filtered.clear();
        self.counts.clear();
        self.source_done = false;
        self.next_command = 0;
    }

    fn clone_node(&self) -> Box<dyn RelationalNode> {
        let mut copy = BatchedUpdateNode::new(
            self.base.id(),
            self.model.clone(),
            self.source.clone(),
            self.connector.clone(),
            self.commands.clone(),
        );
        copy.base = self.base.fresh_copy();
        Box::new(copy)
    }

    fn describe(&self) -> String {
        format!("BatchedUpdate({}, {} commands)", self.source, self.commands.len())
    }
}
