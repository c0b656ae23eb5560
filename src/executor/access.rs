//! Access node
//!
//! Leaf operator that sends one command to one physical source and streams
//! back its rows.

use std::sync::Arc;

use tracing::debug;

use crate::datamgr::{SourceHandle, SourcePoll, SourceRequest};
use crate::sql::rewriter::{selects_nothing, simplify_command};
use crate::sql::{Command, Expr, Literal};

use super::context::{CommandContext, VariableLookup};
use super::error::{ExecutorError, ExecutorResult};
use super::node::NodeBase;
use super::{BatchStatus, NodeId, RelationalNode};

/// Access node
pub struct AccessNode {
    base: NodeBase,
    model: String,
    source: String,
    connector: String,
    command: Command,
    /// Outstanding request; `None` before open and when nothing was sent
    handle: Option<SourceHandle>,
    source_done: bool,
}

impl AccessNode {
    pub fn new(
        id: NodeId,
        columns: Vec<String>,
        model: impl Into<String>,
        source: impl Into<String>,
        connector: impl Into<String>,
        command: Command,
    ) -> Self {
        Self {
            base: NodeBase::new(id, "Access", columns),
            model: model.into(),
            source: source.into(),
            connector: connector.into(),
            command,
            handle: None,
            source_done: false,
        }
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn release(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if handle.close() {
                debug!(
                    request_id = self.base.request_id(),
                    node_id = self.base.id(),
                    source = %self.source,
                    "released source request"
                );
            }
        }
    }
}

/// Replace procedure variables in `command` with their current values
pub fn bind_variables(command: &Command, vars: &dyn VariableLookup) -> ExecutorResult<Command> {
    let mut bound = command.clone();
    let mut error = None;
    bound.transform_exprs(&mut |e| match e {
        Expr::Variable(name) => match vars.lookup(&name).map(Literal::from) {
            Some(lit) => Expr::Literal(lit),
            None => {
                error.get_or_insert(ExecutorError::UnknownVariable(name.clone()));
                Expr::Variable(name)
            }
        },
        other => other,
    });
    match error {
        Some(e) => Err(e),
        None => Ok(bound),
    }
}

impl RelationalNode for AccessNode {
    fn id(&self) -> NodeId {
        self.base.id()
    }

    fn name(&self) -> &'static str {
        "Access"
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

        let mut command = bind_variables(&self.command, ctx.as_ref())?;
        simplify_command(&mut command);
        if !command.is_update() && selects_nothing(&command) {
            self.source_done = true;
            return Ok(());
        }

        let request = SourceRequest {
            request_id: ctx.request_id().to_string(),
            node_id: self.base.id(),
            model: self.model.clone(),
            source: self.source.clone(),
            connector: self.connector.clone(),
            command,
        };
        self.handle = Some(ctx.data_manager().register_request(request, &ctx)?);
        Ok(())
    }

    fn next_batch_direct(&mut self) -> ExecutorResult<BatchStatus> {
        if let Some(status) = self.base.finished_status()? {
            return Ok(status);
        }
        let width = self.base.columns().len();
        loop {
            if self.source_done {
                return self.base.emit(true);
            }
            if self.base.is_full() {
                return self.base.emit(false);
            }
            let handle = match self.handle.as_mut() {
                Some(h) => h,
                None => return Err(self.base.component_error("no source request")),
            };
            match handle.poll()? {
                SourcePoll::Batch(batch) => {
                    for row in batch.rows {
                        if row.len() != width {
                            return Err(self.base.component_error(format!(
                                "source row has {} values, expected {}",
                                row.len(),
                                width
                            )));
                        }
                        self.base.add_row(row);
                    }
                    if batch.last {
                        self.source_done = true;
                        self.release();
                    }
                }
                SourcePoll::Blocked => return self.base.emit_or_block(),
            }
        }
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
        self.source_done = false;
    }

    fn clone_node(&self) -> Box<dyn RelationalNode> {
        Box::new(AccessNode {
            base: self.base.fresh_copy(),
            model: self.model.clone(),
            source: self.source.clone(),
            connector: self.connector.clone(),
            command: self.command.clone(),
            handle: None,
            source_done: false,
        })
    }

    fn describe(&self) -> String {
        format!("Access({}) {}", self.source, self.command)
    }
}
