//! Relational executor - batch pull model
//!
//! A physical plan is a tree of `RelationalNode`s. The root is pulled with
//! `next_batch_direct()`; each call returns a numbered batch of rows, a
//! Blocked signal when a source has not answered yet, or Done once the
//! terminal batch was handed out. Nodes never wait on I/O: a Blocked result
//! is retried later by the driver.

pub mod access;
pub mod aggregate;
pub mod batch;
pub mod batched_update;
pub mod buffer;
pub mod collector;
pub mod context;
pub mod datum;
pub mod distinct;
pub mod error;
pub mod eval;
pub mod filter;
pub mod join;
pub mod limit;
pub mod node;
pub mod null;
pub mod plan;
pub mod processor;
pub mod project;
pub mod row;
pub mod sort;
pub mod union;

#[cfg(test)]
pub(crate) mod test_utils;

use std::sync::Arc;

pub use batch::{BatchBuilder, TupleBatch};
pub use buffer::{BufferTupleSource, TupleBuffer, TupleSource};
pub use collector::{BatchCollector, BatchIterator, CollectStep, RowStatus};
pub use context::{CommandContext, VariableContext, VariableLookup};
pub use datum::Datum;
pub use error::{ErrorCategory, ExecutorError, ExecutorResult};
pub use plan::{ProcessorPlan, RelationalPlan};
pub use processor::{drive, ProcessStatus, ProcessorState, QueryProcessor};
pub use row::Row;

/// Identifier of a node within one plan
pub type NodeId = u32;

/// Result of asking a node for its next batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchStatus {
    /// Next batch of the stream
    Ready(TupleBatch),
    /// Nothing available yet; ask again later
    Blocked,
    /// The terminal batch was already returned
    Done,
}

/// Anything a `BatchCollector` or `BatchIterator` can pull from
pub trait BatchProducer {
    fn next_batch(&mut self) -> ExecutorResult<BatchStatus>;
}

/// Executable relational operator
///
/// Lifecycle:
/// - `initialize()`: bind the request context (recursively)
/// - `open()`: start work, including source requests
/// - `next_batch_direct()`: produce the next batch
/// - `close()`: release resources; repeated calls are no-ops
///
/// `reset()` returns the node to its pre-open state so the same tree can be
/// executed again. `clone_node()` copies configuration only.
pub trait RelationalNode: Send {
    fn id(&self) -> NodeId;

    /// Operator name used in plan descriptions and logs
    fn name(&self) -> &'static str;

    /// Output element names, one per value in each row
    fn output_columns(&self) -> &[String];

    fn initialize(&mut self, ctx: Arc<CommandContext>);

    fn open(&mut self) -> ExecutorResult<()>;

    fn next_batch_direct(&mut self) -> ExecutorResult<BatchStatus>;

    fn close(&mut self) -> ExecutorResult<()>;

    /// Stop producing rows and cancel outstanding source requests
    fn cancel(&mut self);

    fn reset(&mut self);

    fn clone_node(&self) -> Box<dyn RelationalNode>;

    fn children(&self) -> Vec<&dyn RelationalNode> {
        Vec::new()
    }

    /// One-line description of this node's configuration
    fn describe(&self) -> String {
        self.name().to_string()
    }
}

impl BatchProducer for dyn RelationalNode {
    fn next_batch(&mut self) -> ExecutorResult<BatchStatus> {
        self.next_batch_direct()
    }
}

impl Clone for Box<dyn RelationalNode> {
    fn clone(&self) -> Self {
        self.clone_node()
    }
}
