//! Processor plans
//!
//! A `ProcessorPlan` is the root executable object handed to a
//! `QueryProcessor`: either a tree of relational nodes or a procedure.

use std::sync::Arc;

use super::context::CommandContext;
use super::error::ExecutorResult;
use super::{BatchProducer, BatchStatus, RelationalNode};

/// Root executable object
pub trait ProcessorPlan: Send {
    /// Bind the plan to a request context
    fn initialize(&mut self, ctx: Arc<CommandContext>);

    fn open(&mut self) -> ExecutorResult<()>;

    fn next_batch(&mut self) -> ExecutorResult<BatchStatus>;

    /// Release resources; repeated calls are no-ops
    fn close(&mut self) -> ExecutorResult<()>;

    fn cancel(&mut self);

    /// Return to the pre-open state for another execution
    fn reset(&mut self);

    /// Copy with identical configuration and fresh state
    fn clone_plan(&self) -> Box<dyn ProcessorPlan>;

    fn output_columns(&self) -> Vec<String>;

    /// Indented multi-line description
    fn describe(&self) -> String;
}

impl Clone for Box<dyn ProcessorPlan> {
    fn clone(&self) -> Self {
        self.clone_plan()
    }
}

impl BatchProducer for dyn ProcessorPlan {
    fn next_batch(&mut self) -> ExecutorResult<BatchStatus> {
        ProcessorPlan::next_batch(self)
    }
}

/// Plan over a relational node tree
pub struct RelationalPlan {
    root: Box<dyn RelationalNode>,
}

impl RelationalPlan {
    pub fn new(root: Box<dyn RelationalNode>) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &dyn RelationalNode {
        self.root.as_ref()
    }
}

/// Render a node tree, one node per line, children indented
pub fn describe_tree(node: &dyn RelationalNode, depth: usize, out: &mut String) {
    out.push_str(&"  ".repeat(depth));
    out.push_str(&node.describe());
    out.push('\n');
    for child in node.children() {
        describe_tree(child, depth + 1, out);
    }
}

impl ProcessorPlan for RelationalPlan {
    fn initialize(&mut self, ctx: Arc<CommandContext>) {
        self.root.initialize(ctx);
    }

    fn open(&mut self) -> ExecutorResult<()> {
        self.root.open()
    }

    fn next_batch(&mut self) -> ExecutorResult<BatchStatus> {
        self.root.next_batch_direct()
    }

    fn close(&mut self) -> ExecutorResult<()> {
        self.root.close()
    }

    fn cancel(&mut self) {
        self.root.cancel();
    }

    fn reset(&mut self) {
        self.root.reset();
    }

    fn clone_plan(&self) -> Box<dyn ProcessorPlan> {
        Box::new(RelationalPlan {
            root: self.root.clone_node(),
        })
    }

    fn output_columns(&self) -> Vec<String> {
        self.root.output_columns().to_vec()
    }

    fn describe(&self) -> String {
        let mut out = String::new();
        describe_tree(self.root.as_ref(), 0, &mut out);
        out
    }
}
