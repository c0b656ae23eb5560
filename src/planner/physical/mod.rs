//! Physical planning
//!
//! Converts a rewritten logical plan into a tree of executable relational
//! nodes. Every access must already be bound to a source.

pub mod planner;

pub use planner::PhysicalPlanner;

use crate::executor::NodeId;

/// Hands out node ids in pre-order, starting at 1
#[derive(Debug)]
pub struct NodeIdAllocator {
    next: NodeId,
}

impl Default for NodeIdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl NodeIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> NodeId {
        let id = self.next;
        self.next += 1;
        id
    }
}
