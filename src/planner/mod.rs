//! Query planner
//!
//! Turns logical commands into executable processor plans.
//!
//! ## Pipeline
//!
//! ```text
//! Command
//!   → LogicalPlanBuilder::access() → PlanNode
//!   → Optimizer::rewrite() → PlanNode (sources bound, criteria pushed)
//!   → PhysicalPlanner::plan() → RelationalNode tree
//! ```
//!
//! Procedures and batched updates enter through `Optimizer::optimize` as a
//! `LogicalCommand` and are compiled by `ProcedurePlanner` and
//! `BatchedUpdatePlanner` respectively.
//!
//! ## Example
//!
//! ```ignore
//! use fedql::planner::{LogicalCommand, LogicalPlanBuilder, Optimizer};
//!
//! let plan = LogicalPlanBuilder::new(&catalog).scan("pm.parts", &["id"])?;
//! let executable = Optimizer::new().optimize(LogicalCommand::Query(plan), &catalog, &caps, &ctx)?;
//! ```

pub mod batched_update;
pub mod error;
pub mod explain;
pub mod logical;
pub mod optimizer;
pub mod physical;
pub mod procedure;

#[cfg(test)]
pub(crate) mod test_utils;

pub use batched_update::BatchedUpdatePlanner;
pub use error::{PlannerError, PlannerResult};
pub use explain::ExplainOutput;
pub use logical::{AccessSpec, Block, LogicalCommand, LogicalPlanBuilder, PlanNode, Statement};
pub use optimizer::{
    Optimizer, OptimizerConfig, OptimizerRule, RuleConstant, RuleContext, RuleStack,
};
pub use physical::PhysicalPlanner;
pub use procedure::ProcedurePlanner;
