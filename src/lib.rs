//! fedql - federated relational execution engine
//!
//! Features:
//! - Batch-pull relational operators that never block on source I/O
//! - Rule-based plan rewriting with multi-source fan-out
//! - Batched update consolidation
//! - A resumable procedure interpreter over nested plans

pub mod catalog;
pub mod config;
pub mod datamgr;
pub mod executor;
pub mod planner;
pub mod procedure;
pub mod sql;
