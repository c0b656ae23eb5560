//! Command and expression model
//!
//! This module provides:
//! - `ast`: resolved expressions and the commands pushed to sources
//! - `rewriter`: static criteria simplification used by planning rules

pub mod ast;
pub mod rewriter;

pub use ast::*;
