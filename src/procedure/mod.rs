//! Procedure execution
//!
//! A procedure is compiled into a `Program` of `Instruction`s whose
//! relational statements carry their own executable plans. `ProcedurePlan`
//! interprets a program as a resumable `ProcessorPlan`.

pub mod instructions;
pub mod plan;
pub mod program;

pub use instructions::Instruction;
pub use plan::ProcedurePlan;
pub use program::Program;
