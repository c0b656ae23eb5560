//! Query optimizer
//!
//! Rewrites a logical plan by running rules off a `RuleStack` until it is
//! empty, then hands the result to the physical planner. Rules may push
//! follow-up rules; the number of executions is capped by
//! `EngineConfig::max_rule_executions`.

pub mod access_pattern;
pub mod multi_source;
pub mod rules;

pub use access_pattern::ValidateAccessPatterns;
pub use multi_source::PlanSources;
pub use rules::{CleanCriteria, MergeCriteria, PushLimit, PushSelectCriteria, RaiseNull};

use std::fmt;

use tracing::debug;

use crate::catalog::{CapabilitiesFinder, Metadata};
use crate::executor::{CommandContext, ProcessorPlan, RelationalPlan};
use crate::planner::batched_update::BatchedUpdatePlanner;
use crate::planner::error::{PlannerError, PlannerResult};
use crate::planner::logical::{LogicalCommand, PlanNode};
use crate::planner::physical::PhysicalPlanner;
use crate::planner::procedure::ProcedurePlanner;

/// Identifies a rule on the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleConstant {
    MergeCriteria,
    PushSelectCriteria,
    CleanCriteria,
    PlanSources,
    RaiseNull,
    PushLimit,
    ValidateAccessPatterns,
}

impl RuleConstant {
    /// Default execution order
    pub const DEFAULT_ORDER: [RuleConstant; 7] = [
        RuleConstant::MergeCriteria,
        RuleConstant::PushSelectCriteria,
        RuleConstant::CleanCriteria,
        RuleConstant::PlanSources,
        RuleConstant::RaiseNull,
        RuleConstant::PushLimit,
        RuleConstant::ValidateAccessPatterns,
    ];

    pub fn rule(self) -> &'static dyn OptimizerRule {
        match self {
            RuleConstant::MergeCriteria => &MergeCriteria,
            RuleConstant::PushSelectCriteria => &PushSelectCriteria,
            RuleConstant::CleanCriteria => &CleanCriteria,
            RuleConstant::PlanSources => &PlanSources,
            RuleConstant::RaiseNull => &RaiseNull,
            RuleConstant::PushLimit => &PushLimit,
            RuleConstant::ValidateAccessPatterns => &ValidateAccessPatterns,
        }
    }
}

impl fmt::Display for RuleConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rule().name())
    }
}

/// Ordered stack of pending rules; the top executes next
#[derive(Debug, Clone, Default)]
pub struct RuleStack {
    rules: Vec<RuleConstant>,
}

impl RuleStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack that executes `rules` in the given order
    pub fn from_order(rules: &[RuleConstant]) -> Self {
        let mut stack = Self::new();
        for rule in rules.iter().rev() {
            stack.push(*rule);
        }
        stack
    }

    /// Put `rule` on top; a pending copy further down is dropped
    pub fn push(&mut self, rule: RuleConstant) {
        self.remove(rule);
        self.rules.push(rule);
    }

    pub fn pop(&mut self) -> Option<RuleConstant> {
        self.rules.pop()
    }

    pub fn peek(&self) -> Option<RuleConstant> {
        self.rules.last().copied()
    }

    pub fn contains(&self, rule: RuleConstant) -> bool {
        self.rules.contains(&rule)
    }

    pub fn remove(&mut self, rule: RuleConstant) {
        self.rules.retain(|r| *r != rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Everything a rule may consult
pub struct RuleContext<'a> {
    pub metadata: &'a dyn Metadata,
    pub capabilities: &'a dyn CapabilitiesFinder,
    pub command: &'a CommandContext,
}

/// Plan rewrite rule
///
/// Rules must be idempotent on their own output and must not push
/// themselves unconditionally.
pub trait OptimizerRule: Send + Sync {
    /// Rule name for logging and explain output
    fn name(&self) -> &'static str;

    fn execute(
        &self,
        plan: PlanNode,
        ctx: &RuleContext<'_>,
        rules: &mut RuleStack,
    ) -> PlannerResult<PlanNode>;
}

/// Rule catalog used by one optimizer
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    rules: Vec<RuleConstant>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            rules: RuleConstant::DEFAULT_ORDER.to_vec(),
        }
    }
}

impl OptimizerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the rule list
    #[must_use]
    pub fn with_rules(mut self, rules: Vec<RuleConstant>) -> Self {
        self.rules = rules;
        self
    }

    /// Drop one rule from the list
    #[must_use]
    pub fn without(mut self, rule: RuleConstant) -> Self {
        self.rules.retain(|r| *r != rule);
        self
    }

    pub fn rules(&self) -> &[RuleConstant] {
        &self.rules
    }
}

/// Query optimizer that applies a stack of rewrite rules
#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    config: OptimizerConfig,
}

impl Optimizer {
    /// Create a new optimizer with default rules
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Get the names of all configured rules
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.config.rules.iter().map(|r| r.rule().name()).collect()
    }

    /// Plan `command` into an executable plan
    pub fn optimize(
        &self,
        command: LogicalCommand,
        metadata: &dyn Metadata,
        capabilities: &dyn CapabilitiesFinder,
        context: &CommandContext,
    ) -> PlannerResult<Box<dyn ProcessorPlan>> {
        let ctx = RuleContext {
            metadata,
            capabilities,
            command: context,
        };
        match command {
            LogicalCommand::Query(plan) => self.plan_query(plan, &ctx),
            LogicalCommand::BatchedUpdate(commands) => {
                let plan = BatchedUpdatePlanner::plan(commands, metadata, capabilities)?;
                self.plan_query(plan, &ctx)
            }
            LogicalCommand::Procedure(block) => {
                let plan = ProcedurePlanner::new(self, &ctx).plan(block)?;
                Ok(Box::new(plan))
            }
        }
    }

    /// Rewrite and convert one relational plan
    pub fn plan_query(
        &self,
        plan: PlanNode,
        ctx: &RuleContext<'_>,
    ) -> PlannerResult<Box<dyn ProcessorPlan>> {
        let rewritten = self.rewrite(plan, ctx)?;
        let root = PhysicalPlanner::plan(rewritten)?;
        Ok(Box::new(RelationalPlan::new(root)))
    }

    /// Run the rule stack over `plan`
    pub fn rewrite(&self, plan: PlanNode, ctx: &RuleContext<'_>) -> PlannerResult<PlanNode> {
        let max = ctx.command.config().max_rule_executions;
        let mut stack = RuleStack::from_order(&self.config.rules);
        let mut plan = plan;
        let mut executions = 0;
        while let Some(rule) = stack.pop() {
            executions += 1;
            if executions > max {
                return Err(PlannerError::RuleLimitExceeded(max));
            }
            debug!(
                request_id = ctx.command.request_id(),
                rule = rule.rule().name(),
                nodes = plan.node_count(),
                "executing rule"
            );
            plan = rule.rule().execute(plan, ctx, &mut stack)?;
        }
        Ok(plan)
    }
}
