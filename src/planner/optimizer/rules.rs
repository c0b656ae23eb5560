//! Rewrite rules
//!
//! Criteria placement, null propagation and limit pushdown. Source fan-out
//! and access-pattern validation live in their own modules.

use crate::sql::rewriter::{
    and_criteria, combine_conjuncts, conjuncts, is_false_criteria, is_true_criteria,
    selects_nothing, simplify, simplify_command,
};
use crate::sql::{BinaryOp, Command, Expr, JoinType};

use super::{OptimizerRule, RuleConstant, RuleContext, RuleStack};
use crate::planner::error::PlannerResult;
use crate::planner::logical::{AccessSpec, PlanNode};

/// Merge consecutive Select nodes
pub struct MergeCriteria;

impl OptimizerRule for MergeCriteria {
    fn name(&self) -> &'static str {
        "merge_criteria"
    }

    fn execute(
        &self,
        plan: PlanNode,
        _ctx: &RuleContext<'_>,
        _rules: &mut RuleStack,
    ) -> PlannerResult<PlanNode> {
        Ok(plan.transform(&mut |node| match node {
            PlanNode::Select { input, criteria } => match *input {
                PlanNode::Select {
                    input: inner,
                    criteria: inner_criteria,
                } => PlanNode::Select {
                    input: inner,
                    criteria: Expr::and(inner_criteria, criteria),
                },
                other => PlanNode::Select {
                    input: Box::new(other),
                    criteria,
                },
            },
            other => other,
        }))
    }
}

/// Move Select criteria into the command of the Access below it
///
/// Only conjuncts the source can evaluate are moved; the rest stay in the
/// Select. Criteria never move below a row limit.
pub struct PushSelectCriteria;

impl OptimizerRule for PushSelectCriteria {
    fn name(&self) -> &'static str {
        "push_select_criteria"
    }

    fn execute(
        &self,
        plan: PlanNode,
        ctx: &RuleContext<'_>,
        _rules: &mut RuleStack,
    ) -> PlannerResult<PlanNode> {
        Ok(plan.transform(&mut |node| match node {
            PlanNode::Select { input, criteria } => match *input {
                PlanNode::Access(spec) => push_into_access(spec, criteria, ctx),
                other => PlanNode::Select {
                    input: Box::new(other),
                    criteria,
                },
            },
            other => other,
        }))
    }
}

fn push_into_access(mut spec: AccessSpec, criteria: Expr, ctx: &RuleContext<'_>) -> PlanNode {
    let caps = ctx.capabilities.find_capabilities(&spec.model);
    let Command::Query(query) = &mut spec.command else {
        return PlanNode::Access(spec).select(criteria);
    };
    if !caps.supports_criteria || query.limit.is_some() {
        return PlanNode::Access(spec).select(criteria);
    }

    let mut pushed = Vec::new();
    let mut kept = Vec::new();
    for conjunct in conjuncts(&criteria) {
        let supported = !conjunct.any(&|e| match e {
            Expr::BinaryOp {
                op: BinaryOp::Like | BinaryOp::NotLike,
                ..
            } => !caps.supports_like,
            Expr::InList { .. } => !caps.supports_in_criteria,
            _ => false,
        });
        match supported.then(|| to_source_terms(conjunct, &query.select)).flatten() {
            Some(translated) => pushed.push(translated),
            None => kept.push(conjunct.clone()),
        }
    }

    if let Some(extra) = combine_conjuncts(pushed) {
        query.criteria = Some(and_criteria(query.criteria.take(), extra));
    }
    let access = PlanNode::Access(spec);
    match combine_conjuncts(kept) {
        Some(rest) => access.select(rest),
        None => access,
    }
}

/// Rewrite references to access output positions into the element
/// expressions they select; `None` if any reference is not a plain element
fn to_source_terms(expr: &Expr, select: &[(Expr, String)]) -> Option<Expr> {
    let plain = expr.columns().iter().all(|col| {
        matches!(select.get(col.index), Some((Expr::Column(_), _)))
    });
    if !plain {
        return None;
    }
    Some(expr.clone().transform(&mut |e| match e {
        Expr::Column(col) => select
            .get(col.index)
            .map(|(source, _)| source.clone())
            .unwrap_or(Expr::Column(col)),
        other => other,
    }))
}

/// Simplify criteria; drop always-true Selects and turn provably empty
/// Selects and queries into Null
pub struct CleanCriteria;

impl OptimizerRule for CleanCriteria {
    fn name(&self) -> &'static str {
        "clean_criteria"
    }

    fn execute(
        &self,
        plan: PlanNode,
        _ctx: &RuleContext<'_>,
        rules: &mut RuleStack,
    ) -> PlannerResult<PlanNode> {
        let mut produced_null = false;
        let plan = plan.transform(&mut |node| match node {
            PlanNode::Select { input, criteria } => {
                let criteria = simplify(criteria);
                if is_true_criteria(&criteria) {
                    *input
                } else if is_false_criteria(&criteria) {
                    produced_null = true;
                    PlanNode::Null {
                        columns: input.output_columns(),
                    }
                } else {
                    PlanNode::Select { input, criteria }
                }
            }
            PlanNode::Access(mut spec) => {
                simplify_command(&mut spec.command);
                if !spec.command.is_update() && selects_nothing(&spec.command) {
                    produced_null = true;
                    PlanNode::Null {
                        columns: spec.columns,
                    }
                } else {
                    PlanNode::Access(spec)
                }
            }
            other => other,
        });
        if produced_null {
            rules.push(RuleConstant::RaiseNull);
        }
        Ok(plan)
    }
}

/// Propagate Null nodes upwards
pub struct RaiseNull;

impl OptimizerRule for RaiseNull {
    fn name(&self) -> &'static str {
        "raise_null"
    }

    fn execute(
        &self,
        plan: PlanNode,
        _ctx: &RuleContext<'_>,
        _rules: &mut RuleStack,
    ) -> PlannerResult<PlanNode> {
        Ok(plan.transform(&mut raise_null))
    }
}

fn raise_null(node: PlanNode) -> PlanNode {
    let columns = node.output_columns();
    match node {
        PlanNode::UnionAll { inputs, columns } => {
            let mut live: Vec<PlanNode> = inputs.into_iter().filter(|i| !i.is_null()).collect();
            match live.len() {
                0 => PlanNode::Null { columns },
                1 => live.remove(0),
                _ => PlanNode::UnionAll {
                    inputs: live,
                    columns,
                },
            }
        }
        PlanNode::Join {
            left,
            right,
            join_type,
            condition,
        } => {
            let empty = match join_type {
                JoinType::Inner | JoinType::Cross => left.is_null() || right.is_null(),
                JoinType::Left => left.is_null(),
                JoinType::Right => right.is_null(),
                JoinType::Full => left.is_null() && right.is_null(),
            };
            if empty {
                PlanNode::Null { columns }
            } else {
                PlanNode::Join {
                    left,
                    right,
                    join_type,
                    condition,
                }
            }
        }
        // A global aggregate still yields one row over empty input
        PlanNode::Group {
            input,
            group_by,
            aggregates,
        } => {
            if input.is_null() && !group_by.is_empty() {
                PlanNode::Null { columns }
            } else {
                PlanNode::Group {
                    input,
                    group_by,
                    aggregates,
                }
            }
        }
        node @ (PlanNode::Select { .. }
        | PlanNode::Project { .. }
        | PlanNode::Sort { .. }
        | PlanNode::Limit { .. }
        | PlanNode::DupRemove { .. }) => {
            if node.children().iter().any(|c| c.is_null()) {
                PlanNode::Null { columns }
            } else {
                node
            }
        }
        other => other,
    }
}

/// Push LIMIT (plus OFFSET) into queries whose source supports row limits
///
/// The Limit node stays in place to apply the offset and to cap rows when
/// several accesses are unioned.
pub struct PushLimit;

impl OptimizerRule for PushLimit {
    fn name(&self) -> &'static str {
        "push_limit"
    }

    fn execute(
        &self,
        plan: PlanNode,
        ctx: &RuleContext<'_>,
        _rules: &mut RuleStack,
    ) -> PlannerResult<PlanNode> {
        Ok(plan.transform(&mut |node| match node {
            PlanNode::Limit {
                mut input,
                limit: Some(limit),
                offset,
            } => {
                push_row_limit(&mut input, limit.saturating_add(offset), ctx);
                PlanNode::Limit {
                    input,
                    limit: Some(limit),
                    offset,
                }
            }
            other => other,
        }))
    }
}

fn push_row_limit(node: &mut PlanNode, rows: u64, ctx: &RuleContext<'_>) {
    match node {
        PlanNode::Access(spec) => {
            if !ctx.capabilities.find_capabilities(&spec.model).supports_row_limit {
                return;
            }
            if let Command::Query(query) = &mut spec.command {
                query.limit = Some(query.limit.map_or(rows, |l| l.min(rows)));
            }
        }
        PlanNode::Project { input, .. } => push_row_limit(input, rows, ctx),
        PlanNode::UnionAll { inputs, .. } => {
            for input in inputs {
                push_row_limit(input, rows, ctx);
            }
        }
        _ => {}
    }
}
