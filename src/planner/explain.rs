//! EXPLAIN output formatting
//!
//! Formats logical plans, usually after rewriting, for display.

use std::fmt::Write;

use crate::planner::logical::PlanNode;
use crate::sql::JoinType;

/// Format a plan tree for EXPLAIN output
pub struct ExplainOutput;

impl ExplainOutput {
    /// Format a plan as a string, one node per line
    pub fn format(plan: &PlanNode) -> String {
        let mut output = String::new();
        Self::format_node(plan, 0, &mut output);
        output
    }

    fn format_node(plan: &PlanNode, indent: usize, out: &mut String) {
        let prefix = "  ".repeat(indent);

        match plan {
            PlanNode::Access(spec) => {
                let source = spec
                    .source
                    .as_ref()
                    .map(|s| s.name.as_str())
                    .unwrap_or("?");
                let _ = writeln!(out, "{}Access: {}@{}", prefix, spec.model, source);
                let _ = writeln!(out, "{}  command: {}", prefix, spec.command);
            }

            PlanNode::Select { input, criteria } => {
                let _ = writeln!(out, "{}Select: {}", prefix, criteria);
                Self::format_node(input, indent + 1, out);
            }

            PlanNode::Project { input, expressions } => {
                let aliases: Vec<_> = expressions.iter().map(|(_, a)| a.as_str()).collect();
                let _ = writeln!(out, "{}Project: [{}]", prefix, aliases.join(", "));
                Self::format_node(input, indent + 1, out);
            }

            PlanNode::Join {
                left,
                right,
                join_type,
                condition,
            } => {
                let _ = writeln!(out, "{}Join: {}", prefix, join_name(*join_type));
                if let Some(cond) = condition {
                    let _ = writeln!(out, "{}  condition: {}", prefix, cond);
                }
                Self::format_node(left, indent + 1, out);
                Self::format_node(right, indent + 1, out);
            }

            PlanNode::UnionAll { inputs, .. } => {
                let _ = writeln!(out, "{}UnionAll", prefix);
                for input in inputs {
                    Self::format_node(input, indent + 1, out);
                }
            }

            PlanNode::Group {
                input,
                group_by,
                aggregates,
            } => {
                let aggs: Vec<_> = aggregates.iter().map(|(a, _)| a.to_string()).collect();
                let _ = writeln!(out, "{}Grouping", prefix);
                if !group_by.is_empty() {
                    let keys: Vec<_> = group_by.iter().map(|(e, _)| e.to_string()).collect();
                    let _ = writeln!(out, "{}  group by: [{}]", prefix, keys.join(", "));
                }
                if !aggregates.is_empty() {
                    let _ = writeln!(out, "{}  aggregates: [{}]", prefix, aggs.join(", "));
                }
                Self::format_node(input, indent + 1, out);
            }

            PlanNode::Sort { input, order_by } => {
                let keys: Vec<_> = order_by
                    .iter()
                    .map(|(e, asc)| format!("{} {}", e, if *asc { "ASC" } else { "DESC" }))
                    .collect();
                let _ = writeln!(out, "{}Sort: [{}]", prefix, keys.join(", "));
                Self::format_node(input, indent + 1, out);
            }

            PlanNode::Limit {
                input,
                limit,
                offset,
            } => {
                let mut parts = Vec::new();
                if let Some(l) = limit {
                    parts.push(format!("limit={}", l));
                }
                if *offset > 0 {
                    parts.push(format!("offset={}", offset));
                }
                let _ = writeln!(out, "{}Limit: {}", prefix, parts.join(", "));
                Self::format_node(input, indent + 1, out);
            }

            PlanNode::DupRemove { input } => {
                let _ = writeln!(out, "{}DupRemove", prefix);
                Self::format_node(input, indent + 1, out);
            }

            PlanNode::Null { columns } => {
                let _ = writeln!(out, "{}Null: [{}]", prefix, columns.join(", "));
            }

            PlanNode::BatchedUpdate {
                model,
                source,
                commands,
            } => {
                let _ = writeln!(
                    out,
                    "{}BatchedUpdate: {}@{} ({} commands)",
                    prefix,
                    model,
                    source.name,
                    commands.len()
                );
            }
        }
    }
}

fn join_name(join_type: JoinType) -> &'static str {
    match join_type {
        JoinType::Inner => "INNER",
        JoinType::Left => "LEFT OUTER",
        JoinType::Right => "RIGHT OUTER",
        JoinType::Full => "FULL OUTER",
        JoinType::Cross => "CROSS",
    }
}
