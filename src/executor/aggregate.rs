//! Grouping node
//!
//! Implements GROUP BY with aggregate functions (COUNT, SUM, AVG, MIN, MAX).
//! Groups are emitted in the order their first row arrived.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::planner::logical::{AggregateFunc, AggregateKind};
use crate::sql::Expr;

use super::collector::{BatchIterator, RowStatus};
use super::context::CommandContext;
use super::datum::Datum;
use super::error::ExecutorResult;
use super::eval::eval_with;
use super::node::NodeBase;
use super::row::Row;
use super::{BatchStatus, NodeId, RelationalNode};

/// Accumulator for a single aggregate function
#[derive(Debug, Clone)]
enum Accumulator {
    Count(i64),
    Sum(Option<Datum>),
    Avg { sum: f64, count: i64 },
    Min(Option<Datum>),
    Max(Option<Datum>),
}

impl Accumulator {
    fn new(kind: AggregateKind) -> Self {
        match kind {
            AggregateKind::Count => Accumulator::Count(0),
            AggregateKind::Sum => Accumulator::Sum(None),
            AggregateKind::Avg => Accumulator::Avg { sum: 0.0, count: 0 },
            AggregateKind::Min => Accumulator::Min(None),
            AggregateKind::Max => Accumulator::Max(None),
        }
    }

    fn accumulate(&mut self, value: &Datum) {
        if value.is_null() {
            return;
        }
        match self {
            Accumulator::Count(n) => *n += 1,
            Accumulator::Sum(sum) => {
                *sum = Some(match (sum.take(), value) {
                    (None, v) => v.clone(),
                    (Some(Datum::Int(a)), Datum::Int(b)) => match a.checked_add(*b) {
                        Some(total) => Datum::Int(total),
                        None => Datum::Float(a as f64 + *b as f64),
                    },
                    (Some(acc), v) => Datum::Float(
                        acc.as_float().unwrap_or(0.0) + v.as_float().unwrap_or(0.0),
                    ),
                });
            }
            Accumulator::Avg { sum, count } => {
                if let Some(v) = value.as_float() {
                    *sum += v;
                    *count += 1;
                }
            }
            Accumulator::Min(min) => {
                if min.as_ref().map_or(true, |m| value < m) {
                    *min = Some(value.clone());
                }
            }
            Accumulator::Max(max) => {
                if max.as_ref().map_or(true, |m| value > m) {
                    *max = Some(value.clone());
                }
            }
        }
    }

    fn finalize(&self) -> Datum {
        match self {
            Accumulator::Count(n) => Datum::Int(*n),
            Accumulator::Sum(sum) => sum.clone().unwrap_or(Datum::Null),
            Accumulator::Avg { sum, count } => {
                if *count == 0 {
                    Datum::Null
                } else {
                    Datum::Float(*sum / *count as f64)
                }
            }
            Accumulator::Min(v) | Accumulator::Max(v) => v.clone().unwrap_or(Datum::Null),
        }
    }
}

#[derive(Debug, Clone)]
struct GroupState {
    keys: Vec<Datum>,
    accumulators: Vec<Accumulator>,
    /// Values already seen, for DISTINCT aggregates
    seen: Vec<HashSet<Datum>>,
}

/// Hash grouping node
pub struct GroupingNode {
    base: NodeBase,
    child: Box<dyn RelationalNode>,
    group_by: Vec<(Expr, String)>,
    aggregates: Vec<(AggregateFunc, String)>,
    input: BatchIterator,
    index: HashMap<Vec<Datum>, usize>,
    groups: Vec<GroupState>,
    /// Output rows, available once the input is exhausted
    output: Option<std::vec::IntoIter<Row>>,
}

impl GroupingNode {
    pub fn new(
        id: NodeId,
        child: Box<dyn RelationalNode>,
        group_by: Vec<(Expr, String)>,
        aggregates: Vec<(AggregateFunc, String)>,
    ) -> Self {
        let columns = group_by
            .iter()
            .map(|(_, n)| n.clone())
            .chain(aggregates.iter().map(|(_, n)| n.clone()))
            .collect();
        Self {
            base: NodeBase::new(id, "Grouping", columns),
            child,
            group_by,
            aggregates,
            input: BatchIterator::new(),
            index: HashMap::new(),
            groups: Vec::new(),
            output: None,
        }
    }

    fn new_group(&self, keys: Vec<Datum>) -> GroupState {
        GroupState {
            keys,
            accumulators: self
                .aggregates
                .iter()
                .map(|(agg, _)| Accumulator::new(agg.kind))
                .collect(),
            seen: vec![HashSet::new(); self.aggregates.len()],
        }
    }

    fn accumulate(&mut self, row: &Row, ctx: &CommandContext) -> ExecutorResult<()> {
        let keys = self
            .group_by
            .iter()
            .map(|(e, _)| eval_with(e, row, ctx))
            .collect::<ExecutorResult<Vec<Datum>>>()?;

        let values = self
            .aggregates
            .iter()
            .map(|(agg, _)| match &agg.arg {
                // COUNT(*) counts every row
                None => Ok(Datum::Int(1)),
                Some(arg) => eval_with(arg, row, ctx),
            })
            .collect::<ExecutorResult<Vec<Datum>>>()?;

        let idx = match self.index.get(&keys) {
            Some(idx) => *idx,
            None => {
                let group = self.new_group(keys.clone());
                self.groups.push(group);
                self.index.insert(keys, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        let group = &mut self.groups[idx];
        for (i, value) in values.iter().enumerate() {
            if self.aggregates[i].0.distinct && !group.seen[i].insert(value.clone()) {
                continue;
            }
            group.accumulators[i].accumulate(value);
        }
        Ok(())
    }

    fn finish(&mut self) -> Vec<Row> {
        // A global aggregate over no rows still yields one row
        if self.groups.is_empty() && self.group_by.is_empty() {
            let group = self.new_group(Vec::new());
            self.groups.push(group);
        }
        std::mem::take(&mut self.groups)
            .into_iter()
            .map(|g| {
                g.keys
                    .into_iter()
                    .chain(g.accumulators.iter().map(Accumulator::finalize))
                    .collect()
            })
            .collect()
    }

    fn clear_state(&mut self) {
        self.input.reset();
        self.index.clear();
        self.groups.clear();
        self.output = None;
    }
}

impl RelationalNode for GroupingNode {
    fn id(&self) -> NodeId {
        self.base.id()
    }

    fn name(&self) -> &'static str {
        "Grouping"
    }

    fn output_columns(&self) -> &[String] {
        self.base.columns()
    }

    fn initialize(&mut self, ctx: Arc<CommandContext>) {
        self.child.initialize(ctx.clone());
        self.base.initialize(ctx);
    }

    fn open(&mut self) -> ExecutorResult<()> {
        self.base.mark_open()?;
        self.child.open()
    }

    fn next_batch_direct(&mut self) -> ExecutorResult<BatchStatus> {
        if let Some(status) = self.base.finished_status()? {
            return Ok(status);
        }
        let ctx = self.base.context()?.clone();

        while self.output.is_none() {
            match self.input.next_row(self.child.as_mut())? {
                RowStatus::Row(row) => self.accumulate(&row, &ctx)?,
                RowStatus::Blocked => return Ok(BatchStatus::Blocked),
                RowStatus::End => {
                    let rows = self.finish();
                    self.output = Some(rows.into_iter());
                }
            }
        }

        let Some(output) = self.output.as_mut() else {
            return Err(self.base.component_error("grouped rows missing"));
        };
        while !self.base.is_full() {
            match output.next() {
                Some(row) => self.base.add_row(row),
                None => return self.base.emit(true),
            }
        }
        let terminal = output.len() == 0;
        self.base.emit(terminal)
    }

    fn close(&mut self) -> ExecutorResult<()> {
        if self.base.mark_closed() {
            self.clear_state();
            self.child.close()?;
        }
        Ok(())
    }

    fn cancel(&mut self) {
        self.base.cancel();
        self.child.cancel();
    }

    fn reset(&mut self) {
        self.base.reset();
        self.clear_state();
        self.child.reset();
    }

    fn clone_node(&self) -> Box<dyn RelationalNode> {
        Box::new(GroupingNode::new(
            self.base.id(),
            self.child.clone_node(),
            self.group_by.clone(),
            self.aggregates.clone(),
        ))
    }

    fn children(&self) -> Vec<&dyn RelationalNode> {
        vec![self.child.as_ref()]
    }

    fn describe(&self) -> String {
        let keys: Vec<String> = self.group_by.iter().map(|(e, _)| e.to_string()).collect();
        let aggs: Vec<String> = self.aggregates.iter().map(|(a, _)| a.to_string()).collect();
        format!("Grouping([{}], [{}])", keys.join(", "), aggs.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::test_utils::{drain_rows, empty_context, ValuesNode};

    fn input() -> Vec<Row> {
        vec![
            Row::new(vec![Datum::from("b"), Datum::Int(10)]),
            Row::new(vec![Datum::from("a"), Datum::Int(1)]),
            Row::new(vec![Datum::from("b"), Datum::Int(20)]),
            Row::new(vec![Datum::from("a"), Datum::Null]),
            Row::new(vec![Datum::from("b"), Datum::Int(10)]),
        ]
    }

    fn grouping(
        rows: Vec<Row>,
        group_by: Vec<(Expr, String)>,
        aggregates: Vec<(AggregateFunc, String)>,
    ) -> Vec<Row> {
        let child = ValuesNode::new(&["k", "v"], rows).blocking();
        let mut node = GroupingNode::new(1, Box::new(child), group_by, aggregates);
        node.initialize(empty_context(2));
        node.open().unwrap();
        drain_rows(&mut node).unwrap()
    }

    fn v() -> Option<Expr> {
        Some(Expr::column("t", "v", 1))
    }

    #[test]
    fn test_group_by_first_seen_order() {
        let rows = grouping(
            input(),
            vec![(Expr::column("t", "k", 0), "k".into())],
            vec![
                (AggregateFunc::new(AggregateKind::Count, None), "n".into()),
                (AggregateFunc::new(AggregateKind::Count, v()), "nv".into()),
                (AggregateFunc::new(AggregateKind::Sum, v()), "total".into()),
                (AggregateFunc::new(AggregateKind::Max, v()), "hi".into()),
            ],
        );
        assert_eq!(
            rows,
            vec![
                Row::new(vec![
                    Datum::from("b"),
                    Datum::Int(3),
                    Datum::Int(3),
                    Datum::Int(40),
                    Datum::Int(20)
                ]),
                Row::new(vec![
                    Datum::from("a"),
                    Datum::Int(2),
                    Datum::Int(1),
                    Datum::Int(1),
                    Datum::Int(1)
                ]),
            ]
        );
    }

    #[test]
    fn test_distinct_and_avg() {
        let mut count_distinct = AggregateFunc::new(AggregateKind::Count, v());
        count_distinct.distinct = true;
        let rows = grouping(
            input(),
            vec![],
            vec![
                (count_distinct, "d".into()),
                (AggregateFunc::new(AggregateKind::Avg, v()), "avg".into()),
                (AggregateFunc::new(AggregateKind::Min, v()), "lo".into()),
            ],
        );
        assert_eq!(
            rows,
            vec![Row::new(vec![Datum::Int(3), Datum::Float(10.25), Datum::Int(1)])]
        );
    }

    #[test]
    fn test_global_aggregate_over_empty_input() {
        let rows = grouping(
            vec![],
            vec![],
            vec![
                (AggregateFunc::new(AggregateKind::Count, None), "n".into()),
                (AggregateFunc::new(AggregateKind::Sum, v()), "s".into()),
            ],
        );
        assert_eq!(rows, vec![Row::new(vec![Datum::Int(0), Datum::Null])]);
    }

    #[test]
    fn test_grouped_aggregate_over_empty_input() {
        let rows = grouping(
            vec![],
            vec![(Expr::column("t", "k", 0), "k".into())],
            vec![(AggregateFunc::new(AggregateKind::Count, None), "n".into())],
        );
        assert!(rows.is_empty());
    }
}
