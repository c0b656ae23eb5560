//! Join node
//!
//! Nested loop join for all join types. The right input is materialized
//! first; the left input is then streamed against it. All loop positions
//! live in the node, so a Blocked child resumes exactly where it stopped.

use std::sync::Arc;

use crate::sql::{Expr, JoinType};

use super::collector::{BatchIterator, RowStatus};
use super::context::CommandContext;
use super::error::ExecutorResult;
use super::eval::eval_criteria;
use super::node::NodeBase;
use super::row::Row;
use super::{BatchStatus, NodeId, RelationalNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinPhase {
    LoadRight,
    Probe,
    UnmatchedRight,
    Finished,
}

/// Nested loop join node
pub struct JoinNode {
    base: NodeBase,
    left: Box<dyn RelationalNode>,
    right: Box<dyn RelationalNode>,
    join_type: JoinType,
    /// Evaluated against left ++ right; `None` joins every pair
    condition: Option<Expr>,
    left_input: BatchIterator,
    right_input: BatchIterator,
    phase: JoinPhase,
    right_rows: Vec<Row>,
    /// For right/full join: which right rows have been matched
    right_matched: Vec<bool>,
    current_left: Option<Row>,
    right_position: usize,
    left_matched: bool,
    unmatched_right_pos: usize,
}

impl JoinNode {
    pub fn new(
        id: NodeId,
        left: Box<dyn RelationalNode>,
        right: Box<dyn RelationalNode>,
        join_type: JoinType,
        condition: Option<Expr>,
    ) -> Self {
        let columns = left
            .output_columns()
            .iter()
            .chain(right.output_columns())
            .cloned()
            .collect();
        Self {
            base: NodeBase::new(id, "Join", columns),
            left,
            right,
            join_type,
            condition,
            left_input: BatchIterator::new(),
            right_input: BatchIterator::new(),
            phase: JoinPhase::LoadRight,
            right_rows: Vec::new(),
            right_matched: Vec::new(),
            current_left: None,
            right_position: 0,
            left_matched: false,
            unmatched_right_pos: 0,
        }
    }

    fn matches(&self, combined: &Row, ctx: &CommandContext) -> ExecutorResult<bool> {
        match &self.condition {
            Some(cond) => eval_criteria(cond, combined, ctx),
            None => Ok(true),
        }
    }

    fn keeps_unmatched_left(&self) -> bool {
        matches!(self.join_type, JoinType::Left | JoinType::Full)
    }

    fn keeps_unmatched_right(&self) -> bool {
        matches!(self.join_type, JoinType::Right | JoinType::Full)
    }

    fn clear_state(&mut self) {
        self.left_input.reset();
        self.right_input.reset();
        self.phase = JoinPhase::LoadRight;
        self.right_rows.clear();
        self.right_matched.clear();
        self.current_left = None;
        self.right_position = 0;
        self.left_matched = false;
        self.unmatched_right_pos = 0;
    }
}

impl RelationalNode for JoinNode {
    fn id(&self) -> NodeId {
        self.base.id()
    }

    fn name(&self) -> &'static str {
        "Join"
    }

    fn output_columns(&self) -> &[String] {
        self.base.columns()
    }

    fn initialize(&mut self, ctx: Arc<CommandContext>) {
        self.left.initialize(ctx.clone());
        self.right.initialize(ctx.clone());
        self.base.initialize(ctx);
    }

    fn open(&mut self) -> ExecutorResult<()> {
        self.base.mark_open()?;
        self.left.open()?;
        self.right.open()
    }

    fn next_batch_direct(&mut self) -> ExecutorResult<BatchStatus> {
        if let Some(status) = self.base.finished_status()? {
            return Ok(status);
        }
        let ctx = self.base.context()?.clone();
        let left_width = self.left.output_columns().len();
        let right_width = self.right.output_columns().len();

        loop {
            if self.base.is_full() {
                return self.base.emit(false);
            }
            match self.phase {
                JoinPhase::LoadRight => match self.right_input.next_row(self.right.as_mut())? {
                    RowStatus::Row(row) => self.right_rows.push(row),
                    RowStatus::Blocked => return Ok(BatchStatus::Blocked),
                    RowStatus::End => {
                        self.right_matched = vec![false; self.right_rows.len()];
                        self.phase = JoinPhase::Probe;
                    }
                },
                JoinPhase::Probe => {
                    let Some(left_row) = self.current_left.clone() else {
                        match self.left_input.next_row(self.left.as_mut())? {
                            RowStatus::Row(row) => {
                                self.current_left = Some(row);
                                self.right_position = 0;
                                self.left_matched = false;
                            }
                            RowStatus::Blocked => return self.base.emit_or_block(),
                            RowStatus::End => {
                                self.phase = if self.keeps_unmatched_right() {
                                    JoinPhase::UnmatchedRight
                                } else {
                                    JoinPhase::Finished
                                };
                            }
                        }
                        continue;
                    };

                    if let Some(right_row) = self.right_rows.get(self.right_position) {
                        let pos = self.right_position;
                        self.right_position += 1;
                        let combined = Row::joined(&left_row, right_row);
                        if self.matches(&combined, &ctx)? {
                            self.left_matched = true;
                            if let Some(flag) = self.right_matched.get_mut(pos) {
                                *flag = true;
                            }
                            self.base.add_row(combined);
                        }
                        continue;
                    }

                    // Right side exhausted for this left row
                    if !self.left_matched && self.keeps_unmatched_left() {
                        self.base
                            .add_row(Row::joined(&left_row, &Row::nulls(right_width)));
                    }
                    self.current_left = None;
                }
                JoinPhase::UnmatchedRight => {
                    let pos = self.unmatched_right_pos;
                    match self.right_rows.get(pos) {
                        Some(right_row) => {
                            self.unmatched_right_pos += 1;
                            if !self.right_matched[pos] {
                                let padded = Row::joined(&Row::nulls(left_width), right_row);
                                self.base.add_row(padded);
                            }
                        }
                        None => self.phase = JoinPhase::Finished,
                    }
                }
                JoinPhase::Finished => return self.base.emit(true),
            }
        }
    }

    fn close(&mut self) -> ExecutorResult<()> {
        if self.base.mark_closed() {
            self.right_rows.clear();
            self.right_matched.clear();
            self.current_left = None;
            self.left.close()?;
            self.right.close()?;
        }
        Ok(())
    }

    fn cancel(&mut self) {
        self.base.cancel();
        self.left.cancel();
        self.right.cancel();
    }

    fn reset(&mut self) {
        self.base.reset();
        self.clear_state();
        self.left.reset();
        self.right.reset();
    }

    fn clone_node(&self) -> Box<dyn RelationalNode> {
        Box::new(JoinNode::new(
            self.base.id(),
            self.left.clone_node(),
            self.right.clone_node(),
            self.join_type,
            self.condition.clone(),
        ))
    }

    fn children(&self) -> Vec<&dyn RelationalNode> {
        vec![self.left.as_ref(), self.right.as_ref()]
    }

    fn describe(&self) -> String {
        match &self.condition {
            Some(c) => format!("Join({:?}, {})", self.join_type, c),
            None => format!("Join({:?})", self.join_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::datum::Datum;
    use crate::executor::test_utils::{drain_rows, empty_context, int_rows, ValuesNode};

    fn join(join_type: JoinType, left: &[i64], right: &[i64], blocking: bool) -> Vec<Row> {
        let mut l = ValuesNode::new(&["l"], int_rows(left));
        let mut r = ValuesNode::new(&["r"], int_rows(right));
        if blocking {
            l = l.blocking();
            r = r.blocking();
        }
        let condition = Expr::eq(Expr::column("a", "l", 0), Expr::column("b", "r", 1));
        let condition = (join_type != JoinType::Cross).then_some(condition);
        let mut node = JoinNode::new(1, Box::new(l), Box::new(r), join_type, condition);
        node.initialize(empty_context(2));
        node.open().unwrap();
        drain_rows(&mut node).unwrap()
    }

    fn pair(l: Option<i64>, r: Option<i64>) -> Row {
        let d = |v: Option<i64>| v.map(Datum::Int).unwrap_or(Datum::Null);
        Row::new(vec![d(l), d(r)])
    }

    #[test]
    fn test_inner_join() {
        let rows = join(JoinType::Inner, &[1, 2, 3], &[2, 3, 4], true);
        assert_eq!(rows, vec![pair(Some(2), Some(2)), pair(Some(3), Some(3))]);
    }

    #[test]
    fn test_left_join() {
        let rows = join(JoinType::Left, &[1, 2], &[2], false);
        assert_eq!(rows, vec![pair(Some(1), None), pair(Some(2), Some(2))]);
    }

    #[test]
    fn test_right_join() {
        let rows = join(JoinType::Right, &[2], &[1, 2], true);
        assert_eq!(rows, vec![pair(Some(2), Some(2)), pair(None, Some(1))]);
    }

    #[test]
    fn test_full_join() {
        let rows = join(JoinType::Full, &[1, 2], &[2, 3], false);
        assert_eq!(
            rows,
            vec![
                pair(Some(1), None),
                pair(Some(2), Some(2)),
                pair(None, Some(3)),
            ]
        );
    }

    #[test]
    fn test_cross_join() {
        let rows = join(JoinType::Cross, &[1, 2], &[3, 4], true);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1], pair(Some(1), Some(4)));
    }

    #[test]
    fn test_outer_join_with_empty_side() {
        let rows = join(JoinType::Left, &[5], &[], false);
        assert_eq!(rows, vec![pair(Some(5), None)]);
    }
}
