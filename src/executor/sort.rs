//! Sort node
//!
//! Implements ORDER BY by collecting all rows, sorting them, then emitting
//! them in batches. NULLs sort lowest; equal keys keep input order.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::sql::Expr;

use super::collector::{BatchIterator, RowStatus};
use super::context::CommandContext;
use super::datum::Datum;
use super::error::ExecutorResult;
use super::eval::eval_with;
use super::node::NodeBase;
use super::row::Row;
use super::{BatchStatus, NodeId, RelationalNode};

/// Sort node
pub struct SortNode {
    base: NodeBase,
    child: Box<dyn RelationalNode>,
    /// Order by expressions with ascending flag
    order_by: Vec<(Expr, bool)>,
    input: BatchIterator,
    /// Rows with precomputed sort keys, collected until the input ends
    keyed: Vec<(Vec<Datum>, Row)>,
    /// Sorted output, available once the input is exhausted
    sorted: Option<std::vec::IntoIter<Row>>,
}

impl SortNode {
    pub fn new(id: NodeId, child: Box<dyn RelationalNode>, order_by: Vec<(Expr, bool)>) -> Self {
        let columns = child.output_columns().to_vec();
        Self {
            base: NodeBase::new(id, "Sort", columns),
            child,
            order_by,
            input: BatchIterator::new(),
            keyed: Vec::new(),
            sorted: None,
        }
    }

    fn sort_keyed(&mut self) -> Vec<Row> {
        let order_by = &self.order_by;
        let mut keyed = std::mem::take(&mut self.keyed);
        // sort_by is stable
        keyed.sort_by(|(keys_a, _), (keys_b, _)| {
            for (i, (key_a, key_b)) in keys_a.iter().zip(keys_b.iter()).enumerate() {
                let ascending = order_by.get(i).map(|(_, asc)| *asc).unwrap_or(true);
                let cmp = key_a.cmp(key_b);
                let cmp = if ascending { cmp } else { cmp.reverse() };
                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            Ordering::Equal
        });
        keyed.into_iter().map(|(_, row)| row).collect()
    }
}

impl RelationalNode for SortNode {
    fn id(&self) -> NodeId {
        self.base.id()
    }

    fn name(&self) -> &'static str {
        "Sort"
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

        while self.sorted.is_none() {
            match self.input.next_row(self.child.as_mut())? {
                RowStatus::Row(row) => {
                    let keys = self
                        .order_by
                        .iter()
                        .map(|(e, _)| eval_with(e, &row, ctx.as_ref()))
                        .collect::<ExecutorResult<Vec<Datum>>>()?;
                    self.keyed.push((keys, row));
                }
                RowStatus::Blocked => return Ok(BatchStatus::Blocked),
                RowStatus::End => {
                    let rows = self.sort_keyed();
                    self.sorted = Some(rows.into_iter());
                }
            }
        }

        let Some(sorted) = self.sorted.as_mut() else {
            return Err(self.base.component_error("sorted rows missing"));
        };
        while !self.base.is_full() {
            match sorted.next() {
                Some(row) => self.base.add_row(row),
                None => return self.base.emit(true),
            }
        }
        let terminal = sorted.len() == 0;
        self.base.emit(terminal)
    }

    fn close(&mut self) -> ExecutorResult<()> {
        if self.base.mark_closed() {
            self.keyed.clear();
            self.sorted = None;
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
        self.input.reset();
        self.keyed.clear();
        self.sorted = None;
        self.child.reset();
    }

    fn clone_node(&self) -> Box<dyn RelationalNode> {
        Box::new(SortNode::new(
            self.base.id(),
            self.child.clone_node(),
            self.order_by.clone(),
        ))
    }

    fn children(&self) -> Vec<&dyn RelationalNode> {
        vec![self.child.as_ref()]
    }

    fn describe(&self) -> String {
        let keys: Vec<String> = self
            .order_by
            .iter()
            .map(|(e, asc)| format!("{}{}", e, if *asc { "" } else { " DESC" }))
            .collect();
        format!("Sort({})", keys.join(", "))
    }
}
