//! Tuple batches
//!
//! A `TupleBatch` is a contiguous window of a node's output. Row numbers are
//! 1-based and continue across the whole stream; the batch holding the final
//! row carries the terminal flag.

use super::error::{ExecutorError, ExecutorResult};
use super::row::Row;

/// Bounded, positioned group of result rows
#[derive(Debug, Clone, PartialEq)]
pub struct TupleBatch {
    begin_row: usize,
    rows: Vec<Row>,
    terminal: bool,
}

impl TupleBatch {
    /// Create a batch starting at `begin_row`
    ///
    /// Only the terminal batch may be empty.
    pub fn new(begin_row: usize, rows: Vec<Row>, terminal: bool) -> ExecutorResult<Self> {
        if begin_row == 0 {
            return Err(ExecutorError::Buffer("row numbers start at 1".to_string()));
        }
        if rows.is_empty() && !terminal {
            return Err(ExecutorError::Buffer(format!(
                "empty non-terminal batch at row {}",
                begin_row
            )));
        }
        Ok(Self {
            begin_row,
            rows,
            terminal,
        })
    }

    /// Empty terminal batch following `highest_row`
    pub fn terminal_after(highest_row: usize) -> Self {
        Self {
            begin_row: highest_row + 1,
            rows: Vec::new(),
            terminal: true,
        }
    }

    pub fn begin_row(&self) -> usize {
        self.begin_row
    }

    /// Last row number; `begin_row - 1` for an empty batch
    pub fn end_row(&self) -> usize {
        self.begin_row + self.rows.len() - 1
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Get a row by its stream row number
    pub fn row(&self, row_number: usize) -> Option<&Row> {
        if row_number < self.begin_row {
            return None;
        }
        self.rows.get(row_number - self.begin_row)
    }
}

/// Accumulates output rows and cuts them into correctly numbered batches
#[derive(Debug, Clone)]
pub struct BatchBuilder {
    batch_size: usize,
    pending: Vec<Row>,
    next_row: usize,
    terminated: bool,
}

impl BatchBuilder {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pending: Vec::new(),
            next_row: 1,
            terminated: false,
        }
    }

    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size.max(1);
    }

    pub fn add_row(&mut self, row: Row) {
        self.pending.push(row);
    }

    pub fn pending_rows(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.batch_size
    }

    /// True once the terminal batch has been cut
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Highest row number handed out so far
    pub fn highest_row(&self) -> usize {
        self.next_row - 1
    }

    /// Cut up to one batch-size of pending rows
    ///
    /// Rows beyond the batch size stay pending; the terminal flag is only
    /// applied once everything pending fits.
    pub fn take_batch(&mut self, terminal: bool) -> ExecutorResult<TupleBatch> {
        if self.terminated {
            return Err(ExecutorError::Buffer(
                "batch requested after terminal batch".to_string(),
            ));
        }
        let take = self.pending.len().min(self.batch_size);
        let rest = self.pending.split_off(take);
        let rows = std::mem::replace(&mut self.pending, rest);
        let terminal = terminal && self.pending.is_empty();
        let batch = TupleBatch::new(self.next_row, rows, terminal)?;
        self.next_row += batch.row_count();
        self.terminated = terminal;
        Ok(batch)
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.next_row = 1;
        self.terminated = false;
    }
}
