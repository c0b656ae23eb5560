//! Tuple buffers
//!
//! A `TupleBuffer` holds one intermediate or final result. It is written by a
//! single owner in row order, closed once, and can then be read any number
//! of times through independent cursors.

use tracing::debug;

use super::batch::TupleBatch;
use super::error::{ExecutorError, ExecutorResult};
use super::row::Row;

/// Buffer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Open,
    Closed,
    Removed,
}

/// Append-only store of batches for one result
#[derive(Debug, Clone)]
pub struct TupleBuffer {
    columns: Vec<String>,
    batches: Vec<TupleBatch>,
    highest_row: usize,
    final_row: Option<usize>,
    state: BufferState,
}

impl TupleBuffer {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            batches: Vec::new(),
            highest_row: 0,
            final_row: None,
            state: BufferState::Open,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == BufferState::Closed
    }

    /// Highest row number appended so far
    pub fn highest_row_number(&self) -> usize {
        self.highest_row
    }

    /// Final row number, known once the terminal batch was appended
    pub fn final_row_number(&self) -> Option<usize> {
        self.final_row
    }

    pub fn row_count(&self) -> usize {
        self.highest_row
    }

    /// Append the next batch of the stream
    ///
    /// The batch must begin at `highest_row_number() + 1`. A terminal batch
    /// fixes the final row number.
    pub fn add_tuple_batch(&mut self, batch: TupleBatch) -> ExecutorResult<()> {
        if self.state != BufferState::Open {
            return Err(ExecutorError::Buffer(format!(
                "append to {:?} buffer",
                self.state
            )));
        }
        if self.final_row.is_some() {
            return Err(ExecutorError::Buffer(format!(
                "batch at row {} after terminal batch",
                batch.begin_row()
            )));
        }
        if batch.begin_row() != self.highest_row + 1 {
            return Err(ExecutorError::Buffer(format!(
                "batch begins at row {}, expected {}",
                batch.begin_row(),
                self.highest_row + 1
            )));
        }
        self.highest_row = batch.end_row();
        if batch.is_terminal() {
            self.final_row = Some(self.highest_row);
        }
        if !batch.is_empty() {
            self.batches.push(batch);
        }
        Ok(())
    }

    /// Forbid further appends; a second call is a no-op
    pub fn close(&mut self) {
        if self.state == BufferState::Open {
            if self.final_row.is_none() {
                self.final_row = Some(self.highest_row);
            }
            self.state = BufferState::Closed;
        }
    }

    /// Release all stored rows
    pub fn remove(&mut self) {
        if self.state != BufferState::Removed {
            debug!(rows = self.highest_row, "removing tuple buffer");
        }
        self.batches.clear();
        self.state = BufferState::Removed;
    }

    /// Row by 1-based row number
    pub fn row(&self, row_number: usize) -> Option<&Row> {
        if row_number == 0 || row_number > self.highest_row {
            return None;
        }
        let idx = self
            .batches
            .partition_point(|b| b.end_row() < row_number);
        self.batches.get(idx).and_then(|b| b.row(row_number))
    }

    pub fn batches(&self) -> &[TupleBatch] {
        &self.batches
    }

    /// All rows in order
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.batches.iter().flat_map(|b| b.rows().iter())
    }

    /// Fresh cursor over a closed buffer
    pub fn tuple_source(&self) -> ExecutorResult<BufferTupleSource<'_>> {
        match self.state {
            BufferState::Closed => Ok(BufferTupleSource {
                buffer: self,
                next_row: 1,
            }),
            state => Err(ExecutorError::Buffer(format!(
                "cannot read {:?} buffer",
                state
            ))),
        }
    }
}

/// Row-at-a-time pull interface
pub trait TupleSource {
    /// Next row; `None` once the final row has been returned
    fn next_tuple(&mut self) -> ExecutorResult<Option<Row>>;
}

/// Cursor over a closed `TupleBuffer`
#[derive(Debug)]
pub struct BufferTupleSource<'a> {
    buffer: &'a TupleBuffer,
    next_row: usize,
}

impl BufferTupleSource<'_> {
    /// Row number the next call returns
    pub fn position(&self) -> usize {
        self.next_row
    }
}

impl TupleSource for BufferTupleSource<'_> {
    fn next_tuple(&mut self) -> ExecutorResult<Option<Row>> {
        let last = self.buffer.final_row.unwrap_or(self.buffer.highest_row);
        if self.next_row > last {
            return Ok(None);
        }
        match self.buffer.row(self.next_row) {
            Some(row) => {
                self.next_row += 1;
                Ok(Some(row.clone()))
            }
            None => Err(ExecutorError::Buffer(format!(
                "row {} missing from buffer",
                self.next_row
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::datum::Datum;

    fn batch(begin: usize, count: usize, terminal: bool) -> TupleBatch {
        let rows = (begin..begin + count)
            .map(|i| Row::single(Datum::Int(i as i64)))
            .collect();
        TupleBatch::new(begin, rows, terminal).unwrap()
    }

    #[test]
    fn test_append_and_read() {
        let mut buffer = TupleBuffer::new(vec!["n".into()]);
        buffer.add_tuple_batch(batch(1, 3, false)).unwrap();
        buffer.add_tuple_batch(batch(4, 2, true)).unwrap();
        buffer.close();

        assert_eq!(buffer.final_row_number(), Some(5));
        assert_eq!(buffer.row(4), Some(&Row::single(Datum::Int(4))));

        let mut source = buffer.tuple_source().unwrap();
        let mut seen = Vec::new();
        while let Some(row) = source.next_tuple().unwrap() {
            seen.push(row.get(0).unwrap().as_int().unwrap());
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert!(source.next_tuple().unwrap().is_none());
    }

    #[test]
    fn test_gap_rejected() {
        let mut buffer = TupleBuffer::new(vec![]);
        buffer.add_tuple_batch(batch(1, 2, false)).unwrap();
        let err = buffer.add_tuple_batch(batch(4, 1, true)).unwrap_err();
        assert!(!err.is_processing());
    }

    #[test]
    fn test_write_after_close_rejected() {
        let mut buffer = TupleBuffer::new(vec![]);
        buffer.add_tuple_batch(batch(1, 1, false)).unwrap();
        buffer.close();
        buffer.close();
        assert!(buffer.add_tuple_batch(batch(2, 1, true)).is_err());
        assert_eq!(buffer.final_row_number(), Some(1));
    }

    #[test]
    fn test_open_buffer_not_readable() {
        let buffer = TupleBuffer::new(vec![]);
        assert!(buffer.tuple_source().is_err());
    }

    #[test]
    fn test_removed_buffer() {
        let mut buffer = TupleBuffer::new(vec![]);
        buffer.add_tuple_batch(batch(1, 2, true)).unwrap();
        buffer.close();
        buffer.remove();
        assert_eq!(buffer.state(), BufferState::Removed);
        assert!(buffer.row(1).is_none());
        assert!(buffer.tuple_source().is_err());
    }
}
