//! Batch collection
//!
//! `BatchCollector` drains a producer into a `TupleBuffer`. `BatchIterator`
//! turns a child's batch stream back into rows for operators that work a
//! row at a time.

use super::batch::TupleBatch;
use super::buffer::TupleBuffer;
use super::error::ExecutorResult;
use super::row::Row;
use super::{BatchProducer, BatchStatus};

/// Outcome of a single collection step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectStep {
    /// A batch with this many rows was appended
    Appended(usize),
    /// The producer could not make progress
    Blocked,
    /// The buffer holds the complete result and is closed
    Complete,
}

/// Drains a producer into an owned buffer
#[derive(Debug)]
pub struct BatchCollector {
    buffer: TupleBuffer,
    done: bool,
}

impl BatchCollector {
    pub fn new(buffer: TupleBuffer) -> Self {
        Self {
            buffer,
            done: false,
        }
    }

    /// Pull until the terminal batch or until the producer blocks
    pub fn collect_tuples<P>(&mut self, producer: &mut P) -> ExecutorResult<CollectStep>
    where
        P: BatchProducer + ?Sized,
    {
        loop {
            match self.collect_batch(producer)? {
                CollectStep::Appended(_) => continue,
                step => return Ok(step),
            }
        }
    }

    /// Pull and store at most one batch
    pub fn collect_batch<P>(&mut self, producer: &mut P) -> ExecutorResult<CollectStep>
    where
        P: BatchProducer + ?Sized,
    {
        if self.done {
            return Ok(CollectStep::Complete);
        }
        match producer.next_batch()? {
            BatchStatus::Blocked => Ok(CollectStep::Blocked),
            BatchStatus::Done => {
                self.finish();
                Ok(CollectStep::Complete)
            }
            BatchStatus::Ready(batch) => {
                if batch.is_terminal() {
                    self.buffer.add_tuple_batch(batch)?;
                    self.finish();
                    return Ok(CollectStep::Complete);
                }
                let count = batch.row_count();
                if count > 0 {
                    self.buffer.add_tuple_batch(batch)?;
                }
                Ok(CollectStep::Appended(count))
            }
        }
    }

    fn finish(&mut self) {
        self.buffer.close();
        self.done = true;
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn buffer(&self) -> &TupleBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut TupleBuffer {
        &mut self.buffer
    }

    pub fn into_buffer(self) -> TupleBuffer {
        self.buffer
    }
}

/// Result of pulling one row from a child stream
#[derive(Debug, Clone, PartialEq)]
pub enum RowStatus {
    Row(Row),
    Blocked,
    End,
}

/// Re-slices a producer's batches into single rows
///
/// The iterator holds the current batch, so rows already received are
/// never requested again after a Blocked.
#[derive(Debug, Default, Clone)]
pub struct BatchIterator {
    current: Option<TupleBatch>,
    position: usize,
    done: bool,
}

impl BatchIterator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_row<P>(&mut self, producer: &mut P) -> ExecutorResult<RowStatus>
    where
        P: BatchProducer + ?Sized,
    {
        loop {
            if self.done {
                return Ok(RowStatus::End);
            }
            if let Some(batch) = &self.current {
                if let Some(row) = batch.rows().get(self.position) {
                    self.position += 1;
                    return Ok(RowStatus::Row(row.clone()));
                }
                if batch.is_terminal() {
                    self.done = true;
                    self.current = None;
                    continue;
                }
            }
            match producer.next_batch()? {
                BatchStatus::Ready(batch) => {
                    self.current = Some(batch);
                    self.position = 0;
                }
                BatchStatus::Blocked => return Ok(RowStatus::Blocked),
                BatchStatus::Done => {
                    self.done = true;
                    self.current = None;
                }
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.position = 0;
        self.done = false;
    }
}
