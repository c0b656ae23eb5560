//! Rows carried in tuple batches

use super::datum::Datum;
use super::error::{ExecutorError, ExecutorResult};

/// One tuple; positions follow the producing node's output columns
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Row {
    values: Vec<Datum>,
}

impl Row {
    pub fn new(values: Vec<Datum>) -> Self {
        Row { values }
    }

    pub fn empty() -> Self {
        Row::default()
    }

    pub fn single(value: Datum) -> Self {
        Row {
            values: vec![value],
        }
    }

    /// Row of `width` NULLs, used to pad outer join results
    pub fn nulls(width: usize) -> Self {
        Row {
            values: vec![Datum::Null; width],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `index`; an index past the end is a component error
    pub fn get(&self, index: usize) -> ExecutorResult<&Datum> {
        self.values
            .get(index)
            .ok_or(ExecutorError::ColumnIndexOutOfBounds {
                index,
                row_len: self.values.len(),
            })
    }

    pub fn values(&self) -> &[Datum] {
        &self.values
    }

    /// Left values followed by right values
    pub fn joined(left: &Row, right: &Row) -> Row {
        left.values
            .iter()
            .chain(right.values.iter())
            .cloned()
            .collect()
    }
}

impl From<Vec<Datum>> for Row {
    fn from(values: Vec<Datum>) -> Self {
        Row { values }
    }
}

impl FromIterator<Datum> for Row {
    fn from_iter<T: IntoIterator<Item = Datum>>(iter: T) -> Self {
        Row {
            values: iter.into_iter().collect(),
        }
    }
}
