//! Buffer rows from all units to sort and paginate them.
//!
//! Every shard ran with the widened window (offset 0, row count up to
//! the end of the requested page), so the real window is applied here,
//! over the combined rows.

use std::{cmp::Ordering, collections::VecDeque};

use crate::router::PaginationContext;

#[derive(Debug)]
pub struct MergeBuffer<T> {
    buffer: VecDeque<T>,
    full: bool,
    skip: usize,
    remaining: Option<usize>,
}

impl<T> Default for MergeBuffer<T> {
    fn default() -> Self {
        Self {
            buffer: VecDeque::new(),
            full: false,
            skip: 0,
            remaining: None,
        }
    }
}

impl<T> MergeBuffer<T> {
    /// Buffer applying the statement's pagination, if it has any.
    pub fn new(pagination: Option<&PaginationContext>) -> Self {
        let mut buffer = Self::default();
        if let Some(pagination) = pagination {
            buffer.skip = usize::try_from(pagination.offset()).unwrap_or(0);
            buffer.remaining = pagination
                .row_count()
                .map(|row_count| usize::try_from(row_count).unwrap_or(0));
        }
        buffer
    }

    /// Add rows from one unit.
    pub fn add(&mut self, rows: impl IntoIterator<Item = T>) {
        self.buffer.extend(rows);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Mark the buffer as full. It will start returning rows now.
    /// Caller is responsible for sorting the buffer if needed.
    pub fn full(&mut self) {
        self.full = true;
        let skip = self.skip.min(self.buffer.len());
        self.buffer.drain(..skip);
        self.skip = 0;
    }

    /// Sort the buffer. Stable, so rows that compare equal keep unit order.
    pub fn sort_by(&mut self, compare: impl FnMut(&T, &T) -> Ordering) {
        self.buffer.make_contiguous().sort_by(compare);
    }
}

impl<T> Iterator for MergeBuffer<T> {
    type Item = T;

    /// Next row in the window. Nothing until the buffer is full.
    fn next(&mut self) -> Option<T> {
        if !self.full {
            return None;
        }

        match self.remaining.as_mut() {
            Some(0) => None,
            Some(remaining) => {
                *remaining -= 1;
                self.buffer.pop_front()
            }
            None => self.buffer.pop_front(),
        }
    }
}
