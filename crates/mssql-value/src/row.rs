//! Row buffer: one cell per column of the current result schema.

use std::ops::{Index, IndexMut};

use crate::cell::SqlCell;

/// The decoded cells of one row.
///
/// Allocated once per result schema and reused across rows by
/// [`RowBuffer::clear`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBuffer {
    cells: Box<[SqlCell]>,
}

impl RowBuffer {
    /// A buffer of `columns` empty cells.
    #[must_use]
    pub fn new(columns: usize) -> Self {
        Self {
            cells: (0..columns).map(|_| SqlCell::new()).collect(),
        }
    }

    /// Deep copy of the current row.
    #[must_use]
    pub fn clone_row(&self) -> Self {
        self.clone()
    }

    /// Reset every cell to empty.
    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(SqlCell::clear);
    }

    /// Reset the cells from `start` onward.
    pub fn clear_from(&mut self, start: usize) {
        if let Some(tail) = self.cells.get_mut(start..) {
            tail.iter_mut().for_each(SqlCell::clear);
        }
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns whether the buffer has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The cells in column order.
    #[must_use]
    pub fn cells(&self) -> &[SqlCell] {
        &self.cells
    }

    /// Cell at `index`, if in range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SqlCell> {
        self.cells.get(index)
    }

    /// Mutable cell at `index`, if in range.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut SqlCell> {
        self.cells.get_mut(index)
    }
}

impl Index<usize> for RowBuffer {
    type Output = SqlCell;

    fn index(&self, index: usize) -> &SqlCell {
        &self.cells[index]
    }
}

impl IndexMut<usize> for RowBuffer {
    fn index_mut(&mut self, index: usize) -> &mut SqlCell {
        &mut self.cells[index]
    }
}
