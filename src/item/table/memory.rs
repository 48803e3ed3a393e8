use std::cell::RefCell;

use crate::error::BatchError;

use super::{get_cell, set_range, CellAddress, Row, Table};

/// A table held entirely in memory.
///
/// Useful for tests and dry runs. Nothing is persisted.
#[derive(Debug, Default)]
pub struct MemoryTable {
    rows: RefCell<Vec<Row>>,
}

impl MemoryTable {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: RefCell::new(rows),
        }
    }

    /// Builds a table from string slices, handy in tests.
    pub fn from_rows(rows: &[&[&str]]) -> Self {
        Self::new(
            rows.iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        )
    }

    /// Returns a copy of the current rows.
    pub fn rows(&self) -> Vec<Row> {
        self.rows.borrow().clone()
    }
}

impl Table for MemoryTable {
    fn read_all(&self) -> Result<Vec<Row>, BatchError> {
        Ok(self.rows())
    }

    fn read_cell(&self, address: CellAddress) -> Result<String, BatchError> {
        let (row, column) = address.to_index();
        Ok(get_cell(&self.rows.borrow(), row, column))
    }

    fn write_cell(&self, address: CellAddress, value: &str) -> Result<(), BatchError> {
        self.write_range(address, &[value.to_string()])
    }

    fn write_range(&self, start: CellAddress, values: &[String]) -> Result<(), BatchError> {
        let (row, column) = start.to_index();
        set_range(&mut self.rows.borrow_mut(), row, column, values);
        Ok(())
    }

    fn append_row(&self, values: &[String]) -> Result<(), BatchError> {
        self.rows.borrow_mut().push(values.to_vec());
        Ok(())
    }
}
