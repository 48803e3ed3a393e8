//! # Table access
//!
//! A table is the contact list and the cursor store at the same time. It is
//! an ordered sequence of rows, each row a sequence of text cells, where an
//! empty string stands for an empty cell.
//!
//! Snapshots returned by [`Table::read_all`] are indexed from zero, while
//! [`CellAddress`] uses the 1-based scheme spreadsheets expose (`A1` is the
//! top-left cell). [`CellAddress::from_index`] and [`CellAddress::to_index`]
//! are the only places where the offset between the two is applied.
//!
//! ```
//! use survey_batch::item::table::{CellAddress, MemoryTable, Table};
//!
//! let table = MemoryTable::new(vec![
//!     vec!["number".to_string(), "batch".to_string()],
//!     vec!["15550001".to_string(), String::new()],
//! ]);
//!
//! let marker = CellAddress::from_index(1, 1);
//! assert_eq!(marker.to_string(), "B2");
//!
//! table.write_cell(marker, "NextBatchStart").unwrap();
//! assert_eq!(table.read_cell(marker).unwrap(), "NextBatchStart");
//! ```

use std::fmt;

use crate::error::BatchError;

/// In-memory implementation of [`Table`].
pub mod memory;

pub use memory::MemoryTable;

/// A row of cells as read from a table.
pub type Row = Vec<String>;

/// 1-based cell address (row 1, column 1 is `A1`).
///
/// Built only through [`CellAddress::new`] or [`CellAddress::from_index`], so
/// both coordinates are always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellAddress {
    row: usize,
    column: usize,
}

impl CellAddress {
    /// Creates an address from 1-based coordinates.
    ///
    /// # Panics
    /// Panics if either coordinate is zero.
    pub fn new(row: usize, column: usize) -> Self {
        assert!(row > 0 && column > 0, "cell addresses are 1-based");
        Self { row, column }
    }

    /// Converts 0-based snapshot indices into an address.
    pub fn from_index(row: usize, column: usize) -> Self {
        Self {
            row: row + 1,
            column: column + 1,
        }
    }

    /// 1-based row number.
    pub fn row(&self) -> usize {
        self.row
    }

    /// 1-based column number.
    pub fn column(&self) -> usize {
        self.column
    }

    /// Converts the address back into 0-based snapshot indices.
    pub fn to_index(self) -> (usize, usize) {
        (self.row - 1, self.column - 1)
    }

    /// Returns the column part of the A1 notation (`A`, `Z`, `AA`, ...).
    pub fn column_name(&self) -> String {
        let mut name = Vec::new();
        let mut column = self.column;
        while column > 0 {
            let rem = (column - 1) % 26;
            name.push(b'A' + rem as u8);
            column = (column - 1) / 26;
        }
        name.reverse();
        String::from_utf8(name).unwrap_or_default()
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.column_name(), self.row)
    }
}

/// Access to a row-indexed table of cells.
///
/// Implementations use interior mutability so that a table can be shared by
/// reference between the cursor logic and the result writers.
pub trait Table {
    /// Reads the full table as a 2-D array of cells.
    fn read_all(&self) -> Result<Vec<Row>, BatchError>;

    /// Reads a single cell. Cells outside the table read as empty.
    fn read_cell(&self, address: CellAddress) -> Result<String, BatchError>;

    /// Writes a single cell.
    fn write_cell(&self, address: CellAddress, value: &str) -> Result<(), BatchError>;

    /// Writes `values` into consecutive cells of one row, starting at `start`,
    /// as a single update.
    fn write_range(&self, start: CellAddress, values: &[String]) -> Result<(), BatchError>;

    /// Appends a row after the last row of the table.
    fn append_row(&self, values: &[String]) -> Result<(), BatchError>;
}

/// Sets `values` into `rows` starting at the 0-based (`row`, `column`),
/// growing the table with empty cells where needed.
pub(crate) fn set_range(rows: &mut Vec<Row>, row: usize, column: usize, values: &[String]) {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    while rows.len() <= row {
        rows.push(vec![String::new(); width]);
    }
    let target = &mut rows[row];
    let end = column + values.len();
    if target.len() < end {
        target.resize(end, String::new());
    }
    target[column..end].clone_from_slice(values);
}

/// Reads the 0-based (`row`, `column`) cell, empty when out of bounds.
pub(crate) fn get_cell(rows: &[Row], row: usize, column: usize) -> String {
    rows.get(row)
        .and_then(|cells| cells.get(column))
        .cloned()
        .unwrap_or_default()
}
