//! # Batch cursor
//!
//! The cursor is the row where the next batch begins. It lives only in the
//! table: a designated marker column holds at most one `NextBatchStart`
//! (where the next invocation resumes) and any number of
//! `PreviousBatchStart` markers (where earlier invocations started).
//!
//! Locating the start consumes the `NextBatchStart` marker by rewriting it to
//! `PreviousBatchStart` before anything is dispatched, so the same cell is
//! never matched twice.

use std::fmt;

use log::{debug, info};

use crate::{
    error::BatchError,
    item::table::{CellAddress, Row, Table},
};

/// Canonical text of [`Marker::NextStart`].
pub const NEXT_BATCH_START: &str = "NextBatchStart";

/// Canonical text of [`Marker::PreviousStart`].
pub const PREVIOUS_BATCH_START: &str = "PreviousBatchStart";

/// Decoded content of a marker cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    NoMarker,
    NextStart,
    PreviousStart,
}

impl Marker {
    /// Decodes a cell. Whitespace is trimmed and the comparison ignores ASCII
    /// case; anything unrecognised is [`Marker::NoMarker`].
    pub fn decode(cell: &str) -> Marker {
        let cell = cell.trim();
        if cell.eq_ignore_ascii_case(NEXT_BATCH_START) {
            Marker::NextStart
        } else if cell.eq_ignore_ascii_case(PREVIOUS_BATCH_START) {
            Marker::PreviousStart
        } else {
            Marker::NoMarker
        }
    }

    /// Text written into the cell for this marker.
    pub fn as_str(&self) -> &'static str {
        match self {
            Marker::NoMarker => "",
            Marker::NextStart => NEXT_BATCH_START,
            Marker::PreviousStart => PREVIOUS_BATCH_START,
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the cursor lives in a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorLayout {
    /// Number of header rows before the first data row.
    pub header_rows: usize,
    /// 0-based column holding the markers.
    pub marker_column: usize,
}

impl Default for CursorLayout {
    fn default() -> Self {
        Self {
            header_rows: 1,
            marker_column: 1,
        }
    }
}

impl CursorLayout {
    /// Array index of the first data row.
    pub fn first_data_row(&self) -> usize {
        self.header_rows
    }

    fn marker_at(&self, values: &[Row], row: usize) -> Marker {
        values
            .get(row)
            .and_then(|cells| cells.get(self.marker_column))
            .map(|cell| Marker::decode(cell))
            .unwrap_or(Marker::NoMarker)
    }

    fn marker_address(&self, row: usize) -> CellAddress {
        CellAddress::from_index(row, self.marker_column)
    }
}

/// How the start row of a batch was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartSource {
    /// A `NextBatchStart` marker was found (and consumed).
    Marker,
    /// No `NextBatchStart` marker exists; the first data row is used.
    Default,
}

/// Result of a cursor scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPosition {
    /// Array index of the row where the batch starts.
    pub row: usize,
    pub source: StartSource,
    /// Last `PreviousBatchStart` row seen before the scan stopped.
    pub previous_marker_row: Option<usize>,
}

impl CursorPosition {
    /// Fails when the cursor fell back to the first row although earlier
    /// batches already ran. Proceeding would message every contact again.
    pub fn check_consistency(&self) -> Result<(), BatchError> {
        match (self.source, self.previous_marker_row) {
            (StartSource::Default, Some(previous_row)) => {
                Err(BatchError::CursorInconsistency { previous_row })
            }
            _ => Ok(()),
        }
    }
}

/// Outcome of [`mark_next_start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStart {
    /// `NextBatchStart` was written at this array row.
    Marked(usize),
    /// The batch reached the end of the table; nothing was written.
    Exhausted,
}

fn scan(values: &[Row], layout: &CursorLayout) -> CursorPosition {
    let mut previous_marker_row = None;

    for row in layout.first_data_row()..values.len() {
        match layout.marker_at(values, row) {
            Marker::NextStart => {
                return CursorPosition {
                    row,
                    source: StartSource::Marker,
                    previous_marker_row,
                };
            }
            Marker::PreviousStart => previous_marker_row = Some(row),
            Marker::NoMarker => {}
        }
    }

    CursorPosition {
        row: layout.first_data_row(),
        source: StartSource::Default,
        previous_marker_row,
    }
}

/// Finds the start row of the current batch and consumes its marker.
///
/// Data rows are scanned in order. The first `NextBatchStart` wins: its cell
/// is rewritten to `PreviousBatchStart` and its row returned. Without such a
/// marker the first data row is returned and nothing is written.
pub fn locate_batch_start(
    table: &dyn Table,
    values: &[Row],
    layout: &CursorLayout,
) -> Result<CursorPosition, BatchError> {
    let position = scan(values, layout);

    if position.source == StartSource::Marker {
        let address = layout.marker_address(position.row);
        table.write_cell(address, PREVIOUS_BATCH_START)?;
        info!("Next batch start found at {}, marked as consumed", address);
    } else {
        debug!("No next batch start marker, starting at first data row");
    }

    Ok(position)
}

/// Same scan as [`locate_batch_start`], without consuming the marker.
pub fn peek_batch_start(values: &[Row], layout: &CursorLayout) -> CursorPosition {
    scan(values, layout)
}

/// Marks where the next invocation resumes.
///
/// The row following a batch that started at `start` is `start + batch_size + 1`.
/// If it is still a row of the table it receives `NextBatchStart`, otherwise
/// the table is exhausted and nothing is written.
pub fn mark_next_start(
    table: &dyn Table,
    values: &[Row],
    layout: &CursorLayout,
    start: usize,
    batch_size: usize,
) -> Result<NextStart, BatchError> {
    let next = start + batch_size + 1;

    if next < values.len() {
        let address = layout.marker_address(next);
        table.write_cell(address, NEXT_BATCH_START)?;
        debug!("Next batch start marked at {}", address);
        Ok(NextStart::Marked(next))
    } else {
        Ok(NextStart::Exhausted)
    }
}

/// Sets a restart point chosen by an operator.
///
/// `data_row` is 0-based among data rows. Every other `NextBatchStart`
/// marker is cleared so that at most one remains.
pub fn mark_resume_point(
    table: &dyn Table,
    values: &[Row],
    layout: &CursorLayout,
    data_row: usize,
) -> Result<usize, BatchError> {
    let row = layout.first_data_row() + data_row;
    if row >= values.len() {
        return Err(BatchError::Configuration(format!(
            "Data row {} is out of range, the table has {} data rows",
            data_row,
            values.len().saturating_sub(layout.first_data_row())
        )));
    }

    for other in layout.first_data_row()..values.len() {
        if other != row && layout.marker_at(values, other) == Marker::NextStart {
            table.write_cell(layout.marker_address(other), Marker::NoMarker.as_str())?;
        }
    }

    let address = layout.marker_address(row);
    table.write_cell(address, NEXT_BATCH_START)?;
    info!("Resume point set at {}", address);

    Ok(row)
}

#[cfg(test)]
mod tests {
    use crate::item::table::{MemoryTable, Row, Table};

    use super::*;

    fn contacts(markers: &[&str]) -> MemoryTable {
        let mut rows: Vec<Row> = vec![vec!["number".to_string(), "batch".to_string()]];
        for (i, marker) in markers.iter().enumerate() {
            rows.push(vec![format!("1555000{}", i), marker.to_string()]);
        }
        MemoryTable::new(rows)
    }

    fn markers(table: &MemoryTable) -> Vec<String> {
        table.rows().iter().skip(1).map(|row| row[1].clone()).collect()
    }

    #[test]
    fn marker_should_decode_loosely() {
        assert_eq!(Marker::decode("NextBatchStart"), Marker::NextStart);
        assert_eq!(Marker::decode(" nextBatchStart "), Marker::NextStart);
        assert_eq!(Marker::decode("PREVIOUSBATCHSTART"), Marker::PreviousStart);
        assert_eq!(Marker::decode(""), Marker::NoMarker);
        assert_eq!(Marker::decode("Next"), Marker::NoMarker);
    }

    #[test]
    fn marker_should_be_consumed_exactly_once() -> Result<(), BatchError> {
        let table = contacts(&["", "", "", "NextBatchStart", ""]);
        let layout = CursorLayout::default();

        let first = locate_batch_start(&table, &table.read_all()?, &layout)?;
        assert_eq!(first.row, 4);
        assert_eq!(first.source, StartSource::Marker);
        assert_eq!(markers(&table)[3], PREVIOUS_BATCH_START);

        let second = locate_batch_start(&table, &table.read_all()?, &layout)?;
        assert_eq!(second.row, layout.first_data_row());
        assert_eq!(second.source, StartSource::Default);
        assert_eq!(second.previous_marker_row, Some(4));

        Ok(())
    }

    #[test]
    fn virgin_table_should_start_at_first_data_row() -> Result<(), BatchError> {
        let table = contacts(&["", "", ""]);
        let layout = CursorLayout::default();

        let position = locate_batch_start(&table, &table.read_all()?, &layout)?;

        assert_eq!(position.row, 1);
        assert_eq!(position.source, StartSource::Default);
        assert!(position.check_consistency().is_ok());
        assert_eq!(markers(&table), vec!["", "", ""]);

        Ok(())
    }

    #[test]
    fn first_of_several_markers_should_win() -> Result<(), BatchError> {
        let table = contacts(&["", "NextBatchStart", "", "NextBatchStart"]);
        let layout = CursorLayout::default();

        let position = locate_batch_start(&table, &table.read_all()?, &layout)?;

        assert_eq!(position.row, 2);
        assert_eq!(
            markers(&table),
            vec!["", PREVIOUS_BATCH_START, "", NEXT_BATCH_START]
        );

        Ok(())
    }

    #[test]
    fn previous_marker_without_next_should_be_inconsistent() {
        let table = contacts(&["PreviousBatchStart", "", "PreviousBatchStart", ""]);
        let position = peek_batch_start(&table.rows(), &CursorLayout::default());

        let result = position.check_consistency();

        assert!(matches!(
            result,
            Err(BatchError::CursorInconsistency { previous_row: 3 })
        ));
    }

    #[test]
    fn previous_marker_before_next_should_be_consistent() {
        let table = contacts(&["PreviousBatchStart", "", "NextBatchStart"]);
        let position = peek_batch_start(&table.rows(), &CursorLayout::default());

        assert_eq!(position.row, 3);
        assert_eq!(position.previous_marker_row, Some(1));
        assert!(position.check_consistency().is_ok());
    }

    #[test]
    fn peek_should_not_consume_marker() {
        let table = contacts(&["", "NextBatchStart"]);

        let position = peek_batch_start(&table.rows(), &CursorLayout::default());

        assert_eq!(position.row, 2);
        assert_eq!(markers(&table), vec!["", NEXT_BATCH_START]);
    }

    #[test]
    fn next_start_should_touch_only_the_following_row() -> Result<(), BatchError> {
        let table = contacts(&["", "", "", "", "", ""]);
        let layout = CursorLayout::default();

        let next = mark_next_start(&table, &table.read_all()?, &layout, 1, 2)?;

        assert_eq!(next, NextStart::Marked(4));
        assert_eq!(markers(&table), vec!["", "", "", NEXT_BATCH_START, "", ""]);

        Ok(())
    }

    #[test]
    fn next_start_past_the_end_should_be_exhausted() -> Result<(), BatchError> {
        let table = contacts(&["", "", "", "", ""]);
        let layout = CursorLayout::default();

        // 5 data rows (array 1..=5), batch from 4 covers 4, 5, 6
        let next = mark_next_start(&table, &table.read_all()?, &layout, 4, 2)?;

        assert_eq!(next, NextStart::Exhausted);
        assert_eq!(markers(&table), vec!["", "", "", "", ""]);

        Ok(())
    }

    #[test]
    fn resume_point_should_replace_other_next_markers() -> Result<(), BatchError> {
        let table = contacts(&["PreviousBatchStart", "", "NextBatchStart", ""]);
        let layout = CursorLayout::default();

        let row = mark_resume_point(&table, &table.read_all()?, &layout, 1)?;

        assert_eq!(row, 2);
        assert_eq!(
            markers(&table),
            vec![PREVIOUS_BATCH_START, NEXT_BATCH_START, "", ""]
        );

        Ok(())
    }

    #[test]
    fn resume_point_out_of_range_should_fail() {
        let table = contacts(&["", ""]);
        let result = mark_resume_point(&table, &table.rows(), &CursorLayout::default(), 2);
        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }
}
