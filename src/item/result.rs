use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;

use crate::{
    core::item::{ItemWriter, ItemWriterResult},
    error::BatchError,
    item::table::{CellAddress, Table},
    messaging::ExecutionResponse,
};

/// Header of a table receiving appended result rows.
pub const RESULT_HEADER: [&str; 6] = [
    "timestamp",
    "status",
    "execution_sid",
    "contact_channel_address",
    "url",
    "error",
];

/// Outcome of one dispatch, as recorded in the table.
///
/// Either all four response fields are set and `error` is empty, or the
/// response fields are empty and `error` describes the failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub timestamp: DateTime<Utc>,
    pub status: Option<String>,
    pub execution_sid: Option<String>,
    pub contact_channel_address: Option<String>,
    pub url: Option<String>,
    pub error: Option<String>,
}

impl ResultRow {
    /// Number of cells a result occupies.
    pub const WIDTH: usize = RESULT_HEADER.len();

    pub fn success(response: ExecutionResponse) -> Self {
        Self {
            timestamp: Utc::now(),
            status: Some(response.status),
            execution_sid: Some(response.sid),
            contact_channel_address: Some(response.contact_channel_address),
            url: Some(response.url),
            error: None,
        }
    }

    pub fn failure(error: &BatchError) -> Self {
        Self {
            timestamp: Utc::now(),
            status: None,
            execution_sid: None,
            contact_channel_address: None,
            url: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn to_cells(&self) -> Vec<String> {
        vec![
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.status.clone().unwrap_or_default(),
            self.execution_sid.clone().unwrap_or_default(),
            self.contact_channel_address.clone().unwrap_or_default(),
            self.url.clone().unwrap_or_default(),
            self.error.clone().unwrap_or_default(),
        ]
    }
}

/// A result bound to the source row it describes (0-based array index).
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedResult {
    pub row: usize,
    pub result: ResultRow,
}

/// Writes each result into the trailing columns of its own row.
///
/// The result occupies the last [`ResultRow::WIDTH`] columns of the table
/// and is written as one range update.
pub struct InPlaceResultWriter<'a> {
    table: &'a dyn Table,
    width: usize,
}

impl<'a> InPlaceResultWriter<'a> {
    /// `width` is the number of columns of the table, header included.
    ///
    /// `reserved` lists the 0-based columns the result must never cover:
    /// recipient, marker and any column read to build a request. A table too
    /// narrow to keep them left of the result columns is rejected.
    pub fn new(table: &'a dyn Table, width: usize, reserved: &[usize]) -> Result<Self, BatchError> {
        if width < ResultRow::WIDTH {
            return Err(BatchError::Configuration(format!(
                "Table has {} columns, at least {} are needed to record results in place",
                width,
                ResultRow::WIDTH
            )));
        }

        let first_result_column = width - ResultRow::WIDTH;
        if let Some(column) = reserved.iter().find(|column| **column >= first_result_column) {
            return Err(BatchError::Configuration(format!(
                "Column {} would be overwritten by results in columns {}..{}",
                CellAddress::from_index(0, *column).column_name(),
                CellAddress::from_index(0, first_result_column).column_name(),
                CellAddress::from_index(0, width - 1).column_name()
            )));
        }

        Ok(Self { table, width })
    }

    fn first_result_column(&self) -> usize {
        self.width - ResultRow::WIDTH
    }
}

impl ItemWriter<RecordedResult> for InPlaceResultWriter<'_> {
    fn write(&self, items: &[RecordedResult]) -> ItemWriterResult {
        for item in items {
            let start = CellAddress::from_index(item.row, self.first_result_column());
            debug!("Recording result of row {} at {}", item.row, start);
            self.table
                .write_range(start, &item.result.to_cells())
                .map_err(|error| BatchError::ItemWriter(error.to_string()))?;
        }
        Ok(())
    }
}

/// Appends each result as a new row of a separate response table.
pub struct AppendResultWriter<'a> {
    table: &'a dyn Table,
}

impl<'a> AppendResultWriter<'a> {
    pub fn new(table: &'a dyn Table) -> Self {
        Self { table }
    }
}

impl ItemWriter<RecordedResult> for AppendResultWriter<'_> {
    fn write(&self, items: &[RecordedResult]) -> ItemWriterResult {
        for item in items {
            self.table
                .append_row(&item.result.to_cells())
                .map_err(|error| BatchError::ItemWriter(error.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        core::item::ItemWriter,
        item::table::{MemoryTable, Table},
    };

    use super::*;

    fn response() -> ExecutionResponse {
        ExecutionResponse {
            status: "active".to_string(),
            sid: "FN0001".to_string(),
            contact_channel_address: "+15551234".to_string(),
            url: "https://studio.example/FN0001".to_string(),
        }
    }

    #[test]
    fn success_and_failure_should_never_mix() {
        let success = ResultRow::success(response()).to_cells();
        assert!(success[..5].iter().all(|cell| !cell.is_empty()));
        assert!(success[5].is_empty());

        let failure = ResultRow::failure(&BatchError::Dispatch("HTTP 400".to_string())).to_cells();
        assert!(!failure[0].is_empty());
        assert!(failure[1..5].iter().all(String::is_empty));
        assert_eq!(failure[5], "Dispatch failed: HTTP 400");
    }

    #[test]
    fn in_place_writer_should_fill_trailing_columns() -> Result<(), BatchError> {
        let table = MemoryTable::from_rows(&[
            &["number", "batch", "timestamp", "status", "sid", "address", "url", "error"],
            &["1555", "", "", "", "", "", "", ""],
            &["1556", "", "", "", "", "", "", ""],
        ]);
        let writer = InPlaceResultWriter::new(&table, 8, &[0, 1])?;

        writer.write(&[RecordedResult {
            row: 2,
            result: ResultRow::success(response()),
        }])?;

        let rows = table.read_all()?;
        assert_eq!(rows[1][2..], vec![""; 6][..]);
        assert_eq!(rows[2][0..2], ["1556", ""]);
        assert_eq!(rows[2][3], "active");
        assert_eq!(rows[2][4], "FN0001");
        assert_eq!(rows[2][7], "");

        Ok(())
    }

    #[test]
    fn narrow_table_should_be_rejected() {
        let table = MemoryTable::from_rows(&[&["number", "batch"]]);
        assert!(InPlaceResultWriter::new(&table, 2, &[0, 1]).is_err());
    }

    #[test]
    fn results_overlapping_the_marker_column_should_be_rejected() {
        // number, batch, then five response columns and no error column
        let table = MemoryTable::from_rows(&[
            &["number", "batch", "timestamp", "status", "sid", "address", "url"],
            &["1555", "", "", "", "", "", ""],
        ]);

        let result = InPlaceResultWriter::new(&table, 7, &[0, 1]);

        assert!(matches!(result, Err(BatchError::Configuration(message)) if message.contains("Column B")));
        assert!(InPlaceResultWriter::new(&table, 8, &[0, 1]).is_ok());
    }

    #[test]
    fn append_writer_should_add_rows() -> Result<(), BatchError> {
        let table = MemoryTable::from_rows(&[&RESULT_HEADER]);
        let writer = AppendResultWriter::new(&table);

        writer.write(&[
            RecordedResult {
                row: 1,
                result: ResultRow::success(response()),
            },
            RecordedResult {
                row: 2,
                result: ResultRow::failure(&BatchError::Dispatch("timeout".to_string())),
            },
        ])?;

        let rows = table.read_all()?;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][2], "FN0001");
        assert_eq!(rows[2][5], "Dispatch failed: timeout");

        Ok(())
    }
}
