use std::{
    cell::RefCell,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use csv::{ReaderBuilder, Trim, WriterBuilder};
use log::debug;
use tempfile::NamedTempFile;

use crate::{
    error::BatchError,
    item::table::{get_cell, set_range, CellAddress, Row, Table},
};

/// A CSV file used as a durable table.
///
/// The whole file is loaded on open. Every mutation rewrites the file: the
/// rows are serialized into a temporary file created next to the original,
/// which is then renamed over it. A crash therefore leaves either the old or
/// the new content, never a truncated file.
///
/// # Examples
///
/// ```
/// use survey_batch::item::csv::csv_table::CsvTable;
/// use survey_batch::item::table::{CellAddress, Table};
///
/// let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("contacts.csv");
/// std::fs::write(&path, "number,batch\n15550001,\n").unwrap();
///
/// let table = CsvTable::open(&path).unwrap();
/// table.write_cell(CellAddress::new(2, 2), "NextBatchStart").unwrap();
///
/// let content = std::fs::read_to_string(&path).unwrap();
/// assert_eq!(content, "number,batch\n15550001,NextBatchStart\n");
/// ```
pub struct CsvTable {
    path: PathBuf,
    delimiter: u8,
    rows: RefCell<Vec<Row>>,
}

impl CsvTable {
    /// Opens an existing CSV file with a comma delimiter.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BatchError> {
        CsvTableBuilder::new().open(path)
    }

    /// Opens a CSV file, creating it with a single `header` row when it does
    /// not exist yet.
    pub fn open_or_create<P: AsRef<Path>>(path: P, header: &[&str]) -> Result<Self, BatchError> {
        CsvTableBuilder::new().open_or_create(path, header)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), BatchError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let tmp = NamedTempFile::new_in(dir)?;

        {
            let mut wtr = WriterBuilder::new()
                .delimiter(self.delimiter)
                .flexible(true)
                .has_headers(false)
                .from_writer(tmp.as_file());

            for row in self.rows.borrow().iter() {
                wtr.write_record(row)
                    .map_err(|error| BatchError::ItemWriter(error.to_string()))?;
            }
            wtr.flush()?;
        }

        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|error| BatchError::Io(error.error))?;

        debug!("Persisted table {}", self.path.display());
        Ok(())
    }
}

impl Table for CsvTable {
    fn read_all(&self) -> Result<Vec<Row>, BatchError> {
        Ok(self.rows.borrow().clone())
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
        self.persist()
    }

    fn append_row(&self, values: &[String]) -> Result<(), BatchError> {
        self.rows.borrow_mut().push(values.to_vec());
        self.persist()
    }
}

/// A builder for configuring how a [`CsvTable`] is parsed.
///
/// # Default Configuration
///
/// - Delimiter: comma (,)
/// - All cells trimmed
/// - Rows padded with empty cells up to the widest row
#[derive(Debug)]
pub struct CsvTableBuilder {
    delimiter: u8,
}

impl Default for CsvTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvTableBuilder {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<CsvTable, BatchError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|error| {
            BatchError::Table(format!("Unable to open {}: {}", path.display(), error))
        })?;
        let rows = self.parse(file)?;

        debug!("Loaded {} rows from {}", rows.len(), path.display());

        Ok(CsvTable {
            path,
            delimiter: self.delimiter,
            rows: RefCell::new(rows),
        })
    }

    pub fn open_or_create<P: AsRef<Path>>(
        self,
        path: P,
        header: &[&str],
    ) -> Result<CsvTable, BatchError> {
        if path.as_ref().exists() {
            return self.open(path);
        }

        let table = CsvTable {
            path: path.as_ref().to_path_buf(),
            delimiter: self.delimiter,
            rows: RefCell::new(vec![header.iter().map(|name| name.to_string()).collect()]),
        };
        table.persist()?;
        Ok(table)
    }

    fn parse<R: Read>(&self, rdr: R) -> Result<Vec<Row>, BatchError> {
        let mut rdr = ReaderBuilder::new()
            .trim(Trim::All)
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(rdr);

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record.map_err(|error| BatchError::ItemReader(error.to_string()))?;
            rows.push(record.iter().map(str::to_string).collect::<Row>());
        }

        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in rows.iter_mut() {
            row.resize(width, String::new());
        }

        Ok(rows)
    }
}
