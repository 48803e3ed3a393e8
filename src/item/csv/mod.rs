/// CSV support for contact and response tables.
///
/// A [`csv_table::CsvTable`] loads the whole file into memory and writes it
/// back after every mutation, so the file always holds the cursor markers and
/// results of the rows already processed. Rows may have different lengths;
/// short rows are padded with empty cells when read.
///
/// # Examples
///
/// ```
/// use survey_batch::item::csv::csv_table::CsvTableBuilder;
/// use survey_batch::item::table::{CellAddress, Table};
///
/// let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("contacts.csv");
/// std::fs::write(&path, "number;batch\n15550001;\n").unwrap();
///
/// let table = CsvTableBuilder::new().delimiter(b';').open(&path).unwrap();
/// table.write_cell(CellAddress::new(2, 2), "NextBatchStart").unwrap();
///
/// let content = std::fs::read_to_string(&path).unwrap();
/// assert!(content.contains("15550001;NextBatchStart"));
/// ```
pub mod csv_table;
