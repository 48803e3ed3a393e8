use thiserror::Error;

#[derive(Error, Debug)]
/// Batch error
pub enum BatchError {
    #[error("ItemWriter from: {0}")]
    ItemWriter(String),

    #[error("ItemReader from: {0}")]
    ItemReader(String),

    #[error("ItemProcessor from: {0}")]
    ItemProcessor(String),

    #[error("Step {0} failed")]
    Step(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Table error: {0}")]
    Table(String),

    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// No route is configured for the locale code found on a row.
    #[error("No route configured for locale '{locale}' (row {row})")]
    UnknownLocale { locale: String, row: usize },

    /// A `PreviousBatchStart` marker exists but no `NextBatchStart` does, so the
    /// cursor would fall back to the first row and message every contact again.
    #[error(
        "Batching appears to be completed (PreviousBatchStart at row {previous_row}) but the batch start is back at the first row"
    )]
    CursorInconsistency { previous_row: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
