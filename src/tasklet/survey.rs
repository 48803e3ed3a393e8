//! # Survey batch tasklet
//!
//! Sends one batch of survey messages per execution. The table is both the
//! contact list and the cursor store:
//!
//! 1. the start row is located and its `NextBatchStart` marker consumed;
//! 2. rows `start..=start + batch_size` are turned into requests, dispatched
//!    and their results recorded, one row at a time;
//! 3. `NextBatchStart` is written on the row after the batch, or, when the
//!    table is exhausted, every recurring trigger is cancelled.
//!
//! A `PreviousBatchStart` marker without any `NextBatchStart` means batching
//! already completed and the cursor was lost: the tasklet cancels all
//! triggers and fails before sending anything.
//!
//! ## Example
//!
//! ```
//! use survey_batch::core::scheduler::{IntervalScheduler, Scheduler};
//! use survey_batch::core::step::{RepeatStatus, StepExecution, Tasklet};
//! use survey_batch::item::logger::LoggingClient;
//! use survey_batch::item::payload::{FixedRoutingProcessor, Route};
//! use survey_batch::item::result::AppendResultWriter;
//! use survey_batch::item::table::{MemoryTable, Table};
//! use survey_batch::tasklet::survey::SurveyBatchTaskletBuilder;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), survey_batch::BatchError> {
//! let contacts = MemoryTable::from_rows(&[
//!     &["number", "batch"],
//!     &["15550001", ""],
//!     &["15550002", ""],
//!     &["15550003", ""],
//! ]);
//! let responses = MemoryTable::default();
//! let writer = AppendResultWriter::new(&responses);
//! let processor = FixedRoutingProcessor::new(
//!     Route { flow_id: "FW1".to_string(), sender: "+15559999".to_string() },
//!     0,
//! );
//! let client = LoggingClient::new();
//! let scheduler = IntervalScheduler::new();
//! scheduler.register_recurring(Duration::from_secs(60), "survey")?;
//!
//! let tasklet = SurveyBatchTaskletBuilder::new()
//!     .table(&contacts)
//!     .processor(&processor)
//!     .client(&client)
//!     .writer(&writer)
//!     .scheduler(&scheduler)
//!     .batch_size(1)
//!     .build()?;
//!
//! let mut execution = StepExecution::new("survey");
//! assert_eq!(tasklet.execute(&mut execution)?, RepeatStatus::Continuable);
//! assert_eq!(contacts.read_all()?[3][1], "NextBatchStart");
//!
//! let mut execution = StepExecution::new("survey");
//! assert_eq!(tasklet.execute(&mut execution)?, RepeatStatus::Finished);
//! assert!(scheduler.list_active().is_empty());
//! assert_eq!(client.count(), 3);
//! # Ok(())
//! # }
//! ```

use log::{debug, error, info, warn};
use serde::Deserialize;

use crate::{
    core::{
        cursor::{locate_batch_start, mark_next_start, CursorLayout, NextStart},
        item::{ItemProcessor, ItemWriter},
        scheduler::{terminate, Scheduler},
        step::{RepeatStatus, StepExecution, Tasklet},
    },
    error::BatchError,
    item::{
        payload::{OutboundRequest, TableRow},
        result::{RecordedResult, ResultRow},
        table::{Row, Table},
    },
    messaging::MessagingClient,
};

/// What happens when a row cannot be built or dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record an error result for the row and continue with the next one.
    #[default]
    Record,
    /// Stop the batch and return the error. Nothing is recorded for the row.
    Abort,
}

/// Rows handled by [`SurveyBatchTasklet::process_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// Number of rows processed, successful or not.
    pub processed: usize,
    /// The batch ran past the last row of the table.
    pub reached_end: bool,
}

/// Sends one batch of survey messages per execution.
pub struct SurveyBatchTasklet<'a> {
    table: &'a dyn Table,
    processor: &'a dyn ItemProcessor<TableRow, OutboundRequest>,
    client: &'a dyn MessagingClient,
    writer: &'a dyn ItemWriter<RecordedResult>,
    scheduler: &'a dyn Scheduler,
    layout: CursorLayout,
    batch_size: usize,
    failure_policy: FailurePolicy,
}

impl SurveyBatchTasklet<'_> {
    /// Processes rows `start..=start + batch_size` of the snapshot `values`.
    ///
    /// The first row past the end of the table stops the batch and cancels
    /// all recurring triggers; rows before it are still sent.
    pub fn process_batch(
        &self,
        values: &[Row],
        start: usize,
        step_execution: &mut StepExecution,
    ) -> Result<BatchProgress, BatchError> {
        let mut progress = BatchProgress {
            processed: 0,
            reached_end: false,
        };

        self.writer.open()?;

        for offset in 0..=self.batch_size {
            let row = start + offset;
            if row >= values.len() {
                info!("Row {} is past the end of the table, stopping", row);
                terminate(self.scheduler)?;
                progress.reached_end = true;
                break;
            }

            self.process_row(&values[row], row, step_execution)?;
            progress.processed += 1;
        }

        self.writer.close()?;

        Ok(progress)
    }

    fn process_row(
        &self,
        cells: &Row,
        row: usize,
        step_execution: &mut StepExecution,
    ) -> Result<(), BatchError> {
        let item = TableRow::new(row, cells.clone());
        step_execution.read_count += 1;

        let result = match self.processor.process(&item) {
            Ok(request) => match self.client.dispatch(&request) {
                Ok(response) => {
                    debug!("Row {} dispatched, execution {}", row, response.sid);
                    step_execution.dispatch_count += 1;
                    ResultRow::success(response)
                }
                Err(err) => {
                    step_execution.dispatch_error_count += 1;
                    self.handle_failure(row, err)?
                }
            },
            Err(err) => {
                step_execution.process_error_count += 1;
                self.handle_failure(row, err)?
            }
        };

        self.writer.write(&[RecordedResult { row, result }])?;
        step_execution.write_count += 1;

        Ok(())
    }

    fn handle_failure(&self, row: usize, err: BatchError) -> Result<ResultRow, BatchError> {
        match self.failure_policy {
            FailurePolicy::Record => {
                warn!("Error sending request for row {}: {}", row, err);
                Ok(ResultRow::failure(&err))
            }
            FailurePolicy::Abort => {
                error!("Error sending request for row {}, aborting batch: {}", row, err);
                Err(err)
            }
        }
    }
}

impl Tasklet for SurveyBatchTasklet<'_> {
    fn execute(&self, step_execution: &mut StepExecution) -> Result<RepeatStatus, BatchError> {
        let values = self.table.read_all()?;

        let position = locate_batch_start(self.table, &values, &self.layout)?;
        if let Err(err) = position.check_consistency() {
            error!("{}. Terminating to prevent duplicate messages", err);
            terminate(self.scheduler)?;
            return Err(err);
        }

        info!(
            "Batch starts at row {} ({} rows at most)",
            position.row,
            self.batch_size + 1
        );

        let progress = self.process_batch(&values, position.row, step_execution)?;

        let finished = match mark_next_start(
            self.table,
            &values,
            &self.layout,
            position.row,
            self.batch_size,
        )? {
            NextStart::Marked(row) => {
                info!("Next batch will start at row {}", row);
                progress.reached_end
            }
            NextStart::Exhausted => {
                info!("All rows processed");
                terminate(self.scheduler)?;
                true
            }
        };

        Ok(if finished {
            RepeatStatus::Finished
        } else {
            RepeatStatus::Continuable
        })
    }
}

/// Builder for [`SurveyBatchTasklet`].
///
/// Defaults: one header row, markers in the second column, batches of
/// `batch_size + 1` rows with `batch_size = 20`, failures recorded.
pub struct SurveyBatchTaskletBuilder<'a> {
    table: Option<&'a dyn Table>,
    processor: Option<&'a dyn ItemProcessor<TableRow, OutboundRequest>>,
    client: Option<&'a dyn MessagingClient>,
    writer: Option<&'a dyn ItemWriter<RecordedResult>>,
    scheduler: Option<&'a dyn Scheduler>,
    layout: CursorLayout,
    batch_size: usize,
    failure_policy: FailurePolicy,
}

impl Default for SurveyBatchTaskletBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> SurveyBatchTaskletBuilder<'a> {
    pub fn new() -> Self {
        Self {
            table: None,
            processor: None,
            client: None,
            writer: None,
            scheduler: None,
            layout: CursorLayout::default(),
            batch_size: 20,
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn table(mut self, table: &'a dyn Table) -> Self {
        self.table = Some(table);
        self
    }

    pub fn processor(mut self, processor: &'a dyn ItemProcessor<TableRow, OutboundRequest>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn client(mut self, client: &'a dyn MessagingClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn writer(mut self, writer: &'a dyn ItemWriter<RecordedResult>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn scheduler(mut self, scheduler: &'a dyn Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn layout(mut self, layout: CursorLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn build(self) -> Result<SurveyBatchTasklet<'a>, BatchError> {
        let missing = |name: &str| {
            BatchError::Configuration(format!("{} is required for building the tasklet", name))
        };

        Ok(SurveyBatchTasklet {
            table: self.table.ok_or_else(|| missing("Table"))?,
            processor: self.processor.ok_or_else(|| missing("Processor"))?,
            client: self.client.ok_or_else(|| missing("Messaging client"))?,
            writer: self.writer.ok_or_else(|| missing("Writer"))?,
            scheduler: self.scheduler.ok_or_else(|| missing("Scheduler"))?,
            layout: self.layout,
            batch_size: self.batch_size,
            failure_policy: self.failure_policy,
        })
    }
}
