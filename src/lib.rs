#![cfg_attr(docsrs, feature(doc_cfg))]
//#![warn(missing_docs)]

/*!
 # Survey Batch for Rust

 Sends survey messages to a contact table in small batches, one batch per
 invocation, until every row has been contacted. The table is both the
 contact list and the cursor store: a `NextBatchStart` marker cell tells the
 next invocation where to resume, and `PreviousBatchStart` records where the
 last one began.

 ## Core Concepts

- **Job:** One invocation of the batch. A `Job` is composed of one or more `Step`s.
- **Step:** A `TaskletStep` runs the survey tasklet once and reports whether more work remains.
- **Table:** A grid of string cells addressed by row and column (`CsvTable`, `MemoryTable`).
- **ItemProcessor:** Turns one contact row into an outbound request (fixed, per-locale or dynamic parameters).
- **MessagingClient:** Starts one flow execution per request.
- **ItemWriter:** Records the dispatch result of each row, in place or in a separate table.
- **Scheduler:** Owns the recurring triggers; they are all cancelled once the table is exhausted.

 ## Features

| **Feature**   | **Description**                                               |
|---------------|---------------------------------------------------------------|
| csv           | Enables the file backed `CsvTable`                            |
| http          | Enables the HTTP `StudioClient`                               |
| logger        | Enables the dry-run `LoggingClient`                           |
| full          | Enables all available features                                |

 ## Getting Started

```rust
# use survey_batch::{
#     core::{
#         job::{Job, JobBuilder},
#         scheduler::{IntervalScheduler, Scheduler},
#         step::{RepeatStatus, StepBuilder},
#     },
#     error::BatchError,
#     item::{
#         logger::LoggingClient,
#         payload::{FixedRoutingProcessor, Route},
#         result::InPlaceResultWriter,
#         table::{MemoryTable, Table},
#     },
#     tasklet::survey::SurveyBatchTaskletBuilder,
# };
# use std::time::Duration;
fn main() -> Result<(), BatchError> {
    let contacts = MemoryTable::from_rows(&[
        &["number", "batch", "", "", "", "", "", ""],
        &["15550001", "", "", "", "", "", "", ""],
        &["15550002", "", "", "", "", "", "", ""],
    ]);

    let processor = FixedRoutingProcessor::new(
        Route { flow_id: "FW1".to_string(), sender: "+15559999".to_string() },
        0,
    );
    let client = LoggingClient::new();
    let writer = InPlaceResultWriter::new(&contacts, 8, &[0, 1])?;
    let scheduler = IntervalScheduler::new();
    scheduler.register_recurring(Duration::from_secs(180), "survey")?;

    let tasklet = SurveyBatchTaskletBuilder::new()
        .table(&contacts)
        .processor(&processor)
        .client(&client)
        .writer(&writer)
        .scheduler(&scheduler)
        .batch_size(20)
        .build()?;

    let step = StepBuilder::new("send-batch").tasklet(&tasklet).build();
    let job = JobBuilder::new().start(&step).build();
    let execution = job.run()?;

    assert_eq!(execution.repeat_status(), RepeatStatus::Finished);
    assert_eq!(contacts.read_all()?[1][3], "dry-run");
    assert!(scheduler.list_active().is_empty());

    Ok(())
}
```

 ## License
 Licensed under either of

 -   Apache License, Version 2.0
     ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
 -   MIT license
     ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)

 at your option.
 */

/// Core module for batch operations
pub mod core;

/// Error types for batch operations
pub mod error;

#[doc(inline)]
pub use error::*;

/// Run configuration loaded from TOML
pub mod config;

/// Tables, row processors and result writers
pub mod item;

/// Clients that start flow executions
pub mod messaging;

/// Set of tasklets
pub mod tasklet;
