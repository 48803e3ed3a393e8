use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use survey_batch::{
    config::{ResultsConfig, SurveyConfig},
    core::{
        cursor::{mark_resume_point, peek_batch_start, StartSource},
        item::ItemWriter,
        job::{Job, JobBuilder},
        scheduler::{start_batching, IntervalScheduler},
        step::StepBuilder,
    },
    item::{
        csv::csv_table::CsvTableBuilder,
        logger::LoggingClient,
        result::{AppendResultWriter, InPlaceResultWriter, RecordedResult, RESULT_HEADER},
        table::{CellAddress, MemoryTable, Table},
    },
    messaging::{studio::StudioClientBuilder, Credentials, MessagingClient},
    tasklet::survey::SurveyBatchTaskletBuilder,
};

#[derive(Parser)]
#[command(
    name = "survey-batch",
    version,
    about = "Sends survey messages to a contact table in batches"
)]
struct Cli {
    /// Path of the TOML configuration file
    #[arg(
        long,
        global = true,
        env = "SURVEY_BATCH_CONFIG",
        default_value = "survey-batch.toml"
    )]
    config: PathBuf,

    /// Log requests instead of sending them; no file is modified
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a single batch
    RunOnce,
    /// Send a batch on every interval until all rows are processed
    Start {
        /// Overrides `interval_minutes` of the configuration
        #[arg(long)]
        interval_minutes: Option<u64>,
        /// Send the first batch now instead of after one interval
        #[arg(long)]
        immediately: bool,
    },
    /// Show where the next batch will start
    Status,
    /// Make the next batch start at the given data row (0 is the first one)
    Resume {
        #[arg(long)]
        row: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = SurveyConfig::from_path(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    let contacts = open_table(&config, &config.table.path, None, cli.dry_run)?;

    match cli.command {
        Command::Status => status(&config, contacts.as_ref()),
        Command::Resume { row } => {
            let values = contacts.read_all()?;
            let row = mark_resume_point(contacts.as_ref(), &values, &config.layout(), row)?;
            println!(
                "Next batch will start at {}",
                CellAddress::from_index(row, config.table.marker_column)
            );
            Ok(())
        }
        Command::RunOnce => {
            let runner = Runner::new(&config, contacts.as_ref(), cli.dry_run)?;
            runner.execute(None).await
        }
        Command::Start {
            interval_minutes,
            immediately,
        } => {
            if let Some(minutes) = interval_minutes {
                config.interval_minutes = minutes;
                config.validate()?;
            }
            let run_immediately = immediately || config.run_immediately;
            let runner = Runner::new(&config, contacts.as_ref(), cli.dry_run)?;
            runner.execute(Some(run_immediately)).await
        }
    }
}

/// Opens a CSV table. A dry run works on an in-memory copy.
fn open_table(
    config: &SurveyConfig,
    path: &Path,
    header: Option<&[&str]>,
    dry_run: bool,
) -> Result<Box<dyn Table>> {
    let builder = CsvTableBuilder::new().delimiter(config.delimiter());

    let table = match header {
        Some(header) => builder.open_or_create(path, header),
        None => builder.open(path),
    }
    .with_context(|| format!("Failed to open {}", path.display()))?;

    if dry_run {
        info!("Dry run, {} will not be modified", path.display());
        return Ok(Box::new(MemoryTable::new(table.read_all()?)));
    }
    Ok(Box::new(table))
}

fn status(config: &SurveyConfig, contacts: &dyn Table) -> Result<()> {
    let layout = config.layout();
    let values = contacts.read_all()?;
    let position = peek_batch_start(&values, &layout);

    let source = match position.source {
        StartSource::Marker => "marker",
        StartSource::Default => "first data row",
    };
    println!(
        "Next batch starts at {} ({})",
        CellAddress::from_index(position.row, layout.marker_column),
        source
    );
    if let Some(previous) = position.previous_marker_row {
        println!(
            "Previous batch started at {}",
            CellAddress::from_index(previous, layout.marker_column)
        );
    }
    println!("Rows left: {}", values.len().saturating_sub(position.row));

    if let Err(err) = position.check_consistency() {
        warn!("{}", err);
    }
    Ok(())
}

/// Owns every collaborator of the survey tasklet.
struct Runner<'a> {
    config: &'a SurveyConfig,
    contacts: &'a dyn Table,
    responses: Option<Box<dyn Table>>,
    client: Box<dyn MessagingClient>,
}

impl<'a> Runner<'a> {
    fn new(config: &'a SurveyConfig, contacts: &'a dyn Table, dry_run: bool) -> Result<Self> {
        let responses = match &config.results {
            ResultsConfig::InPlace => None,
            ResultsConfig::Append { path } => {
                Some(open_table(config, path, Some(&RESULT_HEADER[..]), dry_run)?)
            }
        };

        let client: Box<dyn MessagingClient> = if dry_run {
            Box::new(LoggingClient::new())
        } else {
            let credentials = Credentials::from_env()
                .context("Set ACCOUNT_SID and ACCOUNT_TOKEN or use --dry-run")?;
            Box::new(
                StudioClientBuilder::new()
                    .base_url(&config.messaging.base_url)
                    .credentials(credentials)
                    .timeout(Duration::from_secs(config.messaging.timeout_seconds))
                    .build()?,
            )
        };

        Ok(Self {
            config,
            contacts,
            responses,
            client,
        })
    }

    fn writer(&self, width: usize) -> Result<Box<dyn ItemWriter<RecordedResult> + '_>> {
        let writer: Box<dyn ItemWriter<RecordedResult> + '_> = match &self.responses {
            Some(responses) => Box::new(AppendResultWriter::new(responses.as_ref())),
            None => Box::new(InPlaceResultWriter::new(
                self.contacts,
                width,
                &self.config.reserved_columns(),
            )?),
        };
        Ok(writer)
    }

    /// Sends one batch, or with `recurring` set, batches on the configured
    /// interval until the table is exhausted.
    async fn execute(&self, recurring: Option<bool>) -> Result<()> {
        let scheduler = IntervalScheduler::new();

        let values = self.contacts.read_all()?;
        let header = values.first().cloned().unwrap_or_default();
        let width = values.iter().map(Vec::len).max().unwrap_or(0);

        let processor = self.config.processor(&header, width)?;
        let writer = self.writer(width)?;

        let tasklet = SurveyBatchTaskletBuilder::new()
            .table(self.contacts)
            .processor(processor.as_ref())
            .client(self.client.as_ref())
            .writer(writer.as_ref())
            .scheduler(&scheduler)
            .layout(self.config.layout())
            .batch_size(self.config.batch_size)
            .failure_policy(self.config.messaging.failure_policy)
            .build()?;

        let step = StepBuilder::new("send-batch").tasklet(&tasklet).build();
        let job = JobBuilder::new()
            .name("survey-batch".to_string())
            .start(&step)
            .build();

        match recurring {
            Some(run_immediately) => {
                let invocations =
                    start_batching(&scheduler, &job, self.config.interval(), run_immediately)
                        .await?;
                println!("Batching complete after {} invocation(s)", invocations);
            }
            None => {
                let execution = job.run()?;
                for step in &execution.step_executions {
                    println!(
                        "{}: {} read, {} sent, {} failed, {} skipped, {} recorded",
                        step.name,
                        step.read_count,
                        step.dispatch_count,
                        step.dispatch_error_count,
                        step.process_error_count,
                        step.write_count
                    );
                }
                println!("Status: {:?}", execution.repeat_status());
            }
        }

        Ok(())
    }
}
