use std::time::{Duration, Instant};

use log::{error, info};
use uuid::Uuid;

use crate::BatchError;

use super::build_name;

/// Status of a step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// The step has not run yet.
    Starting,
    /// The step ran to completion.
    Success,
    /// The step stopped with an error.
    Failed,
}

/// Tells the caller whether the work behind a tasklet is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatStatus {
    /// More work remains; the tasklet should be executed again later.
    Continuable,
    /// All work is done.
    Finished,
}

/// Details of one step execution.
///
/// Counters are updated by the tasklet while it runs and can be inspected
/// once the step returns, whether it succeeded or not.
#[derive(Debug)]
pub struct StepExecution {
    /// Unique identifier for this step execution
    pub id: Uuid,
    /// Human-readable name for the step
    pub name: String,
    /// Current status of the step execution
    pub status: StepStatus,
    /// Whether the tasklet reported more work
    pub repeat_status: RepeatStatus,
    pub start_time: Instant,
    pub end_time: Instant,
    pub duration: Duration,
    /// Number of table rows read for the batch
    pub read_count: usize,
    /// Number of outbound requests that succeeded
    pub dispatch_count: usize,
    /// Number of outbound requests that failed
    pub dispatch_error_count: usize,
    /// Number of rows that could not be turned into a request
    pub process_error_count: usize,
    /// Number of result rows written back
    pub write_count: usize,
}

impl StepExecution {
    pub fn new(name: &str) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            status: StepStatus::Starting,
            repeat_status: RepeatStatus::Continuable,
            start_time: now,
            end_time: now,
            duration: Duration::default(),
            read_count: 0,
            dispatch_count: 0,
            dispatch_error_count: 0,
            process_error_count: 0,
            write_count: 0,
        }
    }
}

/// A unit of work executed as a whole by a step.
pub trait Tasklet {
    fn execute(&self, step_execution: &mut StepExecution) -> Result<RepeatStatus, BatchError>;
}

/// A phase of a job.
pub trait Step {
    /// Name of the step, used in logs and errors.
    fn get_name(&self) -> &str;

    /// Executes the step.
    ///
    /// # Returns
    /// - `Ok(())`: the step completed successfully
    /// - `Err(BatchError::Step)`: the step failed, details are in `step_execution`
    fn execute(&self, step_execution: &mut StepExecution) -> Result<(), BatchError>;
}

/// A step that runs a single [`Tasklet`].
pub struct TaskletStep<'a> {
    name: String,
    tasklet: &'a dyn Tasklet,
}

impl Step for TaskletStep<'_> {
    fn get_name(&self) -> &str {
        &self.name
    }

    fn execute(&self, step_execution: &mut StepExecution) -> Result<(), BatchError> {
        let start_time = Instant::now();

        info!(
            "Start of step: {}, id: {}",
            step_execution.name, step_execution.id
        );

        let result = self.tasklet.execute(step_execution);

        step_execution.start_time = start_time;
        step_execution.end_time = Instant::now();
        step_execution.duration = start_time.elapsed();

        match result {
            Ok(repeat_status) => {
                step_execution.status = StepStatus::Success;
                step_execution.repeat_status = repeat_status;
                info!(
                    "End of step: {}, id: {}",
                    step_execution.name, step_execution.id
                );
                Ok(())
            }
            Err(err) => {
                step_execution.status = StepStatus::Failed;
                error!("Step {} failed: {}", step_execution.name, err);
                Err(BatchError::Step(self.name.clone()))
            }
        }
    }
}

/// Builder for steps.
///
/// ```rust,ignore
/// let step = StepBuilder::new("send-surveys").tasklet(&tasklet).build();
/// ```
pub struct StepBuilder {
    name: Option<String>,
}

impl StepBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
        }
    }

    /// Creates a builder for a step with a generated name.
    pub fn unnamed() -> Self {
        Self { name: None }
    }

    pub fn tasklet<'a>(self, tasklet: &'a dyn Tasklet) -> TaskletBuilder<'a> {
        TaskletBuilder {
            name: self.name.unwrap_or_else(build_name),
            tasklet,
        }
    }
}

pub struct TaskletBuilder<'a> {
    name: String,
    tasklet: &'a dyn Tasklet,
}

impl<'a> TaskletBuilder<'a> {
    pub fn build(self) -> TaskletStep<'a> {
        TaskletStep {
            name: self.name,
            tasklet: self.tasklet,
        }
    }
}
