use std::time::{Duration, Instant};

use log::info;
use uuid::Uuid;

use crate::BatchError;

use super::{
    build_name,
    step::{RepeatStatus, Step, StepExecution},
};

/// Type alias for job execution results.
type JobResult<T> = Result<T, BatchError>;

/// Represents a job that can be executed.
///
/// One call to [`Job::run`] is one invocation: in this crate, one batch of
/// outbound messages. Whatever re-invokes the job (a scheduler, a cron entry,
/// an operator) is outside of it.
pub trait Job {
    /// Name of the job, used as the entry point of recurring triggers.
    fn get_name(&self) -> &str;

    /// Runs the job and returns the result of the job execution.
    ///
    /// # Returns
    /// - `Ok(JobExecution)` when the job executes successfully
    /// - `Err(BatchError)` when the job execution fails
    fn run(&self) -> JobResult<JobExecution>;
}

/// Represents the execution of a job.
#[derive(Debug)]
pub struct JobExecution {
    /// The time when the job started executing
    pub start: Instant,
    /// The time when the job finished executing
    pub end: Instant,
    /// The total duration of the job execution
    pub duration: Duration,
    /// Executions of the steps, in order
    pub step_executions: Vec<StepExecution>,
}

impl JobExecution {
    /// `Finished` once every step reports that its work is complete.
    pub fn repeat_status(&self) -> RepeatStatus {
        if self
            .step_executions
            .iter()
            .all(|execution| execution.repeat_status == RepeatStatus::Finished)
        {
            RepeatStatus::Finished
        } else {
            RepeatStatus::Continuable
        }
    }
}

/// Represents an instance of a job.
pub struct JobInstance<'a> {
    /// Unique identifier for this job instance
    id: Uuid,
    /// Human-readable name for the job
    name: String,
    /// Collection of steps that make up this job, in execution order
    steps: Vec<&'a dyn Step>,
}

impl JobInstance<'_> {
    pub fn get_id(&self) -> Uuid {
        self.id
    }
}

impl Job for JobInstance<'_> {
    fn get_name(&self) -> &str {
        &self.name
    }

    /// Runs the job by executing its steps in sequence.
    ///
    /// The first failing step aborts the job.
    fn run(&self) -> JobResult<JobExecution> {
        let start = Instant::now();

        info!("Start of job: {}, id: {}", self.name, self.id);

        let mut step_executions = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let mut step_execution = StepExecution::new(step.get_name());
            step.execute(&mut step_execution)?;
            step_executions.push(step_execution);
        }

        info!("End of job: {}, id: {}", self.name, self.id);

        Ok(JobExecution {
            start,
            end: Instant::now(),
            duration: start.elapsed(),
            step_executions,
        })
    }
}

/// Builder for creating a job instance.
///
/// ```rust,ignore
/// let job = JobBuilder::new()
///     .name("survey-batch".to_string())
///     .start(&step)
///     .build();
/// ```
#[derive(Default)]
pub struct JobBuilder<'a> {
    /// Optional name for the job (generated randomly if not specified)
    name: Option<String>,
    /// Collection of steps to be executed, in order
    steps: Vec<&'a dyn Step>,
}

impl<'a> JobBuilder<'a> {
    pub fn new() -> Self {
        Self {
            name: None,
            steps: Vec::new(),
        }
    }

    pub fn name(mut self, name: String) -> JobBuilder<'a> {
        self.name = Some(name);
        self
    }

    /// Sets the first step of the job.
    pub fn start(mut self, step: &'a dyn Step) -> JobBuilder<'a> {
        self.steps.push(step);
        self
    }

    /// Adds a step to the job. Steps are executed in the order they are added.
    pub fn next(mut self, step: &'a dyn Step) -> JobBuilder<'a> {
        self.steps.push(step);
        self
    }

    pub fn build(self) -> JobInstance<'a> {
        JobInstance {
            id: Uuid::new_v4(),
            name: self.name.unwrap_or_else(build_name),
            steps: self.steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use crate::core::step::{StepBuilder, StepExecution, Tasklet};

    use super::*;

    struct CountdownTasklet {
        remaining: Cell<usize>,
    }

    impl Tasklet for CountdownTasklet {
        fn execute(&self, _step_execution: &mut StepExecution) -> Result<RepeatStatus, BatchError> {
            let remaining = self.remaining.get().saturating_sub(1);
            self.remaining.set(remaining);
            Ok(if remaining == 0 {
                RepeatStatus::Finished
            } else {
                RepeatStatus::Continuable
            })
        }
    }

    struct BrokenTasklet;

    impl Tasklet for BrokenTasklet {
        fn execute(&self, _step_execution: &mut StepExecution) -> Result<RepeatStatus, BatchError> {
            Err(BatchError::Table("sheet not found".to_string()))
        }
    }

    #[test]
    fn job_should_report_finished_when_all_steps_finish() -> Result<(), BatchError> {
        let tasklet = CountdownTasklet {
            remaining: Cell::new(2),
        };
        let step = StepBuilder::new("countdown").tasklet(&tasklet).build();
        let job = JobBuilder::new()
            .name("test".to_string())
            .start(&step)
            .build();

        assert_eq!(job.run()?.repeat_status(), RepeatStatus::Continuable);
        let execution = job.run()?;
        assert_eq!(execution.repeat_status(), RepeatStatus::Finished);
        assert_eq!(execution.step_executions.len(), 1);
        assert_eq!(job.get_name(), "test");

        Ok(())
    }

    #[test]
    fn failing_step_should_abort_the_job() {
        let first = StepBuilder::new("broken").tasklet(&BrokenTasklet).build();
        let tasklet = CountdownTasklet {
            remaining: Cell::new(5),
        };
        let second = StepBuilder::new("countdown").tasklet(&tasklet).build();
        let job = JobBuilder::new().start(&first).next(&second).build();

        let result = job.run();

        assert!(matches!(result, Err(BatchError::Step(name)) if name == "broken"));
        assert_eq!(tasklet.remaining.get(), 5);
    }
}
