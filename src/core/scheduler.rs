//! # Recurring invocation
//!
//! Batches are sent one invocation at a time. A [`Scheduler`] owns the
//! recurring triggers that re-invoke the job; [`terminate`] cancels all of
//! them once the table is exhausted or the cursor is found inconsistent.
//!
//! [`start_batching`] is the bootstrap: it registers a trigger and then
//! drives the job on a `tokio` interval until that trigger is cancelled.

use std::{cell::RefCell, time::Duration};

use log::{error, info};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::{core::job::Job, BatchError};

/// A registered recurring invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub id: Uuid,
    /// Name of the job the trigger invokes.
    pub entry_point: String,
    pub interval: Duration,
}

/// Registry of recurring triggers.
pub trait Scheduler {
    fn register_recurring(&self, interval: Duration, entry_point: &str)
    -> Result<Trigger, BatchError>;

    fn list_active(&self) -> Vec<Trigger>;

    fn cancel(&self, trigger: &Trigger) -> Result<(), BatchError>;

    fn is_active(&self, trigger: &Trigger) -> bool {
        self.list_active().iter().any(|active| active.id == trigger.id)
    }
}

/// Cancels every active trigger. Cancelling none is not an error.
///
/// # Returns
/// The number of triggers cancelled.
pub fn terminate(scheduler: &dyn Scheduler) -> Result<usize, BatchError> {
    let triggers = scheduler.list_active();
    for trigger in &triggers {
        scheduler.cancel(trigger)?;
    }
    info!("Cancelled {} recurring trigger(s)", triggers.len());
    Ok(triggers.len())
}

/// In-process scheduler whose triggers are driven by [`start_batching`].
#[derive(Debug, Default)]
pub struct IntervalScheduler {
    triggers: RefCell<Vec<Trigger>>,
}

impl IntervalScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for IntervalScheduler {
    fn register_recurring(
        &self,
        interval: Duration,
        entry_point: &str,
    ) -> Result<Trigger, BatchError> {
        if interval.is_zero() {
            return Err(BatchError::Scheduler(
                "Trigger interval must be greater than zero".to_string(),
            ));
        }

        let trigger = Trigger {
            id: Uuid::new_v4(),
            entry_point: entry_point.to_string(),
            interval,
        };
        self.triggers.borrow_mut().push(trigger.clone());
        Ok(trigger)
    }

    fn list_active(&self) -> Vec<Trigger> {
        self.triggers.borrow().clone()
    }

    fn cancel(&self, trigger: &Trigger) -> Result<(), BatchError> {
        self.triggers
            .borrow_mut()
            .retain(|active| active.id != trigger.id);
        Ok(())
    }
}

fn invoke(job: &dyn Job) {
    match job.run() {
        Ok(execution) => info!(
            "Invocation of {} took {:?}",
            job.get_name(),
            execution.duration
        ),
        Err(err) => error!("Invocation of {} failed: {}", job.get_name(), err),
    }
}

/// Registers a recurring trigger for `job` and runs it every `interval`
/// while the trigger is active.
///
/// With `run_immediately` the first invocation happens right away instead of
/// after a full interval. Ticks are delayed rather than bunched up when an
/// invocation overruns, so two invocations never overlap.
///
/// # Returns
/// The number of invocations performed before the trigger was cancelled.
pub async fn start_batching(
    scheduler: &dyn Scheduler,
    job: &dyn Job,
    interval: Duration,
    run_immediately: bool,
) -> Result<usize, BatchError> {
    let trigger = scheduler.register_recurring(interval, job.get_name())?;
    info!(
        "Trigger {} registered for {} every {:?}",
        trigger.id, trigger.entry_point, interval
    );

    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut invocations = 0;

    if run_immediately {
        invoke(job);
        invocations += 1;
    }

    while scheduler.is_active(&trigger) {
        ticker.tick().await;
        if !scheduler.is_active(&trigger) {
            break;
        }
        invoke(job);
        invocations += 1;
    }

    info!(
        "Trigger {} is no longer active, batching stopped after {} invocation(s)",
        trigger.id, invocations
    );
    Ok(invocations)
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, time::Duration};

    use crate::core::{
        job::JobBuilder,
        step::{RepeatStatus, StepBuilder, StepExecution, Tasklet},
    };

    use super::*;

    struct TerminatingTasklet<'a> {
        scheduler: &'a dyn Scheduler,
        calls: Cell<usize>,
        terminate_on: usize,
    }

    impl Tasklet for TerminatingTasklet<'_> {
        fn execute(&self, _step_execution: &mut StepExecution) -> Result<RepeatStatus, BatchError> {
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() == self.terminate_on {
                terminate(self.scheduler)?;
                return Ok(RepeatStatus::Finished);
            }
            Ok(RepeatStatus::Continuable)
        }
    }

    #[test]
    fn terminate_should_be_idempotent() -> Result<(), BatchError> {
        let scheduler = IntervalScheduler::new();
        assert_eq!(terminate(&scheduler)?, 0);

        scheduler.register_recurring(Duration::from_secs(60), "a")?;
        scheduler.register_recurring(Duration::from_secs(60), "b")?;

        assert_eq!(terminate(&scheduler)?, 2);
        assert!(scheduler.list_active().is_empty());
        assert_eq!(terminate(&scheduler)?, 0);

        Ok(())
    }

    #[test]
    fn zero_interval_should_be_rejected() {
        let scheduler = IntervalScheduler::new();
        let result = scheduler.register_recurring(Duration::ZERO, "job");
        assert!(matches!(result, Err(BatchError::Scheduler(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn batching_should_stop_once_triggers_are_cancelled() -> Result<(), BatchError> {
        let scheduler = IntervalScheduler::new();
        let tasklet = TerminatingTasklet {
            scheduler: &scheduler,
            calls: Cell::new(0),
            terminate_on: 3,
        };
        let step = StepBuilder::new("send").tasklet(&tasklet).build();
        let job = JobBuilder::new().start(&step).build();

        let invocations =
            start_batching(&scheduler, &job, Duration::from_millis(5), false).await?;

        assert_eq!(invocations, 3);
        assert!(scheduler.list_active().is_empty());

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn immediate_run_should_not_wait_for_first_tick() -> Result<(), BatchError> {
        let scheduler = IntervalScheduler::new();
        let tasklet = TerminatingTasklet {
            scheduler: &scheduler,
            calls: Cell::new(0),
            terminate_on: 1,
        };
        let step = StepBuilder::new("send").tasklet(&tasklet).build();
        let job = JobBuilder::new().start(&step).build();

        let started = std::time::Instant::now();
        let invocations =
            start_batching(&scheduler, &job, Duration::from_secs(3600), true).await?;

        assert_eq!(invocations, 1);
        assert!(started.elapsed() < Duration::from_secs(60));

        Ok(())
    }
}
