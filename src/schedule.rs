//! Periodic task registration.
//!
//! Sources hand a [`PollJob`] to a [`Scheduler`]; the scheduler owns the
//! cadence. [`TokioScheduler`] runs each job on its own tokio task with
//! fixed-delay semantics: the next run is scheduled `interval` after the
//! previous one finished, so runs of one job never overlap.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::AbortHandle;

use crate::policy::PollingPolicy;

/// Shortest interval a job is rescheduled with.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

pub type PollFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// One refresh. Called once per tick; must not panic.
pub type PollJob = Arc<dyn Fn() -> PollFuture + Send + Sync>;

/// Registers periodic jobs.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, policy: &PollingPolicy, job: PollJob) -> PollHandle;
}

/// Handle to a scheduled job.
#[derive(Debug, Default)]
pub struct PollHandle {
    abort: Option<AbortHandle>,
}

impl PollHandle {
    /// A handle for schedulers that do not support cancellation.
    pub fn detached() -> Self {
        Self { abort: None }
    }

    pub fn from_abort(abort: AbortHandle) -> Self {
        Self { abort: Some(abort) }
    }

    /// Stop the job. In-flight work is dropped at its next await point.
    pub fn cancel(&self) {
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.abort.as_ref().is_some_and(AbortHandle::is_finished)
    }
}

/// Scheduler backed by a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on.
    pub fn try_current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, policy: &PollingPolicy, job: PollJob) -> PollHandle {
        let initial_delay = policy.initial_delay;
        let interval = policy.interval.max(MIN_INTERVAL);
        let task = self.handle.spawn(async move {
            tokio::time::sleep(initial_delay).await;
            loop {
                job().await;
                tokio::time::sleep(interval).await;
            }
        });
        PollHandle::from_abort(task.abort_handle())
    }
}
