use std::time::Duration;

use super::delivery::TaskDelivery;
use super::scheduler::TaskScheduler;
use crate::store::FollowUpTaskStore;
use crate::worker::{BackgroundWorker, Shutdown, WorkerStats};

/// Background follow-up task loop.
pub struct TaskWorker {
    inner: BackgroundWorker,
}

impl TaskWorker {
    pub fn spawn<S, D>(scheduler: TaskScheduler<S, D>, poll_interval: Duration) -> Self
    where
        S: FollowUpTaskStore + 'static,
        D: TaskDelivery + 'static,
    {
        Self {
            inner: BackgroundWorker::spawn(scheduler, poll_interval),
        }
    }

    pub fn spawn_with_shutdown<S, D>(
        scheduler: TaskScheduler<S, D>,
        poll_interval: Duration,
        shutdown: &Shutdown,
    ) -> Self
    where
        S: FollowUpTaskStore + 'static,
        D: TaskDelivery + 'static,
    {
        Self {
            inner: BackgroundWorker::spawn_with_shutdown(scheduler, poll_interval, shutdown),
        }
    }

    pub async fn stop(self) -> WorkerStats {
        self.inner.stop().await
    }

    pub async fn join(self) -> WorkerStats {
        self.inner.join().await
    }
}
