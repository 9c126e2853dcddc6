use std::time::Duration;

use super::processor::OutboxProcessor;
use crate::store::OutboxStore;
use crate::worker::{BackgroundWorker, Shutdown, WorkerStats};

/// Background outbox processor loop.
pub struct OutboxWorker {
    inner: BackgroundWorker,
}

impl OutboxWorker {
    pub fn spawn<S>(processor: OutboxProcessor<S>, poll_interval: Duration) -> Self
    where
        S: OutboxStore + 'static,
    {
        Self {
            inner: BackgroundWorker::spawn(processor, poll_interval),
        }
    }

    pub fn spawn_with_shutdown<S>(
        processor: OutboxProcessor<S>,
        poll_interval: Duration,
        shutdown: &Shutdown,
    ) -> Self
    where
        S: OutboxStore + 'static,
    {
        Self {
            inner: BackgroundWorker::spawn_with_shutdown(processor, poll_interval, shutdown),
        }
    }

    pub async fn stop(self) -> WorkerStats {
        self.inner.stop().await
    }

    pub async fn join(self) -> WorkerStats {
        self.inner.join().await
    }
}
