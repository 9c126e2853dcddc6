//! Timer-driven background loops shared by the outbox and task workers.
//!
//! A loop ticks on a fixed interval until its [`Shutdown`] fires. A tick in
//! progress always runs to completion, so the batch it claimed has its
//! outcomes persisted before the loop exits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::store::StoreError;

/// Statistics from a worker loop, returned when it stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub ticks: usize,
    pub processed: usize,
    pub failed: usize,
    pub store_errors: usize,
}

/// What a single tick got done.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub processed: usize,
    pub failed: usize,
}

/// One unit of periodic work.
#[async_trait]
pub trait PollingJob: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one batch. Only store-level failures are returned.
    async fn tick(&self) -> Result<TickReport, StoreError>;
}

/// Cooperative cancellation shared by any number of workers.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once shutdown is triggered or every `Shutdown` handle is gone.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Drive `job` every `poll_interval` until `signal` fires.
pub async fn run_polling<J: PollingJob>(
    job: &J,
    poll_interval: Duration,
    mut signal: ShutdownSignal,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(worker = job.name(), ?poll_interval, "worker started");
    loop {
        tokio::select! {
            biased;
            _ = signal.wait() => break,
            _ = ticker.tick() => {}
        }

        stats.ticks += 1;
        match job.tick().await {
            Ok(report) => {
                stats.processed += report.processed;
                stats.failed += report.failed;
            }
            Err(err) => {
                stats.store_errors += 1;
                tracing::error!(worker = job.name(), error = %err, "tick failed; retrying next tick");
            }
        }
    }
    tracing::info!(
        worker = job.name(),
        ticks = stats.ticks,
        processed = stats.processed,
        failed = stats.failed,
        "worker stopped"
    );
    stats
}

/// A polling job running on the tokio runtime.
///
/// ## Example
///
/// ```ignore
/// let worker = BackgroundWorker::spawn(processor, Duration::from_millis(500));
///
/// // ... do work ...
///
/// let stats = worker.stop().await;
/// println!("delivered {} records", stats.processed);
/// ```
pub struct BackgroundWorker {
    shutdown: Shutdown,
    handle: JoinHandle<WorkerStats>,
}

impl BackgroundWorker {
    /// Spawn with a shutdown owned by this worker.
    pub fn spawn<J>(job: J, poll_interval: Duration) -> Self
    where
        J: PollingJob + 'static,
    {
        Self::spawn_with_shutdown(job, poll_interval, &Shutdown::new())
    }

    /// Spawn tied to an existing shutdown, so one trigger stops several workers.
    pub fn spawn_with_shutdown<J>(job: J, poll_interval: Duration, shutdown: &Shutdown) -> Self
    where
        J: PollingJob + 'static,
    {
        let signal = shutdown.subscribe();
        let handle = tokio::spawn(async move { run_polling(&job, poll_interval, signal).await });
        Self {
            shutdown: shutdown.clone(),
            handle,
        }
    }

    /// Signal shutdown, let the in-flight tick finish, and return the stats.
    pub async fn stop(self) -> WorkerStats {
        self.shutdown.trigger();
        self.join().await
    }

    /// Wait for the loop to exit after its shutdown fired elsewhere.
    pub async fn join(self) -> WorkerStats {
        match self.handle.await {
            Ok(stats) => stats,
            Err(err) => {
                tracing::error!(error = %err, "worker task ended abnormally");
                WorkerStats::default()
            }
        }
    }
}
