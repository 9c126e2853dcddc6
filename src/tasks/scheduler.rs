use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use uuid::Uuid;

use super::backoff::BackoffPolicy;
use super::delivery::{TaskDelivery, TaskDispatchError};
use crate::config::TaskSchedulerConfig;
use crate::domain::{FollowUpTask, TaskStatus};
use crate::outbox::panic_message;
use crate::store::{FollowUpTaskStore, StoreError};
use crate::worker::{PollingJob, TickReport};

/// Counts from one claim-dispatch-save pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickResult {
    pub claimed: usize,
    pub completed: usize,
    /// Failed and eligible for another attempt after backoff.
    pub failed: usize,
    pub dead_lettered: usize,
    /// Outcomes the store accepted.
    pub saved: usize,
}

/// Claims due follow-up tasks and dispatches them concurrently.
pub struct TaskScheduler<S, D> {
    store: S,
    delivery: D,
    worker_id: String,
    batch_size: usize,
    lease: Duration,
    backoff: BackoffPolicy,
}

impl<S, D> TaskScheduler<S, D> {
    pub fn new(store: S, delivery: D) -> Self {
        Self {
            store,
            delivery,
            worker_id: format!("task-worker-{}", Uuid::new_v4()),
            batch_size: 20,
            lease: Duration::from_secs(300),
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn from_config(store: S, delivery: D, config: &TaskSchedulerConfig) -> Self {
        Self::new(store, delivery)
            .with_batch_size(config.batch_size)
            .with_lease(config.claim_lease())
            .with_backoff(config.backoff())
    }

    /// Set the worker ID recorded on claims.
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    /// Set the batch size (max tasks claimed per tick).
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set how long a claim may stay in progress before it can be taken over.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: FollowUpTaskStore, D: TaskDelivery> TaskScheduler<S, D> {
    pub async fn run_once(&self) -> Result<TickResult, StoreError> {
        self.run_at(Utc::now()).await
    }

    /// One pass with `now` as the clock: claim, dispatch all, save once.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<TickResult, StoreError> {
        let claimed = self.store.claim_due_tasks(
            &self.worker_id,
            now,
            self.batch_size,
            to_chrono(self.lease),
        )?;
        let mut result = TickResult {
            claimed: claimed.len(),
            ..Default::default()
        };
        if claimed.is_empty() {
            return Ok(result);
        }

        let dispatches = claimed.iter().map(|task| {
            AssertUnwindSafe(self.delivery.dispatch_task(task)).catch_unwind()
        });
        let replies = join_all(dispatches).await;

        let mut outcomes = Vec::with_capacity(claimed.len());
        for (mut task, reply) in claimed.into_iter().zip(replies) {
            let reply = reply.unwrap_or_else(|panic| {
                Err(TaskDispatchError::Transient(format!(
                    "delivery panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });
            self.record_outcome(&mut task, reply, now);
            match task.status {
                TaskStatus::Completed => result.completed += 1,
                TaskStatus::DeadLettered => result.dead_lettered += 1,
                _ => result.failed += 1,
            }
            outcomes.push(task);
        }

        result.saved = self.store.save_task_outcomes(&self.worker_id, &outcomes)?;
        Ok(result)
    }

    fn record_outcome(
        &self,
        task: &mut FollowUpTask,
        reply: Result<Option<serde_json::Value>, TaskDispatchError>,
        now: DateTime<Utc>,
    ) {
        match reply {
            Ok(value) => task.complete(value, now),
            Err(TaskDispatchError::Transient(error)) => {
                let retry_at = now + to_chrono(self.backoff.calculate(task.attempts));
                task.fail(&error, retry_at, now);
                if task.status == TaskStatus::DeadLettered {
                    tracing::error!(task_id = %task.id, attempts = task.attempts, error = %error, "task dead-lettered");
                } else {
                    tracing::warn!(
                        task_id = %task.id,
                        attempts = task.attempts,
                        retry_at = %retry_at,
                        error = %error,
                        "task failed"
                    );
                }
            }
            Err(TaskDispatchError::Permanent(error)) => {
                task.dead_letter(&error, now);
                tracing::error!(task_id = %task.id, error = %error, "task dead-lettered after permanent failure");
            }
        }
    }
}

#[async_trait]
impl<S, D> PollingJob for TaskScheduler<S, D>
where
    S: FollowUpTaskStore,
    D: TaskDelivery,
{
    fn name(&self) -> &'static str {
        "follow-up-tasks"
    }

    async fn tick(&self) -> Result<TickReport, StoreError> {
        let tick = self.run_once().await?;
        Ok(TickReport {
            processed: tick.completed,
            failed: tick.failed + tick.dead_lettered,
        })
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskType;
    use crate::store::InMemoryStore;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl TaskDelivery for Scripted {
        async fn dispatch_task(
            &self,
            task: &FollowUpTask,
        ) -> Result<Option<serde_json::Value>, TaskDispatchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(TaskDispatchError::Transient("sms gateway timeout".into()))
            } else {
                Ok(Some(json!({ "sent": task.id })))
            }
        }
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, s).unwrap()
    }

    fn store_with(task: FollowUpTask) -> InMemoryStore {
        let store = InMemoryStore::new();
        store.insert_task(task).unwrap();
        store
    }

    fn reminder(max_attempts: u32) -> FollowUpTask {
        FollowUpTask::new(
            "t-1",
            "fu-1",
            TaskType::MedicationReminder,
            json!({ "drug": "ibuprofen" }),
            at(9, 0, 0),
            max_attempts,
        )
    }

    #[tokio::test]
    async fn success_completes_with_result() {
        let store = store_with(reminder(3));
        let scheduler = TaskScheduler::new(
            store.clone(),
            Scripted {
                calls: AtomicUsize::new(0),
                fail_first: 0,
            },
        );

        let tick = scheduler.run_at(at(9, 0, 0)).await.unwrap();
        assert_eq!(tick.claimed, 1);
        assert_eq!(tick.completed, 1);
        assert_eq!(tick.saved, 1);

        let task = store.task("t-1").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.attempts, 1);
        assert_eq!(task.result, Some(json!({ "sent": "t-1" })));
        assert!(!task.claimed);
    }

    #[tokio::test]
    async fn failure_waits_for_backoff_then_retries() {
        let store = store_with(reminder(3));
        let scheduler = TaskScheduler::new(
            store.clone(),
            Scripted {
                calls: AtomicUsize::new(0),
                fail_first: 1,
            },
        )
        .with_backoff(BackoffPolicy::Exponential {
            initial: Duration::from_secs(10),
            max: Duration::from_secs(60),
        });

        let first = scheduler.run_at(at(9, 0, 0)).await.unwrap();
        assert_eq!(first.failed, 1);
        let task = store.task("t-1").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.next_attempt_at, Some(at(9, 0, 10)));

        assert_eq!(scheduler.run_at(at(9, 0, 5)).await.unwrap().claimed, 0);

        let retry = scheduler.run_at(at(9, 0, 10)).await.unwrap();
        assert_eq!(retry.completed, 1);
        assert_eq!(store.task("t-1").unwrap().unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn permanent_failure_dead_letters_at_once() {
        struct Reject;

        #[async_trait]
        impl TaskDelivery for Reject {
            async fn dispatch_task(
                &self,
                _: &FollowUpTask,
            ) -> Result<Option<serde_json::Value>, TaskDispatchError> {
                Err(TaskDispatchError::Permanent("patient opted out".into()))
            }
        }

        let store = store_with(reminder(5));
        let scheduler = TaskScheduler::new(store.clone(), Reject);
        let tick = scheduler.run_at(at(9, 0, 0)).await.unwrap();

        assert_eq!(tick.dead_lettered, 1);
        let task = store.task("t-1").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::DeadLettered);
        assert_eq!(task.attempts, 1);
    }

    #[tokio::test]
    async fn panicking_delivery_is_a_failed_attempt() {
        struct Boom;

        #[async_trait]
        impl TaskDelivery for Boom {
            async fn dispatch_task(
                &self,
                _: &FollowUpTask,
            ) -> Result<Option<serde_json::Value>, TaskDispatchError> {
                panic!("template missing")
            }
        }

        let store = store_with(reminder(3));
        let scheduler = TaskScheduler::new(store.clone(), Boom);
        let tick = scheduler.run_at(at(9, 0, 0)).await.unwrap();

        assert_eq!(tick.failed, 1);
        let task = store.task("t-1").unwrap().unwrap();
        assert!(task.last_error.unwrap().contains("template missing"));
    }

    #[tokio::test]
    async fn nothing_due_claims_nothing() {
        let store = store_with(reminder(3));
        let scheduler = TaskScheduler::new(store, crate::tasks::LogTaskDelivery::new());
        assert_eq!(scheduler.run_at(at(8, 59, 59)).await.unwrap(), TickResult::default());
    }
}
