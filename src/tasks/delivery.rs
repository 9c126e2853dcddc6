use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::FollowUpTask;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskDispatchError {
    /// Retried after backoff until the task runs out of attempts.
    #[error("transient dispatch failure: {0}")]
    Transient(String),

    /// Dead-letters the task at once.
    #[error("permanent dispatch failure: {0}")]
    Permanent(String),
}

/// The delivery boundary for follow-up tasks (reminders, check-ins).
#[async_trait]
pub trait TaskDelivery: Send + Sync {
    /// Perform the task. `Ok` may carry result metadata stored on the task.
    async fn dispatch_task(&self, task: &FollowUpTask) -> Result<Option<Value>, TaskDispatchError>;
}

#[async_trait]
impl<D: TaskDelivery + ?Sized> TaskDelivery for Arc<D> {
    async fn dispatch_task(&self, task: &FollowUpTask) -> Result<Option<Value>, TaskDispatchError> {
        (**self).dispatch_task(task).await
    }
}

/// Completes every task by logging it, optionally into a shared buffer.
#[derive(Clone, Default)]
pub struct LogTaskDelivery {
    buffer: Option<Arc<Mutex<Vec<String>>>>,
}

impl LogTaskDelivery {
    pub fn new() -> Self {
        Self { buffer: None }
    }

    pub fn with_buffer(buffer: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            buffer: Some(buffer),
        }
    }
}

#[async_trait]
impl TaskDelivery for LogTaskDelivery {
    async fn dispatch_task(&self, task: &FollowUpTask) -> Result<Option<Value>, TaskDispatchError> {
        match &self.buffer {
            Some(buffer) => buffer
                .lock()
                .map_err(|_| TaskDispatchError::Transient("log buffer poisoned".into()))?
                .push(format!("[TASK] {:?} {} {}", task.task_type, task.id, task.payload)),
            None => tracing::info!(
                task_id = %task.id,
                task_type = ?task.task_type,
                payload = %task.payload,
                "follow-up task dispatched"
            ),
        }
        Ok(None)
    }
}
