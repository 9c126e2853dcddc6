//! Error type for clinic use cases.

use thiserror::Error;

use crate::cascade::CascadeError;
use crate::domain::{DomainError, TaskStatus};
use crate::lock::LockError;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// The requested slot overlaps an active appointment of the same doctor.
    #[error("slot overlaps appointment {existing}")]
    Conflict { existing: String },

    #[error("task {task_id} is {status} and cannot be rescheduled")]
    TaskNotReschedulable { task_id: String, status: TaskStatus },

    #[error("a follow-up needs at least one step")]
    EmptyFollowUp,

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Cascade(#[from] CascadeError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub(crate) fn not_found(kind: &'static str, id: &str) -> Self {
        ServiceError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}
