use chrono::Duration;
use thiserror::Error;

use crate::domain::{AppointmentStatus, DomainError};
use crate::lock::LockError;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CascadeError {
    #[error("delay must be positive, got {0}")]
    InvalidDelay(Duration),

    #[error("appointment {0} not found")]
    TargetNotFound(String),

    #[error("appointment {appointment_id} belongs to doctor {actual}, not {requested}")]
    WrongDoctor {
        appointment_id: String,
        requested: String,
        actual: String,
    },

    #[error("appointment {appointment_id} is {status} and cannot be rescheduled")]
    NotReschedulable {
        appointment_id: String,
        status: AppointmentStatus,
    },

    /// Another cascade holds the doctor's schedule. Safe to retry.
    #[error("schedule for doctor {doctor_id} is locked by another cascade")]
    LockUnavailable { doctor_id: String },

    #[error("no slot for appointment {appointment_id} within {lookahead_days} days")]
    Unplaceable {
        appointment_id: String,
        lookahead_days: u32,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CascadeError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CascadeError::LockUnavailable { .. })
    }
}

impl From<LockError> for CascadeError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Unavailable { doctor_id, .. } | LockError::Lost { doctor_id } => {
                CascadeError::LockUnavailable { doctor_id }
            }
            LockError::Store(err) => CascadeError::Store(err),
        }
    }
}
