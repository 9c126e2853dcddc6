use std::time::Duration;

use thiserror::Error;

use crate::store::StoreError;

/// Error type for schedule lock operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// Another holder kept the doctor's lock for the whole acquisition timeout.
    #[error("schedule lock for doctor {doctor_id} unavailable after {waited:?}")]
    Unavailable { doctor_id: String, waited: Duration },

    /// The row expired and another holder took it before this one renewed.
    #[error("schedule lock for doctor {doctor_id} was lost to another holder")]
    Lost { doctor_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}
