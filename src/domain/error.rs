use chrono::{DateTime, NaiveTime, Utc};
use thiserror::Error;

/// Errors raised by aggregate invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A time range whose end is not strictly after its start.
    #[error("invalid time range: end {end} is not after start {start}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// A working-hours window whose end is not after its start.
    #[error("invalid working-hours window {start}-{end}")]
    InvalidWindow { start: NaiveTime, end: NaiveTime },

    /// A lifecycle transition the current status does not allow.
    #[error("cannot transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}
