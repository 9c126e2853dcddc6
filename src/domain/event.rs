use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery channel an outbox record is routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Sms => write!(f, "sms"),
        }
    }
}

/// Something that happened to an aggregate.
///
/// Events carry identifiers only. Handlers re-fetch whatever context they
/// need, so payloads stay small and survive schema changes of the aggregates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    AppointmentScheduled {
        appointment_id: String,
        doctor_id: String,
        patient_id: String,
    },
    AppointmentRescheduled {
        appointment_id: String,
        doctor_id: String,
        patient_id: String,
        /// Start time before the change, so notifications can say "moved from".
        previous_start: DateTime<Utc>,
    },
    AppointmentCancelled {
        appointment_id: String,
        doctor_id: String,
        patient_id: String,
    },
    AppointmentApproved {
        appointment_id: String,
        doctor_id: String,
        patient_id: String,
    },
    AppointmentRejected {
        appointment_id: String,
        doctor_id: String,
        patient_id: String,
    },
    AppointmentCompleted {
        appointment_id: String,
        doctor_id: String,
        patient_id: String,
    },
    FollowUpCreated {
        follow_up_id: String,
        patient_id: String,
        task_ids: Vec<String>,
    },
}

impl DomainEvent {
    pub const APPOINTMENT_SCHEDULED: &'static str = "AppointmentScheduled";
    pub const APPOINTMENT_RESCHEDULED: &'static str = "AppointmentRescheduled";
    pub const APPOINTMENT_CANCELLED: &'static str = "AppointmentCancelled";
    pub const APPOINTMENT_APPROVED: &'static str = "AppointmentApproved";
    pub const APPOINTMENT_REJECTED: &'static str = "AppointmentRejected";
    pub const APPOINTMENT_COMPLETED: &'static str = "AppointmentCompleted";
    pub const FOLLOW_UP_CREATED: &'static str = "FollowUpCreated";

    /// The event-type tag written to the outbox and used for handler routing.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::AppointmentScheduled { .. } => Self::APPOINTMENT_SCHEDULED,
            DomainEvent::AppointmentRescheduled { .. } => Self::APPOINTMENT_RESCHEDULED,
            DomainEvent::AppointmentCancelled { .. } => Self::APPOINTMENT_CANCELLED,
            DomainEvent::AppointmentApproved { .. } => Self::APPOINTMENT_APPROVED,
            DomainEvent::AppointmentRejected { .. } => Self::APPOINTMENT_REJECTED,
            DomainEvent::AppointmentCompleted { .. } => Self::APPOINTMENT_COMPLETED,
            DomainEvent::FollowUpCreated { .. } => Self::FOLLOW_UP_CREATED,
        }
    }

    /// Id of the aggregate that raised the event.
    pub fn aggregate_id(&self) -> &str {
        match self {
            DomainEvent::AppointmentScheduled { appointment_id, .. }
            | DomainEvent::AppointmentRescheduled { appointment_id, .. }
            | DomainEvent::AppointmentCancelled { appointment_id, .. }
            | DomainEvent::AppointmentApproved { appointment_id, .. }
            | DomainEvent::AppointmentRejected { appointment_id, .. }
            | DomainEvent::AppointmentCompleted { appointment_id, .. } => appointment_id,
            DomainEvent::FollowUpCreated { follow_up_id, .. } => follow_up_id,
        }
    }

    /// Time-sensitive changes go out by SMS, everything else by email.
    pub fn channel(&self) -> Channel {
        match self {
            DomainEvent::AppointmentRescheduled { .. } | DomainEvent::AppointmentCancelled { .. } => {
                Channel::Sms
            }
            _ => Channel::Email,
        }
    }
}

/// An aggregate that accumulates domain events until its unit of work commits.
pub trait EventSource {
    /// Events raised since the last successful commit.
    fn pending_events(&self) -> &[DomainEvent];

    /// Drop the pending events once they have been written to the outbox.
    fn clear_events(&mut self);
}
