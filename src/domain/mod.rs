mod appointment;
mod error;
mod event;
mod follow_up;
mod time_range;
mod working_hours;

pub use appointment::{Appointment, AppointmentStatus, AuditEntry};
pub use error::DomainError;
pub use event::{Channel, DomainEvent, EventSource};
pub use follow_up::{FollowUpTask, TaskAuditEntry, TaskStatus, TaskType};
pub use time_range::TimeRange;
pub use working_hours::{Window, WorkingHours};
