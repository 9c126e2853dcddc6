use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DomainError, DomainEvent, EventSource, TimeRange};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Completed,
    Rescheduled,
}

impl AppointmentStatus {
    /// Whether an appointment in this status still occupies the doctor's time.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Pending | AppointmentStatus::Approved | AppointmentStatus::Rescheduled
        )
    }

    fn can_become(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        match self {
            Pending => matches!(next, Approved | Rejected | Cancelled | Rescheduled),
            Approved => matches!(next, Completed | Cancelled | Rescheduled),
            Rescheduled => matches!(next, Approved | Completed | Cancelled | Rescheduled),
            Rejected | Cancelled | Completed => false,
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One line of an appointment's audit trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// A booked slot in a doctor's queue.
///
/// Appointments are never deleted; every change is a status transition that
/// appends to the audit trail and raises a [`DomainEvent`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub doctor_id: String,
    pub patient_id: String,
    range: TimeRange,
    status: AppointmentStatus,
    pub reason: Option<String>,
    pub notes: Option<String>,
    audit: Vec<AuditEntry>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Appointment {
    /// Book a new appointment in `Pending` status.
    pub fn schedule(
        id: impl Into<String>,
        doctor_id: impl Into<String>,
        patient_id: impl Into<String>,
        range: TimeRange,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Self {
        let mut appointment = Appointment {
            id: id.into(),
            doctor_id: doctor_id.into(),
            patient_id: patient_id.into(),
            range,
            status: AppointmentStatus::Pending,
            reason: None,
            notes: None,
            audit: Vec::new(),
            events: Vec::new(),
        };
        appointment.record(actor, "scheduled", at, [("range", range.to_string())]);
        let event = DomainEvent::AppointmentScheduled {
            appointment_id: appointment.id.clone(),
            doctor_id: appointment.doctor_id.clone(),
            patient_id: appointment.patient_id.clone(),
        };
        appointment.events.push(event);
        appointment
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.range.start()
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.range.end()
    }

    pub fn status(&self) -> AppointmentStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn audit(&self) -> &[AuditEntry] {
        &self.audit
    }

    pub fn approve(&mut self, actor: &str, at: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(AppointmentStatus::Approved, actor, at, None)?;
        let event = DomainEvent::AppointmentApproved {
            appointment_id: self.id.clone(),
            doctor_id: self.doctor_id.clone(),
            patient_id: self.patient_id.clone(),
        };
        self.events.push(event);
        Ok(())
    }

    pub fn reject(
        &mut self,
        actor: &str,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.transition(AppointmentStatus::Rejected, actor, at, reason)?;
        let event = DomainEvent::AppointmentRejected {
            appointment_id: self.id.clone(),
            doctor_id: self.doctor_id.clone(),
            patient_id: self.patient_id.clone(),
        };
        self.events.push(event);
        Ok(())
    }

    pub fn cancel(
        &mut self,
        actor: &str,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.transition(AppointmentStatus::Cancelled, actor, at, reason)?;
        let event = DomainEvent::AppointmentCancelled {
            appointment_id: self.id.clone(),
            doctor_id: self.doctor_id.clone(),
            patient_id: self.patient_id.clone(),
        };
        self.events.push(event);
        Ok(())
    }

    pub fn complete(&mut self, actor: &str, at: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(AppointmentStatus::Completed, actor, at, None)?;
        let event = DomainEvent::AppointmentCompleted {
            appointment_id: self.id.clone(),
            doctor_id: self.doctor_id.clone(),
            patient_id: self.patient_id.clone(),
        };
        self.events.push(event);
        Ok(())
    }

    /// Move the appointment to a new range and mark it `Rescheduled`.
    ///
    /// The audit entry records both the old and the new range.
    pub fn reschedule(
        &mut self,
        new_range: TimeRange,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_transition(AppointmentStatus::Rescheduled)?;
        let previous = self.range;
        self.range = new_range;
        self.status = AppointmentStatus::Rescheduled;
        self.record(
            actor,
            "rescheduled",
            at,
            [("from", previous.to_string()), ("to", new_range.to_string())],
        );
        let event = DomainEvent::AppointmentRescheduled {
            appointment_id: self.id.clone(),
            doctor_id: self.doctor_id.clone(),
            patient_id: self.patient_id.clone(),
            previous_start: previous.start(),
        };
        self.events.push(event);
        Ok(())
    }

    fn ensure_transition(&self, next: AppointmentStatus) -> Result<(), DomainError> {
        if self.status.can_become(next) {
            Ok(())
        } else {
            Err(DomainError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            })
        }
    }

    fn transition(
        &mut self,
        next: AppointmentStatus,
        actor: &str,
        at: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Result<(), DomainError> {
        self.ensure_transition(next)?;
        let previous = self.status;
        self.status = next;
        let mut metadata = vec![("from", previous.to_string())];
        if let Some(reason) = reason {
            metadata.push(("reason", reason.to_string()));
        }
        self.record(actor, &next.to_string().to_lowercase(), at, metadata);
        Ok(())
    }

    fn record<I>(&mut self, actor: &str, action: &str, at: DateTime<Utc>, metadata: I)
    where
        I: IntoIterator<Item = (&'static str, String)>,
    {
        self.audit.push(AuditEntry {
            at,
            actor: actor.to_string(),
            action: action.to_string(),
            metadata: metadata
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        });
    }
}

impl EventSource for Appointment {
    fn pending_events(&self) -> &[DomainEvent] {
        &self.events
    }

    fn clear_events(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn booked() -> Appointment {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let range = TimeRange::starting_at(start, Duration::minutes(30)).unwrap();
        Appointment::schedule("apt-1", "doc-1", "pat-1", range, "frontdesk", start)
    }

    #[test]
    fn scheduling_raises_event_and_audits() {
        let appointment = booked();
        assert_eq!(appointment.status(), AppointmentStatus::Pending);
        assert_eq!(appointment.pending_events().len(), 1);
        assert_eq!(
            appointment.pending_events()[0].event_type(),
            DomainEvent::APPOINTMENT_SCHEDULED
        );
        assert_eq!(appointment.audit()[0].action, "scheduled");
    }

    #[test]
    fn reschedule_records_old_and_new_range() {
        let mut appointment = booked();
        appointment.clear_events();
        let old = appointment.range();
        let new = old.shifted(Duration::minutes(45));

        appointment.reschedule(new, "dr-house", Utc::now()).unwrap();

        assert_eq!(appointment.status(), AppointmentStatus::Rescheduled);
        assert_eq!(appointment.range(), new);
        let entry = appointment.audit().last().unwrap();
        assert_eq!(entry.actor, "dr-house");
        assert_eq!(entry.metadata["from"], old.to_string());
        assert_eq!(entry.metadata["to"], new.to_string());
        match &appointment.pending_events()[0] {
            DomainEvent::AppointmentRescheduled { previous_start, .. } => {
                assert_eq!(*previous_start, old.start())
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn terminal_statuses_reject_transitions() {
        let mut appointment = booked();
        appointment.cancel("patient", Some("travel"), Utc::now()).unwrap();

        let err = appointment.approve("dr-house", Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert!(appointment
            .reschedule(appointment.range(), "dr-house", Utc::now())
            .is_err());
        assert!(!appointment.is_active());
    }

    #[test]
    fn cleared_events_are_not_repeated() {
        let mut appointment = booked();
        appointment.clear_events();
        appointment.approve("dr-house", Utc::now()).unwrap();
        assert_eq!(appointment.pending_events().len(), 1);
        assert_eq!(
            appointment.pending_events()[0].event_type(),
            DomainEvent::APPOINTMENT_APPROVED
        );
    }
}
