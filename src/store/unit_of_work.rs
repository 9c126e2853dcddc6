//! UnitOfWork - chain mutated entities and free-standing events into one
//! atomic commit, with their domain events written to the outbox.
//!
//! ## Example
//!
//! ```ignore
//! UnitOfWork::new(&store)
//!     .appointment(&mut appointment)
//!     .task(&mut reminder)
//!     .event(follow_up_created)
//!     .commit(Utc::now())?;
//! ```

use chrono::{DateTime, Utc};

use super::{ChangeSet, Commit, StoreError};
use crate::domain::{Appointment, DomainEvent, EventSource, FollowUpTask};
use crate::outbox::OutboxDispatcher;

pub struct UnitOfWork<'a, S> {
    store: &'a S,
    appointments: Vec<&'a mut Appointment>,
    tasks: Vec<&'a mut FollowUpTask>,
    events: Vec<DomainEvent>,
}

impl<'a, S: Commit> UnitOfWork<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            appointments: Vec::new(),
            tasks: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn appointment(mut self, appointment: &'a mut Appointment) -> Self {
        self.appointments.push(appointment);
        self
    }

    pub fn appointments<I>(mut self, appointments: I) -> Self
    where
        I: IntoIterator<Item = &'a mut Appointment>,
    {
        self.appointments.extend(appointments);
        self
    }

    pub fn task(mut self, task: &'a mut FollowUpTask) -> Self {
        self.tasks.push(task);
        self
    }

    /// Add an event raised outside any tracked entity.
    pub fn event(mut self, event: DomainEvent) -> Self {
        self.events.push(event);
        self
    }

    /// Commit state and outbox rows together.
    ///
    /// Entity events are cleared only after the store accepts the commit, so
    /// a failed commit can be retried with the same entities. Returns the ids
    /// of the outbox records written.
    pub fn commit(mut self, now: DateTime<Utc>) -> Result<Vec<u64>, StoreError> {
        let pass = OutboxDispatcher::begin();
        let outbox = match &pass {
            Some(pass) => {
                let sources: Vec<&dyn EventSource> = self
                    .appointments
                    .iter()
                    .map(|a| &**a as &dyn EventSource)
                    .collect();
                pass.collect(&sources, &self.events, now)?
            }
            None if !self.events.is_empty() => {
                return Err(StoreError::InvalidData(
                    "free-standing events cannot be committed inside another commit".into(),
                ));
            }
            None if self.appointments.iter().any(|a| !a.pending_events().is_empty()) => {
                return Err(StoreError::InvalidData(
                    "entities with pending events cannot be committed inside another commit"
                        .into(),
                ));
            }
            None => {
                tracing::debug!("nested commit without events");
                Vec::new()
            }
        };

        let appointments = self
            .appointments
            .iter()
            .map(|a| {
                let mut stored = (**a).clone();
                stored.clear_events();
                stored
            })
            .collect();
        let tasks = self.tasks.iter().map(|t| (**t).clone()).collect();

        let ids = self.store.commit(ChangeSet {
            appointments,
            tasks,
            outbox,
        })?;

        if pass.is_some() {
            for appointment in self.appointments.iter_mut() {
                appointment.clear_events();
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TimeRange;
    use crate::store::{AppointmentStore, InMemoryStore};
    use chrono::Duration;

    fn appointment(id: &str) -> Appointment {
        let now = Utc::now();
        let range = TimeRange::starting_at(now, Duration::minutes(30)).unwrap();
        Appointment::schedule(id, "doc-1", "pat-1", range, "desk", now)
    }

    #[test]
    fn commit_writes_state_and_outbox_then_clears_events() {
        let store = InMemoryStore::new();
        let mut apt = appointment("apt-1");

        let ids = UnitOfWork::new(&store)
            .appointment(&mut apt)
            .commit(Utc::now())
            .unwrap();

        assert_eq!(ids.len(), 1);
        assert!(apt.pending_events().is_empty());
        let stored = store.appointment("apt-1").unwrap().unwrap();
        assert!(stored.pending_events().is_empty());

        // A second commit of the same entity does not re-emit.
        UnitOfWork::new(&store)
            .appointment(&mut apt)
            .commit(Utc::now())
            .unwrap();
        assert_eq!(store.outbox_records().unwrap().len(), 1);
    }

    #[test]
    fn failed_commit_keeps_events_for_retry() {
        let store = InMemoryStore::new();
        let mut apt = appointment("apt-1");

        store.fail_next_commit();
        assert!(UnitOfWork::new(&store)
            .appointment(&mut apt)
            .commit(Utc::now())
            .is_err());
        assert_eq!(apt.pending_events().len(), 1);
        assert!(store.outbox_records().unwrap().is_empty());

        UnitOfWork::new(&store)
            .appointment(&mut apt)
            .commit(Utc::now())
            .unwrap();
        assert_eq!(store.outbox_records().unwrap().len(), 1);
    }

    #[test]
    fn nested_commit_with_pending_events_is_rejected() {
        let store = InMemoryStore::new();
        let mut apt = appointment("apt-1");

        let outer = OutboxDispatcher::begin().unwrap();
        let err = UnitOfWork::new(&store)
            .appointment(&mut apt)
            .commit(Utc::now())
            .unwrap_err();

        assert!(matches!(err, StoreError::InvalidData(_)));
        assert!(store.appointment("apt-1").unwrap().is_none());
        assert!(store.outbox_records().unwrap().is_empty());
        assert_eq!(apt.pending_events().len(), 1);

        // Once the outer pass closes, the same entity commits with its event.
        drop(outer);
        UnitOfWork::new(&store)
            .appointment(&mut apt)
            .commit(Utc::now())
            .unwrap();
        assert_eq!(store.outbox_records().unwrap().len(), 1);
    }

    #[test]
    fn nested_commit_without_events_goes_through() {
        let store = InMemoryStore::new();
        let mut apt = appointment("apt-1");
        UnitOfWork::new(&store)
            .appointment(&mut apt)
            .commit(Utc::now())
            .unwrap();

        let _outer = OutboxDispatcher::begin().unwrap();
        apt.notes = Some("bring previous x-rays".into());
        UnitOfWork::new(&store)
            .appointment(&mut apt)
            .commit(Utc::now())
            .unwrap();

        let stored = store.appointment("apt-1").unwrap().unwrap();
        assert_eq!(stored.notes.as_deref(), Some("bring previous x-rays"));
        assert_eq!(store.outbox_records().unwrap().len(), 1);
    }
}
