use std::cell::Cell;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};

use super::record::NewOutboxRecord;
use crate::domain::{DomainEvent, EventSource};

thread_local! {
    static DISPATCHING: Cell<bool> = const { Cell::new(false) };
}

/// Turns pending domain events into outbox rows at commit time.
///
/// A dispatch pass lasts for the whole commit. A commit started while a
/// pass is already open on the same thread gets no pass, so the events of
/// the enclosing commit are written exactly once.
pub struct OutboxDispatcher;

impl OutboxDispatcher {
    /// Open a dispatch pass, or `None` when one is already open on this thread.
    pub fn begin() -> Option<DispatchPass> {
        DISPATCHING.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(DispatchPass {
                    _thread_bound: PhantomData,
                })
            }
        })
    }

    pub fn is_dispatching() -> bool {
        DISPATCHING.with(Cell::get)
    }
}

/// An open dispatch pass. Closes when dropped.
pub struct DispatchPass {
    _thread_bound: PhantomData<*const ()>,
}

impl DispatchPass {
    /// Serialize the pending events of `sources`, then `extra`, into rows.
    ///
    /// Sources keep their events; the caller clears them once the rows are
    /// committed.
    pub fn collect(
        &self,
        sources: &[&dyn EventSource],
        extra: &[DomainEvent],
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<NewOutboxRecord>, serde_json::Error> {
        sources
            .iter()
            .flat_map(|source| source.pending_events())
            .chain(extra)
            .map(|event| NewOutboxRecord::from_event(event, occurred_at))
            .collect()
    }
}

impl Drop for DispatchPass {
    fn drop(&mut self) {
        DISPATCHING.with(|flag| flag.set(false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Appointment, TimeRange};
    use chrono::Duration;

    #[test]
    fn nested_pass_is_refused() {
        let outer = OutboxDispatcher::begin();
        assert!(outer.is_some());
        assert!(OutboxDispatcher::is_dispatching());
        assert!(OutboxDispatcher::begin().is_none());

        drop(outer);
        assert!(!OutboxDispatcher::is_dispatching());
        assert!(OutboxDispatcher::begin().is_some());
    }

    #[test]
    fn passes_on_other_threads_are_independent() {
        let _outer = OutboxDispatcher::begin().unwrap();
        let other = std::thread::spawn(|| OutboxDispatcher::begin().is_some())
            .join()
            .unwrap();
        assert!(other);
    }

    #[test]
    fn collects_entity_events_then_extras() {
        let now = Utc::now();
        let range = TimeRange::starting_at(now, Duration::minutes(30)).unwrap();
        let appointment = Appointment::schedule("apt-1", "doc-1", "pat-1", range, "desk", now);
        let extra = DomainEvent::FollowUpCreated {
            follow_up_id: "fu-1".into(),
            patient_id: "pat-1".into(),
            task_ids: vec![],
        };

        let pass = OutboxDispatcher::begin().unwrap();
        let rows = pass.collect(&[&appointment], &[extra], now).unwrap();

        let types: Vec<_> = rows.iter().map(|r| r.event_type.as_str()).collect();
        assert_eq!(
            types,
            [
                DomainEvent::APPOINTMENT_SCHEDULED,
                DomainEvent::FOLLOW_UP_CREATED
            ]
        );
        assert_eq!(appointment.pending_events().len(), 1);
    }
}
