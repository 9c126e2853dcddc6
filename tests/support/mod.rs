//! Shared fixtures: a seeded clinic store, fixed clock helpers, and
//! deliveries that record what they were handed.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use clinic_scheduler::domain::{Appointment, TimeRange, WorkingHours};
use clinic_scheduler::{Delivery, DeliveryOutcome, InMemoryStore};

pub const DOCTOR: &str = "doc-1";

/// 2024-03-04 is a Monday; `day` picks the date within that March.
pub fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0)
        .single()
        .expect("valid fixture time")
}

pub fn office_hours() -> WorkingHours {
    WorkingHours::weekdays(
        NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
    )
    .unwrap()
}

pub fn appointment(id: &str, start: DateTime<Utc>, minutes: i64) -> Appointment {
    let range = TimeRange::starting_at(start, Duration::minutes(minutes)).unwrap();
    Appointment::schedule(id, DOCTOR, format!("pat-{id}"), range, "front-desk", at(1, 8, 0))
}

/// Store with weekday 09:00-17:00 hours for `DOCTOR` and the given
/// `(id, start, minutes)` bookings.
pub fn clinic(bookings: &[(&str, DateTime<Utc>, i64)]) -> InMemoryStore {
    let store = InMemoryStore::new();
    store.set_working_hours(DOCTOR, office_hours()).unwrap();
    for (id, start, minutes) in bookings {
        store
            .insert_appointment(appointment(id, *start, *minutes))
            .unwrap();
    }
    store
}

/// Records every delivery as `"{event_type}"` and reports success.
#[derive(Clone, Default)]
pub struct RecordingDelivery {
    pub seen: Arc<Mutex<Vec<String>>>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn dispatch(&self, event_type: &str, _payload: &str) -> DeliveryOutcome {
        self.seen.lock().unwrap().push(event_type.to_string());
        DeliveryOutcome::Delivered
    }
}

/// Fails transiently every time and counts the calls.
#[derive(Clone, Default)]
pub struct FlakyDelivery {
    pub calls: Arc<AtomicUsize>,
}

impl FlakyDelivery {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Delivery for FlakyDelivery {
    async fn dispatch(&self, _event_type: &str, _payload: &str) -> DeliveryOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        DeliveryOutcome::TransientFailure("gateway timeout".into())
    }
}

pub struct PanickingDelivery;

#[async_trait]
impl Delivery for PanickingDelivery {
    async fn dispatch(&self, _event_type: &str, _payload: &str) -> DeliveryOutcome {
        panic!("template engine crashed")
    }
}
