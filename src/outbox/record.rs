use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Channel, DomainEvent};

/// An outbox row before the store has assigned it an id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOutboxRecord {
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: String,
    pub channel: Channel,
    pub occurred_at: DateTime<Utc>,
}

impl NewOutboxRecord {
    /// Serialize a domain event into an outbox row.
    pub fn from_event(
        event: &DomainEvent,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            aggregate_id: event.aggregate_id().to_string(),
            event_type: event.event_type().to_string(),
            payload: serde_json::to_string(event)?,
            channel: event.channel(),
            occurred_at,
        })
    }

    pub fn into_record(self, id: u64) -> OutboxRecord {
        OutboxRecord {
            id,
            aggregate_id: self.aggregate_id,
            event_type: self.event_type,
            payload: self.payload,
            channel: self.channel,
            occurred_at: self.occurred_at,
            processed: false,
            processed_at: None,
            attempts: 0,
            last_error: None,
        }
    }
}

/// Where a record stands in its delivery lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutboxState {
    Pending,
    Delivered,
    /// Retired without a successful delivery.
    Exhausted,
}

/// Durable domain event awaiting delivery.
///
/// Written in the same commit as the state change that raised the event and
/// afterwards changed only by the outbox processor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: u64,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: String,
    pub channel: Channel,
    pub occurred_at: DateTime<Utc>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl OutboxRecord {
    pub fn state(&self) -> OutboxState {
        match (self.processed, &self.last_error) {
            (false, _) => OutboxState::Pending,
            (true, None) => OutboxState::Delivered,
            (true, Some(_)) => OutboxState::Exhausted,
        }
    }

    /// Decode the payload back into the event that produced it.
    pub fn event(&self) -> Result<DomainEvent, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }

    pub(crate) fn mark_delivered(&mut self, now: DateTime<Utc>) {
        self.attempts = self.attempts.saturating_add(1);
        self.processed = true;
        self.processed_at = Some(now);
        self.last_error = None;
    }

    /// Count a failed attempt; retire the record once it reaches `ceiling`.
    /// Returns whether the record was retired.
    pub(crate) fn mark_failed(&mut self, error: String, ceiling: u32, now: DateTime<Utc>) -> bool {
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(error);
        if self.attempts >= ceiling {
            self.retire(now);
            return true;
        }
        false
    }

    pub(crate) fn retire(&mut self, now: DateTime<Utc>) {
        self.processed = true;
        self.processed_at = Some(now);
    }
}
