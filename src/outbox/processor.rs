use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;

use super::delivery::DeliveryOutcome;
use super::handlers::HandlerRegistry;
use super::record::OutboxRecord;
use crate::config::OutboxConfig;
use crate::store::{OutboxStore, StoreError};
use crate::worker::{PollingJob, TickReport};

/// Result of a batch drain operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainResult {
    pub selected: usize,
    pub delivered: usize,
    /// Failed but still under the retry ceiling.
    pub retried: usize,
    /// Retired without delivery.
    pub exhausted: usize,
    /// Outcomes the store accepted.
    pub saved: usize,
}

/// What processing did to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Already processed; nothing was delivered.
    Skipped,
    Delivered,
    Retried,
    Exhausted,
}

/// Polls the outbox and hands each pending record to its handler.
pub struct OutboxProcessor<S> {
    store: S,
    handlers: HandlerRegistry,
    batch_size: usize,
    retry_ceiling: u32,
}

impl<S> OutboxProcessor<S> {
    pub fn new(store: S, handlers: HandlerRegistry) -> Self {
        Self {
            store,
            handlers,
            batch_size: 50,
            retry_ceiling: 5,
        }
    }

    pub fn from_config(store: S, handlers: HandlerRegistry, config: &OutboxConfig) -> Self {
        Self::new(store, handlers)
            .with_batch_size(config.batch_size)
            .with_retry_ceiling(config.retry_ceiling)
    }

    /// Set the batch size (max records selected per drain).
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the attempt count at which a record is retired.
    pub fn with_retry_ceiling(mut self, ceiling: u32) -> Self {
        self.retry_ceiling = ceiling.max(1);
        self
    }

    pub fn retry_ceiling(&self) -> u32 {
        self.retry_ceiling
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: OutboxStore> OutboxProcessor<S> {
    /// Deliver one record and update it in place.
    ///
    /// Handler panics count as a failed attempt. The caller persists the
    /// record afterwards.
    pub async fn process_record(
        &self,
        record: &mut OutboxRecord,
        now: DateTime<Utc>,
    ) -> RecordOutcome {
        if record.processed {
            return RecordOutcome::Skipped;
        }

        let outcome = match self.handlers.route(&record.event_type) {
            Some(handler) => {
                AssertUnwindSafe(handler.dispatch(&record.event_type, &record.payload))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        DeliveryOutcome::TransientFailure(format!(
                            "handler panicked: {}",
                            panic_message(panic.as_ref())
                        ))
                    })
            }
            None => DeliveryOutcome::PermanentFailure(format!(
                "no handler for event type {}",
                record.event_type
            )),
        };

        match outcome {
            DeliveryOutcome::Delivered => {
                record.mark_delivered(now);
                tracing::debug!(id = record.id, event_type = %record.event_type, "outbox record delivered");
                RecordOutcome::Delivered
            }
            DeliveryOutcome::TransientFailure(error) => {
                tracing::warn!(
                    id = record.id,
                    event_type = %record.event_type,
                    attempts = record.attempts + 1,
                    error = %error,
                    "outbox delivery failed"
                );
                if record.mark_failed(error, self.retry_ceiling, now) {
                    tracing::error!(id = record.id, attempts = record.attempts, "outbox record exhausted");
                    RecordOutcome::Exhausted
                } else {
                    RecordOutcome::Retried
                }
            }
            DeliveryOutcome::PermanentFailure(error) => {
                tracing::error!(
                    id = record.id,
                    event_type = %record.event_type,
                    error = %error,
                    "outbox delivery rejected permanently"
                );
                record.mark_failed(error, record.attempts.saturating_add(1), now);
                RecordOutcome::Exhausted
            }
        }
    }

    /// Select one batch, deliver it, and save every outcome in one write.
    pub async fn run_once(&self) -> Result<DrainResult, StoreError> {
        let mut batch = self
            .store
            .select_pending_outbox(self.batch_size, self.retry_ceiling)?;
        let mut result = DrainResult {
            selected: batch.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            return Ok(result);
        }

        for record in batch.iter_mut() {
            match self.process_record(record, Utc::now()).await {
                RecordOutcome::Delivered => result.delivered += 1,
                RecordOutcome::Retried => result.retried += 1,
                RecordOutcome::Exhausted => result.exhausted += 1,
                RecordOutcome::Skipped => {}
            }
        }

        result.saved = self.store.save_outbox_outcomes(&batch)?;
        Ok(result)
    }
}

#[async_trait]
impl<S: OutboxStore> PollingJob for OutboxProcessor<S> {
    fn name(&self) -> &'static str {
        "outbox"
    }

    async fn tick(&self) -> Result<TickReport, StoreError> {
        let drained = self.run_once().await?;
        Ok(TickReport {
            processed: drained.delivered,
            failed: drained.retried + drained.exhausted,
        })
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainEvent;
    use crate::outbox::{Delivery, LogDelivery, NewOutboxRecord};
    use crate::store::{ChangeSet, Commit, InMemoryStore};
    use std::sync::{Arc, Mutex};

    struct Always(DeliveryOutcome);

    #[async_trait]
    impl Delivery for Always {
        async fn dispatch(&self, _: &str, _: &str) -> DeliveryOutcome {
            self.0.clone()
        }
    }

    fn seed(store: &InMemoryStore, events: &[DomainEvent]) {
        let outbox = events
            .iter()
            .map(|e| NewOutboxRecord::from_event(e, Utc::now()).unwrap())
            .collect();
        store
            .commit(ChangeSet {
                outbox,
                ..Default::default()
            })
            .unwrap();
    }

    fn cancelled(id: &str) -> DomainEvent {
        DomainEvent::AppointmentCancelled {
            appointment_id: id.into(),
            doctor_id: "doc-1".into(),
            patient_id: "pat-1".into(),
        }
    }

    #[tokio::test]
    async fn delivers_and_marks_processed() {
        let store = InMemoryStore::new();
        seed(&store, &[cancelled("a"), cancelled("b")]);
        let sent = Arc::new(Mutex::new(Vec::new()));
        let processor = OutboxProcessor::new(
            store.clone(),
            HandlerRegistry::new().fallback(LogDelivery::with_buffer(sent.clone())),
        );

        let drained = processor.run_once().await.unwrap();
        assert_eq!(drained.selected, 2);
        assert_eq!(drained.delivered, 2);
        assert_eq!(drained.saved, 2);
        assert_eq!(sent.lock().unwrap().len(), 2);

        let again = processor.run_once().await.unwrap();
        assert_eq!(again.selected, 0);
    }

    #[tokio::test]
    async fn permanent_failure_retires_on_first_attempt() {
        let store = InMemoryStore::new();
        seed(&store, &[cancelled("a")]);
        let processor = OutboxProcessor::new(
            store.clone(),
            HandlerRegistry::new().fallback(Always(DeliveryOutcome::PermanentFailure(
                "invalid phone number".into(),
            ))),
        )
        .with_retry_ceiling(5);

        let drained = processor.run_once().await.unwrap();
        assert_eq!(drained.exhausted, 1);

        let record = &store.outbox_records().unwrap()[0];
        assert_eq!(record.attempts, 1);
        assert!(record.processed);
        assert_eq!(record.last_error.as_deref(), Some("invalid phone number"));
    }

    #[tokio::test]
    async fn unknown_event_type_is_permanent() {
        let store = InMemoryStore::new();
        seed(&store, &[cancelled("a")]);
        let processor = OutboxProcessor::new(store.clone(), HandlerRegistry::new());

        let drained = processor.run_once().await.unwrap();
        assert_eq!(drained.exhausted, 1);
        assert!(store.outbox_records().unwrap()[0]
            .last_error
            .as_deref()
            .unwrap()
            .contains("no handler"));
    }

    #[tokio::test]
    async fn processed_record_is_skipped() {
        let store = InMemoryStore::new();
        seed(&store, &[cancelled("a")]);
        let sent = Arc::new(Mutex::new(Vec::new()));
        let processor = OutboxProcessor::new(
            store.clone(),
            HandlerRegistry::new().fallback(LogDelivery::with_buffer(sent.clone())),
        );

        let mut record = store.outbox_records().unwrap().remove(0);
        record.mark_delivered(Utc::now());
        let outcome = processor.process_record(&mut record, Utc::now()).await;

        assert_eq!(outcome, RecordOutcome::Skipped);
        assert!(sent.lock().unwrap().is_empty());
    }
}
