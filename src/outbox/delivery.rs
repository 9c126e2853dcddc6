use std::sync::{Arc, Mutex};

use async_trait::async_trait;

#[cfg(feature = "emitter")]
use event_emitter_rs::EventEmitter;

/// Result of handing one outbox record to an external channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Worth retrying (timeouts, throttling, gateway 5xx).
    TransientFailure(String),
    /// Retrying will not help (bad address, rejected content).
    PermanentFailure(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// The external-delivery boundary for outbox records (email, SMS, webhooks).
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Deliver an event with the given type tag and JSON payload.
    async fn dispatch(&self, event_type: &str, payload: &str) -> DeliveryOutcome;
}

#[async_trait]
impl<D: Delivery + ?Sized> Delivery for Arc<D> {
    async fn dispatch(&self, event_type: &str, payload: &str) -> DeliveryOutcome {
        (**self).dispatch(event_type, payload).await
    }
}

/// Delivers by logging, optionally into a shared buffer.
#[derive(Clone, Default)]
pub struct LogDelivery {
    buffer: Option<Arc<Mutex<Vec<String>>>>,
}

impl LogDelivery {
    pub fn new() -> Self {
        Self { buffer: None }
    }

    pub fn with_buffer(buffer: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            buffer: Some(buffer),
        }
    }
}

#[async_trait]
impl Delivery for LogDelivery {
    async fn dispatch(&self, event_type: &str, payload: &str) -> DeliveryOutcome {
        let line = format!("[OUTBOX] {} {}", event_type, payload);
        match &self.buffer {
            Some(buffer) => match buffer.lock() {
                Ok(mut buffer) => {
                    buffer.push(line);
                    DeliveryOutcome::Delivered
                }
                Err(_) => DeliveryOutcome::TransientFailure("log buffer poisoned".into()),
            },
            None => {
                tracing::info!(event_type, payload, "outbox delivery");
                DeliveryOutcome::Delivered
            }
        }
    }
}

/// Emits records to in-process listeners registered on an `EventEmitter`.
#[cfg(feature = "emitter")]
pub struct LocalEmitterDelivery {
    emitter: Mutex<EventEmitter>,
}

#[cfg(feature = "emitter")]
impl LocalEmitterDelivery {
    pub fn new(emitter: EventEmitter) -> Self {
        Self {
            emitter: Mutex::new(emitter),
        }
    }
}

#[cfg(feature = "emitter")]
#[async_trait]
impl Delivery for LocalEmitterDelivery {
    async fn dispatch(&self, event_type: &str, payload: &str) -> DeliveryOutcome {
        match self.emitter.lock() {
            Ok(mut emitter) => {
                emitter.emit(event_type, payload.to_string());
                DeliveryOutcome::Delivered
            }
            Err(_) => DeliveryOutcome::TransientFailure("event emitter poisoned".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_delivery_to_buffer() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let delivery = LogDelivery::with_buffer(buffer.clone());

        let first = delivery
            .dispatch("AppointmentScheduled", r#"{"appointment_id":"apt-1"}"#)
            .await;
        delivery
            .dispatch("AppointmentCancelled", r#"{"appointment_id":"apt-1"}"#)
            .await;

        assert!(first.is_delivered());
        let logs = buffer.lock().unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs[0].contains("AppointmentScheduled"));
        assert!(logs[1].contains("AppointmentCancelled"));
    }

    #[cfg(feature = "emitter")]
    #[tokio::test]
    async fn emitter_delivery_reaches_listeners() {
        use std::sync::mpsc;
        use std::time::Duration;

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let mut emitter = EventEmitter::new();
        emitter.on("FollowUpCreated", move |payload: String| {
            if let Ok(tx) = tx.lock() {
                let _ = tx.send(payload);
            }
        });

        let delivery = LocalEmitterDelivery::new(emitter);
        let outcome = delivery
            .dispatch("FollowUpCreated", r#"{"follow_up_id":"fu-1"}"#)
            .await;

        assert!(outcome.is_delivered());
        let received = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(received.contains("fu-1"));
    }
}
