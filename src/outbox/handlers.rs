use std::collections::HashMap;
use std::sync::Arc;

use super::delivery::Delivery;

/// Routes outbox records to a delivery by event-type tag.
///
/// ```ignore
/// let handlers = HandlerRegistry::new()
///     .handler(DomainEvent::APPOINTMENT_RESCHEDULED, sms_gateway.clone())
///     .handler(DomainEvent::APPOINTMENT_CANCELLED, sms_gateway)
///     .fallback(email_gateway);
/// ```
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Delivery>>,
    fallback: Option<Arc<dyn Delivery>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the delivery for one event type. Replaces any earlier one.
    pub fn handler<D>(mut self, event_type: &str, delivery: D) -> Self
    where
        D: Delivery + 'static,
    {
        self.handlers
            .insert(event_type.to_string(), Arc::new(delivery));
        self
    }

    /// Delivery used for event types without a dedicated handler.
    pub fn fallback<D>(mut self, delivery: D) -> Self
    where
        D: Delivery + 'static,
    {
        self.fallback = Some(Arc::new(delivery));
        self
    }

    pub fn route(&self, event_type: &str) -> Option<Arc<dyn Delivery>> {
        self.handlers
            .get(event_type)
            .cloned()
            .or_else(|| self.fallback.clone())
    }

    pub fn has(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::LogDelivery;
    use std::sync::Mutex;

    #[tokio::test]
    async fn routes_by_tag_then_fallback() {
        let sms = Arc::new(Mutex::new(Vec::new()));
        let email = Arc::new(Mutex::new(Vec::new()));
        let registry = HandlerRegistry::new()
            .handler("AppointmentCancelled", LogDelivery::with_buffer(sms.clone()))
            .fallback(LogDelivery::with_buffer(email.clone()));

        registry
            .route("AppointmentCancelled")
            .unwrap()
            .dispatch("AppointmentCancelled", "{}")
            .await;
        registry
            .route("FollowUpCreated")
            .unwrap()
            .dispatch("FollowUpCreated", "{}")
            .await;

        assert_eq!(sms.lock().unwrap().len(), 1);
        assert_eq!(email.lock().unwrap().len(), 1);
        assert!(registry.has("AppointmentCancelled"));
        assert!(!registry.has("FollowUpCreated"));
    }

    #[test]
    fn empty_registry_routes_nothing() {
        assert!(HandlerRegistry::new().route("Anything").is_none());
    }
}
