mod delivery;
mod dispatcher;
mod handlers;
mod processor;
mod record;
mod worker;

// Outbox rows
pub use record::{NewOutboxRecord, OutboxRecord, OutboxState};

// Commit-time capture
pub use dispatcher::{DispatchPass, OutboxDispatcher};

// Delivery boundary
#[cfg(feature = "emitter")]
pub use delivery::LocalEmitterDelivery;
pub use delivery::{Delivery, DeliveryOutcome, LogDelivery};
pub use handlers::HandlerRegistry;

// Processing
pub use processor::{DrainResult, OutboxProcessor, RecordOutcome};
pub(crate) use processor::panic_message;
pub use worker::OutboxWorker;
