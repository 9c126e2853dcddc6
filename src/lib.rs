pub mod cascade;
pub mod config;
pub mod domain;
pub mod lock;
pub mod outbox;
pub mod service;
pub mod store;
pub mod tasks;
pub mod worker;

pub use cascade::{CascadeEngine, CascadeError, CascadeOutcome, CascadeRequest, Reassignment};
pub use config::{CascadeConfig, ConfigError, CoreConfig, OutboxConfig, TaskSchedulerConfig};
pub use domain::{
    Appointment, AppointmentStatus, DomainError, DomainEvent, FollowUpTask, TaskStatus, TaskType,
    TimeRange, WorkingHours,
};
pub use lock::{LockError, ScheduleLockGuard, ScheduleLockManager};
pub use outbox::{
    Delivery, DeliveryOutcome, HandlerRegistry, LogDelivery, OutboxDispatcher, OutboxProcessor,
    OutboxRecord, OutboxWorker,
};
pub use service::{ClinicService, FollowUpStep, NewAppointment, NewFollowUp, ServiceError};
pub use store::{InMemoryStore, StoreError, UnitOfWork};
pub use tasks::{BackoffPolicy, TaskDelivery, TaskDispatchError, TaskScheduler, TaskWorker};
pub use worker::{Shutdown, WorkerStats};

#[cfg(feature = "emitter")]
pub use outbox::LocalEmitterDelivery;

// Re-export the EventEmitter from the event_emitter_rs crate
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
