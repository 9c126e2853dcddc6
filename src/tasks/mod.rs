mod backoff;
mod delivery;
mod scheduler;
mod worker;

pub use backoff::BackoffPolicy;
pub use delivery::{LogTaskDelivery, TaskDelivery, TaskDispatchError};
pub use scheduler::{TaskScheduler, TickResult};
pub use worker::TaskWorker;
