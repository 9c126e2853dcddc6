mod error;
mod in_memory;
mod lock;
mod lock_manager;

pub use error::LockError;
pub use in_memory::LockTable;
pub use lock::ScheduleLock;
pub use lock_manager::{ScheduleLockGuard, ScheduleLockManager};
