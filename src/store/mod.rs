//! Persistence boundary consumed by the scheduler core.
//!
//! Every trait is synchronous and every method is one atomic operation
//! against the backing store. Conditional updates (lock rows, task claims,
//! outcome saves) carry their predicate into the store so they stay correct
//! across processes, not just threads.

mod error;
mod memory;
mod unit_of_work;

use chrono::{DateTime, Utc};

use crate::domain::{Appointment, FollowUpTask, WorkingHours};
use crate::outbox::{NewOutboxRecord, OutboxRecord};

pub use error::StoreError;
pub use memory::InMemoryStore;
pub use unit_of_work::UnitOfWork;

pub trait AppointmentStore: Send + Sync {
    fn appointment(&self, id: &str) -> Result<Option<Appointment>, StoreError>;

    /// The doctor's appointments starting at or after `from`, ordered by
    /// start time (ties broken by id).
    fn appointments_for_doctor_from(
        &self,
        doctor_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError>;

    /// Working hours for a doctor. Doctors without hours get an empty schedule.
    fn working_hours(&self, doctor_id: &str) -> Result<WorkingHours, StoreError>;
}

/// Lock rows with expiry, keyed by doctor id.
pub trait ScheduleLockStore: Send + Sync {
    /// Take the doctor's lock row for `holder` until `expires_at`.
    ///
    /// Succeeds when the row is absent, expired at `now`, or already owned by
    /// `holder`. Returns `false` when someone else holds a live lock.
    fn try_acquire_lock(
        &self,
        doctor_id: &str,
        holder: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Drop the row if `holder` still owns it.
    fn release_lock(&self, doctor_id: &str, holder: &str) -> Result<(), StoreError>;
}

pub trait OutboxStore: Send + Sync {
    /// Unprocessed records with fewer than `ceiling` attempts, oldest first.
    fn select_pending_outbox(
        &self,
        limit: usize,
        ceiling: u32,
    ) -> Result<Vec<OutboxRecord>, StoreError>;

    /// Persist processor outcomes in one write.
    ///
    /// A record already marked processed in the store is left untouched.
    /// Returns the number of records updated.
    fn save_outbox_outcomes(&self, batch: &[OutboxRecord]) -> Result<usize, StoreError>;
}

pub trait FollowUpTaskStore: Send + Sync {
    fn task(&self, id: &str) -> Result<Option<FollowUpTask>, StoreError>;

    fn tasks_for_follow_up(&self, follow_up_id: &str) -> Result<Vec<FollowUpTask>, StoreError>;

    /// Atomically claim up to `batch_size` due tasks for `worker_id`.
    ///
    /// Selection and the claim write happen under one write, so concurrent
    /// callers never receive the same task.
    fn claim_due_tasks(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        batch_size: usize,
        lease: chrono::Duration,
    ) -> Result<Vec<FollowUpTask>, StoreError>;

    /// Persist outcomes for tasks claimed by `worker_id`.
    ///
    /// An outcome applies only while the stored task is still in progress
    /// under the same claim. Returns the number of tasks updated.
    fn save_task_outcomes(
        &self,
        worker_id: &str,
        batch: &[FollowUpTask],
    ) -> Result<usize, StoreError>;
}

/// Everything one unit of work writes.
#[derive(Clone, Debug, Default)]
pub struct ChangeSet {
    pub appointments: Vec<Appointment>,
    pub tasks: Vec<FollowUpTask>,
    pub outbox: Vec<NewOutboxRecord>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.appointments.is_empty() && self.tasks.is_empty() && self.outbox.is_empty()
    }
}

pub trait Commit: Send + Sync {
    /// Apply the whole change set or nothing. Returns the ids assigned to
    /// the new outbox records, in order.
    fn commit(&self, changes: ChangeSet) -> Result<Vec<u64>, StoreError>;
}
