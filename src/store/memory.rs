use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use super::{
    AppointmentStore, ChangeSet, Commit, FollowUpTaskStore, OutboxStore, ScheduleLockStore,
    StoreError,
};
use crate::domain::{Appointment, FollowUpTask, TaskStatus, WorkingHours};
use crate::lock::{LockTable, ScheduleLock};
use crate::outbox::OutboxRecord;

#[derive(Default)]
struct State {
    appointments: HashMap<String, Appointment>,
    working_hours: HashMap<String, WorkingHours>,
    tasks: BTreeMap<String, FollowUpTask>,
    outbox: Vec<OutboxRecord>,
}

/// Thread-safe in-memory store.
///
/// Cloning creates another handle to the same storage, so workers, services
/// and tests can share one instance across threads.
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    locks: Arc<LockTable>,
    outbox_seq: Arc<AtomicU64>,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            state: Arc::new(RwLock::new(State::default())),
            locks: Arc::new(LockTable::new()),
            outbox_seq: Arc::new(AtomicU64::new(1)),
            fail_next_commit: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_working_hours(
        &self,
        doctor_id: &str,
        hours: WorkingHours,
    ) -> Result<(), StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))?;
        state.working_hours.insert(doctor_id.to_string(), hours);
        Ok(())
    }

    /// Seed an appointment without going through a unit of work.
    pub fn insert_appointment(&self, appointment: Appointment) -> Result<(), StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))?;
        state
            .appointments
            .insert(appointment.id.clone(), appointment);
        Ok(())
    }

    /// Seed a task without going through a unit of work.
    pub fn insert_task(&self, task: FollowUpTask) -> Result<(), StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))?;
        state.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    /// Snapshot of every outbox record, in insertion order.
    pub fn outbox_records(&self) -> Result<Vec<OutboxRecord>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::LockPoisoned("outbox read"))?;
        Ok(state.outbox.clone())
    }

    pub fn schedule_lock(&self, doctor_id: &str) -> Result<Option<ScheduleLock>, StoreError> {
        self.locks.get(doctor_id)
    }

    /// Make the next `commit` fail before writing anything.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AppointmentStore for InMemoryStore {
    fn appointment(&self, id: &str) -> Result<Option<Appointment>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(state.appointments.get(id).cloned())
    }

    fn appointments_for_doctor_from(
        &self,
        doctor_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        let mut found: Vec<Appointment> = state
            .appointments
            .values()
            .filter(|a| a.doctor_id == doctor_id && a.start() >= from)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.start().cmp(&b.start()).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    fn working_hours(&self, doctor_id: &str) -> Result<WorkingHours, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(state
            .working_hours
            .get(doctor_id)
            .cloned()
            .unwrap_or_default())
    }
}

impl ScheduleLockStore for InMemoryStore {
    fn try_acquire_lock(
        &self,
        doctor_id: &str,
        holder: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.locks.try_acquire(doctor_id, holder, expires_at, now)
    }

    fn release_lock(&self, doctor_id: &str, holder: &str) -> Result<(), StoreError> {
        self.locks.release(doctor_id, holder)
    }
}

impl OutboxStore for InMemoryStore {
    fn select_pending_outbox(
        &self,
        limit: usize,
        ceiling: u32,
    ) -> Result<Vec<OutboxRecord>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::LockPoisoned("outbox read"))?;
        let mut pending: Vec<OutboxRecord> = state
            .outbox
            .iter()
            .filter(|r| !r.processed && r.attempts < ceiling)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            a.occurred_at
                .cmp(&b.occurred_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        pending.truncate(limit);
        Ok(pending)
    }

    fn save_outbox_outcomes(&self, batch: &[OutboxRecord]) -> Result<usize, StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::LockPoisoned("outbox write"))?;
        let mut applied = 0;

        for outcome in batch {
            let Some(stored) = state.outbox.iter_mut().find(|r| r.id == outcome.id) else {
                tracing::warn!(id = outcome.id, "outcome for unknown outbox record");
                continue;
            };
            // processed is the guard: another processor already finished it.
            if stored.processed || stored.attempts >= outcome.attempts {
                continue;
            }
            stored.attempts = outcome.attempts;
            stored.processed = outcome.processed;
            stored.processed_at = outcome.processed_at;
            stored.last_error = outcome.last_error.clone();
            applied += 1;
        }

        Ok(applied)
    }
}

impl FollowUpTaskStore for InMemoryStore {
    fn task(&self, id: &str) -> Result<Option<FollowUpTask>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(state.tasks.get(id).cloned())
    }

    fn tasks_for_follow_up(&self, follow_up_id: &str) -> Result<Vec<FollowUpTask>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        let mut tasks: Vec<FollowUpTask> = state
            .tasks
            .values()
            .filter(|t| t.follow_up_id == follow_up_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.scheduled_at);
        Ok(tasks)
    }

    fn claim_due_tasks(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        batch_size: usize,
        lease: chrono::Duration,
    ) -> Result<Vec<FollowUpTask>, StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::LockPoisoned("task write"))?;

        let mut due: Vec<(DateTime<Utc>, String)> = state
            .tasks
            .values()
            .filter(|t| t.is_claimable(now, lease))
            .map(|t| (t.due_at(), t.id.clone()))
            .collect();
        due.sort();
        due.truncate(batch_size);

        let mut claimed = Vec::with_capacity(due.len());
        for (_, id) in due {
            if let Some(task) = state.tasks.get_mut(&id) {
                task.claim(worker_id, now);
                claimed.push(task.clone());
            }
        }
        Ok(claimed)
    }

    fn save_task_outcomes(
        &self,
        worker_id: &str,
        batch: &[FollowUpTask],
    ) -> Result<usize, StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::LockPoisoned("task write"))?;
        let mut applied = 0;

        for outcome in batch {
            let Some(stored) = state.tasks.get_mut(&outcome.id) else {
                tracing::warn!(task_id = %outcome.id, "outcome for unknown task");
                continue;
            };
            let still_ours = stored.status == TaskStatus::InProgress
                && stored.claimed_by.as_deref() == Some(worker_id);
            if !still_ours {
                tracing::debug!(
                    task_id = %outcome.id,
                    status = %stored.status,
                    "task changed while in flight; outcome dropped"
                );
                continue;
            }
            *stored = outcome.clone();
            applied += 1;
        }

        Ok(applied)
    }
}

impl Commit for InMemoryStore {
    fn commit(&self, changes: ChangeSet) -> Result<Vec<u64>, StoreError> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected commit failure".into()));
        }

        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))?;

        for appointment in changes.appointments {
            state
                .appointments
                .insert(appointment.id.clone(), appointment);
        }
        for task in changes.tasks {
            state.tasks.insert(task.id.clone(), task);
        }

        let mut ids = Vec::with_capacity(changes.outbox.len());
        for record in changes.outbox {
            let id = self.outbox_seq.fetch_add(1, Ordering::SeqCst);
            state.outbox.push(record.into_record(id));
            ids.push(id);
        }

        Ok(ids)
    }
}
