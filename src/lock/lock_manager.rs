use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use super::LockError;
use crate::store::ScheduleLockStore;

/// Acquires per-doctor schedule locks with a bounded wait.
///
/// Acquisition polls the store's conditional update until it wins or the
/// timeout elapses. The returned guard releases the row when dropped, on
/// success and on every error path alike.
pub struct ScheduleLockManager<S> {
    store: S,
    timeout: Duration,
    ttl: Duration,
    retry_interval: Duration,
}

impl<S> ScheduleLockManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            timeout: Duration::from_secs(5),
            ttl: Duration::from_secs(30),
            retry_interval: Duration::from_millis(50),
        }
    }

    /// Set how long `acquire` waits before giving up.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how long a lock row stays live without being released.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the pause between acquisition attempts.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: ScheduleLockStore> ScheduleLockManager<S> {
    pub fn acquire(&self, doctor_id: &str) -> Result<ScheduleLockGuard<'_, S>, LockError> {
        let holder = format!("cascade-{}", Uuid::new_v4());
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::seconds(30));
        let started = Instant::now();

        loop {
            let now = Utc::now();
            if self
                .store
                .try_acquire_lock(doctor_id, &holder, now + ttl, now)?
            {
                tracing::debug!(doctor_id, holder = %holder, "schedule lock acquired");
                return Ok(ScheduleLockGuard {
                    store: &self.store,
                    doctor_id: doctor_id.to_string(),
                    holder,
                    ttl,
                    released: false,
                });
            }

            let waited = started.elapsed();
            if waited >= self.timeout {
                tracing::warn!(doctor_id, ?waited, "schedule lock unavailable");
                return Err(LockError::Unavailable {
                    doctor_id: doctor_id.to_string(),
                    waited,
                });
            }
            thread::sleep(self.retry_interval.min(self.timeout - waited));
        }
    }
}

/// Holds a doctor's schedule lock until released or dropped.
pub struct ScheduleLockGuard<'a, S: ScheduleLockStore> {
    store: &'a S,
    doctor_id: String,
    holder: String,
    ttl: chrono::Duration,
    released: bool,
}

impl<S: ScheduleLockStore> ScheduleLockGuard<'_, S> {
    pub fn doctor_id(&self) -> &str {
        &self.doctor_id
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Push the row's expiry a full TTL past now.
    ///
    /// Fails with [`LockError::Lost`] when the row expired and someone else
    /// took it; whatever was computed under the lock must then be discarded.
    pub fn renew(&self) -> Result<(), LockError> {
        let now = Utc::now();
        if self
            .store
            .try_acquire_lock(&self.doctor_id, &self.holder, now + self.ttl, now)?
        {
            return Ok(());
        }
        tracing::warn!(doctor_id = %self.doctor_id, holder = %self.holder, "schedule lock lost before renewal");
        Err(LockError::Lost {
            doctor_id: self.doctor_id.clone(),
        })
    }

    /// Release now and surface any store error.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        self.store.release_lock(&self.doctor_id, &self.holder)?;
        Ok(())
    }
}

impl<S: ScheduleLockStore> Drop for ScheduleLockGuard<'_, S> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.store.release_lock(&self.doctor_id, &self.holder) {
            tracing::warn!(
                doctor_id = %self.doctor_id,
                error = %err,
                "schedule lock release failed; row will expire"
            );
        }
    }
}
