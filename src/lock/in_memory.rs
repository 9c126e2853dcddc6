use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::ScheduleLock;
use crate::store::StoreError;

/// In-memory table of schedule lock rows.
///
/// Each operation is a conditional update under one mutex, the same shape a
/// SQL backend gets from `UPDATE .. WHERE holder = ? OR expires_at <= ?`.
#[derive(Default)]
pub struct LockTable {
    rows: Mutex<HashMap<String, ScheduleLock>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(
        &self,
        doctor_id: &str,
        holder: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| StoreError::LockPoisoned("lock table write"))?;

        if let Some(row) = rows.get(doctor_id) {
            if !row.is_available_to(holder, now) {
                return Ok(false);
            }
        }

        rows.insert(
            doctor_id.to_string(),
            ScheduleLock {
                doctor_id: doctor_id.to_string(),
                holder: holder.to_string(),
                expires_at,
            },
        );
        Ok(true)
    }

    pub fn release(&self, doctor_id: &str, holder: &str) -> Result<(), StoreError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| StoreError::LockPoisoned("lock table write"))?;
        if rows.get(doctor_id).is_some_and(|row| row.holder == holder) {
            rows.remove(doctor_id);
        }
        Ok(())
    }

    pub fn get(&self, doctor_id: &str) -> Result<Option<ScheduleLock>, StoreError> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| StoreError::LockPoisoned("lock table read"))?;
        Ok(rows.get(doctor_id).cloned())
    }
}
