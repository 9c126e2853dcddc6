use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel row serializing cascades for one doctor.
///
/// A row past `expires_at` is free for anyone to take, so a holder that
/// crashes never locks the doctor out beyond the TTL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleLock {
    pub doctor_id: String,
    pub holder: String,
    pub expires_at: DateTime<Utc>,
}

impl ScheduleLock {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether `holder` may write this row at `now`.
    pub fn is_available_to(&self, holder: &str, now: DateTime<Utc>) -> bool {
        self.holder == holder || self.is_expired(now)
    }
}
