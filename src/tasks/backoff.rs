use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delay before a failed task may be claimed again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffPolicy {
    /// Same delay after every failure.
    Fixed(Duration),

    /// `initial * 2^attempt`, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

impl BackoffPolicy {
    /// Delay after the failure of zero-based `attempt`.
    ///
    /// Non-decreasing in `attempt` and never above the cap.
    pub fn calculate(&self, attempt: u32) -> Duration {
        match self {
            BackoffPolicy::Fixed(delay) => *delay,
            BackoffPolicy::Exponential { initial, max } => {
                let multiplier = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
                initial.checked_mul(multiplier).unwrap_or(*max).min(*max)
            }
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(300),
        }
    }
}
