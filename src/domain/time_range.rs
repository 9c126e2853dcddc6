use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::DomainError;

/// Half-open interval `[start, end)` with `start < end` enforced on construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRange", into = "RawRange")]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, DomainError> {
        if end <= start {
            return Err(DomainError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Build a range from a start and a positive duration.
    pub fn starting_at(start: DateTime<Utc>, duration: Duration) -> Result<Self, DomainError> {
        Self::new(start, start + duration)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Shift both ends by the same amount, preserving duration.
    pub fn shifted(&self, by: Duration) -> TimeRange {
        TimeRange {
            start: self.start + by,
            end: self.end + by,
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

#[derive(Serialize, Deserialize)]
struct RawRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawRange> for TimeRange {
    type Error = DomainError;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        TimeRange::new(raw.start, raw.end)
    }
}

impl From<TimeRange> for RawRange {
    fn from(range: TimeRange) -> Self {
        RawRange {
            start: range.start,
            end: range.end,
        }
    }
}
