use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use super::{DomainError, TimeRange};

/// A time-of-day interval during which a doctor can be booked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Window {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, DomainError> {
        if end <= start {
            return Err(DomainError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }
}

/// A doctor's weekly schedule, expressed in clinic-local time.
///
/// Appointment times are UTC; `utc_offset_minutes` converts between the two.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default)]
    days: HashMap<Weekday, Vec<Window>>,
}

impl WorkingHours {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monday to Friday, one window per day.
    pub fn weekdays(start: NaiveTime, end: NaiveTime) -> Result<Self, DomainError> {
        let mut hours = Self::new();
        for day in [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ] {
            hours.add_window(day, start, end)?;
        }
        Ok(hours)
    }

    pub fn with_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    pub fn with_window(
        mut self,
        day: Weekday,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<Self, DomainError> {
        self.add_window(day, start, end)?;
        Ok(self)
    }

    pub fn add_window(
        &mut self,
        day: Weekday,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<(), DomainError> {
        let window = Window::new(start, end)?;
        let windows = self.days.entry(day).or_default();
        windows.push(window);
        windows.sort_by_key(|w| w.start);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.days.values().all(|windows| windows.is_empty())
    }

    pub fn windows(&self, day: Weekday) -> &[Window] {
        self.days.get(&day).map(Vec::as_slice).unwrap_or(&[])
    }

    fn offset(&self) -> Duration {
        Duration::minutes(i64::from(self.utc_offset_minutes))
    }

    /// Clinic-local calendar date of an instant.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        (at + self.offset()).date_naive()
    }

    /// The windows of a local calendar date as UTC ranges, earliest first.
    pub fn ranges_on(&self, date: NaiveDate) -> Vec<TimeRange> {
        self.windows(date.weekday())
            .iter()
            .filter_map(|w| {
                let start = (date.and_time(w.start) - self.offset()).and_utc();
                let end = (date.and_time(w.end) - self.offset()).and_utc();
                TimeRange::new(start, end).ok()
            })
            .collect()
    }

    /// Whether the range lies entirely inside one window.
    pub fn contains(&self, range: &TimeRange) -> bool {
        self.ranges_on(self.local_date(range.start()))
            .iter()
            .any(|w| w.start() <= range.start() && range.end() <= w.end())
    }

    /// Earliest start at or after `from` where `duration` fits inside a window,
    /// searching `from`'s local day and the following `lookahead_days` days.
    pub fn earliest_fit(
        &self,
        from: DateTime<Utc>,
        duration: Duration,
        lookahead_days: u32,
    ) -> Option<DateTime<Utc>> {
        let first_day = self.local_date(from);
        (0..=i64::from(lookahead_days))
            .map(|offset| first_day + Duration::days(offset))
            .flat_map(|day| self.ranges_on(day))
            .find_map(|window| {
                let start = from.max(window.start());
                (start + duration <= window.end()).then_some(start)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // 2024-03-04 is a Monday.
    fn mon(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    #[test]
    fn rejects_inverted_windows() {
        assert!(WorkingHours::new()
            .with_window(Weekday::Mon, t(17, 0), t(9, 0))
            .is_err());
    }

    #[test]
    fn fits_inside_current_window() {
        let hours = WorkingHours::weekdays(t(9, 0), t(17, 0)).unwrap();
        assert_eq!(
            hours.earliest_fit(mon(9, 45), Duration::minutes(30), 30),
            Some(mon(9, 45))
        );
    }

    #[test]
    fn overflow_rolls_to_next_working_day_at_window_start() {
        let hours = WorkingHours::weekdays(t(9, 0), t(17, 0)).unwrap();
        let friday = Utc.with_ymd_and_hms(2024, 3, 8, 16, 50, 0).unwrap();
        let monday = Utc.with_ymd_and_hms(2024, 3, 11, 9, 0, 0).unwrap();
        assert_eq!(
            hours.earliest_fit(friday, Duration::minutes(15), 30),
            Some(monday)
        );
    }

    #[test]
    fn later_window_on_same_day_is_used_first() {
        let hours = WorkingHours::new()
            .with_window(Weekday::Mon, t(9, 0), t(12, 0))
            .unwrap()
            .with_window(Weekday::Mon, t(13, 0), t(17, 0))
            .unwrap();
        assert_eq!(
            hours.earliest_fit(mon(11, 50), Duration::minutes(20), 30),
            Some(mon(13, 0))
        );
    }

    #[test]
    fn offset_converts_local_windows_to_utc() {
        // UTC+2: local 09:00-17:00 is 07:00-15:00 UTC.
        let hours = WorkingHours::weekdays(t(9, 0), t(17, 0))
            .unwrap()
            .with_offset_minutes(120);
        let inside = TimeRange::new(mon(7, 0), mon(7, 30)).unwrap();
        let outside = TimeRange::new(mon(14, 45), mon(15, 15)).unwrap();
        assert!(hours.contains(&inside));
        assert!(!hours.contains(&outside));
    }

    #[test]
    fn empty_schedule_never_fits() {
        let hours = WorkingHours::new();
        assert!(hours.is_empty());
        assert_eq!(hours.earliest_fit(mon(9, 0), Duration::minutes(15), 30), None);
    }
}
