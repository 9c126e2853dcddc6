use chrono::{DateTime, Duration, NaiveDate, Utc};

use super::CascadeError;
use crate::domain::{Appointment, TimeRange, WorkingHours};

/// One appointment's move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reassignment {
    pub appointment_id: String,
    pub previous: TimeRange,
    pub range: TimeRange,
}

/// Compute new ranges for `target_id` delayed by `delay` and every active
/// appointment after it in `queue`.
///
/// `queue` is one doctor's appointments from the target's start onwards.
/// The walk keeps a watermark at the end of the last placed appointment:
///
/// * each appointment is proposed at its start plus the cumulative shift of
///   its day;
/// * a proposal before the watermark is pushed up to it, and the push is
///   added to the shift inherited by the rest of that day;
/// * a proposal that does not fit its window moves to the next window that
///   can hold its full duration, rolling to later days as needed.
///
/// Appointments on later days start from a zero shift and only move when
/// the watermark reaches them. Only appointments whose range changes are
/// returned, in queue order.
pub fn plan_cascade(
    queue: &[Appointment],
    target_id: &str,
    delay: Duration,
    hours: &WorkingHours,
    lookahead_days: u32,
) -> Result<Vec<Reassignment>, CascadeError> {
    if delay <= Duration::zero() {
        return Err(CascadeError::InvalidDelay(delay));
    }

    let mut active: Vec<&Appointment> = queue.iter().filter(|a| a.is_active()).collect();
    active.sort_by(|a, b| a.start().cmp(&b.start()).then_with(|| a.id.cmp(&b.id)));

    let target_at = active
        .iter()
        .position(|a| a.id == target_id)
        .ok_or_else(|| CascadeError::TargetNotFound(target_id.to_string()))?;

    // Anything ordered ahead of the target (a same-start tie) stays put.
    let mut watermark: Option<DateTime<Utc>> =
        active[..target_at].iter().map(|a| a.end()).max();
    let mut shift = delay;
    let mut shift_day: NaiveDate = hours.local_date(active[target_at].start());
    let mut moves = Vec::new();

    for appointment in &active[target_at..] {
        let day = hours.local_date(appointment.start());
        if day != shift_day {
            shift_day = day;
            shift = Duration::zero();
        }

        let mut proposed = appointment.start() + shift;
        if let Some(mark) = watermark {
            if proposed < mark {
                shift = shift + (mark - proposed);
                proposed = mark;
            }
        }

        let duration = appointment.range().duration();
        let start = hours
            .earliest_fit(proposed, duration, lookahead_days)
            .ok_or_else(|| CascadeError::Unplaceable {
                appointment_id: appointment.id.clone(),
                lookahead_days,
            })?;
        let range = TimeRange::starting_at(start, duration)?;
        watermark = Some(range.end());

        if range != appointment.range() {
            moves.push(Reassignment {
                appointment_id: appointment.id.clone(),
                previous: appointment.range(),
                range,
            });
        }
    }

    Ok(moves)
}
