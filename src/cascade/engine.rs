use std::collections::HashMap;

use chrono::{Duration, Utc};

use super::plan::{plan_cascade, Reassignment};
use super::CascadeError;
use crate::config::CascadeConfig;
use crate::domain::Appointment;
use crate::lock::ScheduleLockManager;
use crate::store::{AppointmentStore, Commit, ScheduleLockStore, UnitOfWork};

/// Delay one appointment and everything queued behind it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CascadeRequest {
    pub doctor_id: String,
    pub appointment_id: String,
    pub delay: Duration,
    /// Recorded in every moved appointment's audit trail.
    pub actor: String,
}

impl CascadeRequest {
    pub fn new(
        doctor_id: impl Into<String>,
        appointment_id: impl Into<String>,
        delay: Duration,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            doctor_id: doctor_id.into(),
            appointment_id: appointment_id.into(),
            delay,
            actor: actor.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CascadeOutcome {
    pub reassignments: Vec<Reassignment>,
    pub outbox_ids: Vec<u64>,
}

/// Runs cascades under the doctor's schedule lock and saves each one as a
/// single unit of work.
pub struct CascadeEngine<S> {
    locks: ScheduleLockManager<S>,
    lookahead_days: u32,
}

impl<S> CascadeEngine<S> {
    pub fn new(store: S) -> Self {
        Self::from_config(store, &CascadeConfig::default())
    }

    pub fn from_config(store: S, config: &CascadeConfig) -> Self {
        Self {
            locks: ScheduleLockManager::new(store)
                .with_timeout(config.lock_timeout())
                .with_ttl(config.lock_ttl())
                .with_retry_interval(config.lock_retry_interval()),
            lookahead_days: config.lookahead_days,
        }
    }

    pub fn store(&self) -> &S {
        self.locks.store()
    }
}

impl<S> CascadeEngine<S>
where
    S: AppointmentStore + ScheduleLockStore + Commit,
{
    pub fn delay(&self, request: &CascadeRequest) -> Result<CascadeOutcome, CascadeError> {
        if request.delay <= Duration::zero() {
            return Err(CascadeError::InvalidDelay(request.delay));
        }
        let store = self.locks.store();
        self.load_target(request)?;

        let guard = self.locks.acquire(&request.doctor_id)?;
        tracing::info!(
            doctor_id = %request.doctor_id,
            appointment_id = %request.appointment_id,
            delay_minutes = request.delay.num_minutes(),
            "cascade started"
        );

        // Re-read under the lock; a concurrent cascade may have moved it.
        let target = self.load_target(request)?;
        let mut queue = store.appointments_for_doctor_from(&request.doctor_id, target.start())?;
        let hours = store.working_hours(&request.doctor_id)?;

        let moves = match plan_cascade(
            &queue,
            &request.appointment_id,
            request.delay,
            &hours,
            self.lookahead_days,
        ) {
            Ok(moves) => moves,
            Err(err) => {
                tracing::warn!(doctor_id = %request.doctor_id, error = %err, "cascade aborted");
                return Err(err);
            }
        };

        let now = Utc::now();
        let targets: HashMap<&str, &Reassignment> = moves
            .iter()
            .map(|m| (m.appointment_id.as_str(), m))
            .collect();
        for appointment in queue.iter_mut() {
            if let Some(mv) = targets.get(appointment.id.as_str()) {
                appointment.reschedule(mv.range, &request.actor, now)?;
            }
        }

        // The plan is only valid while the lock is still ours.
        guard.renew()?;
        let outbox_ids = UnitOfWork::new(store)
            .appointments(queue.iter_mut().filter(|a| targets.contains_key(a.id.as_str())))
            .commit(now)?;

        tracing::info!(
            doctor_id = %request.doctor_id,
            moved = moves.len(),
            "cascade committed"
        );
        Ok(CascadeOutcome {
            reassignments: moves,
            outbox_ids,
        })
    }

    fn load_target(&self, request: &CascadeRequest) -> Result<Appointment, CascadeError> {
        let target = self
            .locks
            .store()
            .appointment(&request.appointment_id)?
            .ok_or_else(|| CascadeError::TargetNotFound(request.appointment_id.clone()))?;

        if target.doctor_id != request.doctor_id {
            return Err(CascadeError::WrongDoctor {
                appointment_id: target.id,
                requested: request.doctor_id.clone(),
                actual: target.doctor_id,
            });
        }
        if !target.is_active() {
            let status = target.status();
            return Err(CascadeError::NotReschedulable {
                appointment_id: target.id,
                status,
            });
        }
        Ok(target)
    }
}
