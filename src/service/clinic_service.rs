use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::ServiceError;
use crate::cascade::{CascadeEngine, CascadeOutcome, CascadeRequest};
use crate::config::CoreConfig;
use crate::domain::{Appointment, DomainEvent, FollowUpTask, TaskStatus, TaskType, TimeRange};
use crate::lock::ScheduleLockManager;
use crate::store::{AppointmentStore, Commit, FollowUpTaskStore, ScheduleLockStore, UnitOfWork};

/// Input for booking an appointment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAppointment {
    /// Generated when absent.
    pub id: Option<String>,
    pub doctor_id: String,
    pub patient_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub reason: Option<String>,
}

impl NewAppointment {
    pub fn new(
        doctor_id: impl Into<String>,
        patient_id: impl Into<String>,
        start: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            id: None,
            doctor_id: doctor_id.into(),
            patient_id: patient_id.into(),
            start,
            end: start + duration,
            reason: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// One scheduled step of a follow-up plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FollowUpStep {
    pub task_type: TaskType,
    pub payload: Value,
    pub scheduled_at: DateTime<Utc>,
    /// Falls back to the configured default.
    pub max_attempts: Option<u32>,
}

impl FollowUpStep {
    pub fn new(task_type: TaskType, payload: Value, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            task_type,
            payload,
            scheduled_at,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewFollowUp {
    pub id: Option<String>,
    pub patient_id: String,
    pub steps: Vec<FollowUpStep>,
}

impl NewFollowUp {
    pub fn new(patient_id: impl Into<String>, steps: Vec<FollowUpStep>) -> Self {
        Self {
            id: None,
            patient_id: patient_id.into(),
            steps,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Appointment and follow-up use cases over one store.
///
/// Every mutation commits through a [`UnitOfWork`], so its domain events
/// land in the outbox in the same write.
pub struct ClinicService<S> {
    store: S,
    locks: ScheduleLockManager<S>,
    cascade: CascadeEngine<S>,
    default_max_attempts: u32,
}

impl<S: Clone> ClinicService<S> {
    pub fn new(store: S, config: &CoreConfig) -> Self {
        Self {
            locks: ScheduleLockManager::new(store.clone())
                .with_timeout(config.cascade.lock_timeout())
                .with_ttl(config.cascade.lock_ttl())
                .with_retry_interval(config.cascade.lock_retry_interval()),
            cascade: CascadeEngine::from_config(store.clone(), &config.cascade),
            store,
            default_max_attempts: config.tasks.default_max_attempts,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> ClinicService<S>
where
    S: AppointmentStore + ScheduleLockStore + FollowUpTaskStore + Commit,
{
    /// Book an appointment after checking the doctor's slot is free.
    pub fn schedule_appointment(
        &self,
        request: NewAppointment,
        actor: &str,
    ) -> Result<Appointment, ServiceError> {
        let range = TimeRange::new(request.start, request.end)?;
        let _guard = self.locks.acquire(&request.doctor_id)?;

        // Appointment lengths are unbounded, so scan the doctor's whole queue.
        let clash = self
            .store
            .appointments_for_doctor_from(&request.doctor_id, DateTime::<Utc>::MIN_UTC)?
            .into_iter()
            .find(|a| a.is_active() && a.range().overlaps(&range));
        if let Some(existing) = clash {
            return Err(ServiceError::Conflict {
                existing: existing.id,
            });
        }

        let now = Utc::now();
        let id = request
            .id
            .unwrap_or_else(|| format!("apt-{}", Uuid::new_v4()));
        let mut appointment = Appointment::schedule(
            id,
            request.doctor_id,
            request.patient_id,
            range,
            actor,
            now,
        );
        appointment.reason = request.reason;

        UnitOfWork::new(&self.store)
            .appointment(&mut appointment)
            .commit(now)?;
        tracing::info!(appointment_id = %appointment.id, doctor_id = %appointment.doctor_id, "appointment scheduled");
        Ok(appointment)
    }

    pub fn approve_appointment(&self, id: &str, actor: &str) -> Result<Appointment, ServiceError> {
        self.transition(id, |appointment, now| appointment.approve(actor, now))
    }

    pub fn reject_appointment(
        &self,
        id: &str,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<Appointment, ServiceError> {
        self.transition(id, |appointment, now| appointment.reject(actor, reason, now))
    }

    pub fn complete_appointment(&self, id: &str, actor: &str) -> Result<Appointment, ServiceError> {
        self.transition(id, |appointment, now| appointment.complete(actor, now))
    }

    pub fn cancel_appointment(
        &self,
        id: &str,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<Appointment, ServiceError> {
        self.transition(id, |appointment, now| appointment.cancel(actor, reason, now))
    }

    /// Delay an appointment and cascade the shift through the doctor's queue.
    pub fn delay_appointment(
        &self,
        doctor_id: &str,
        appointment_id: &str,
        delay: Duration,
        actor: &str,
    ) -> Result<CascadeOutcome, ServiceError> {
        let request = CascadeRequest::new(doctor_id, appointment_id, delay, actor);
        Ok(self.cascade.delay(&request)?)
    }

    /// Create a follow-up plan: one task per step plus a `FollowUpCreated` event.
    pub fn create_follow_up(&self, request: NewFollowUp) -> Result<Vec<FollowUpTask>, ServiceError> {
        if request.steps.is_empty() {
            return Err(ServiceError::EmptyFollowUp);
        }
        let follow_up_id = request
            .id
            .unwrap_or_else(|| format!("fu-{}", Uuid::new_v4()));

        let mut tasks: Vec<FollowUpTask> = request
            .steps
            .into_iter()
            .map(|step| {
                FollowUpTask::new(
                    format!("task-{}", Uuid::new_v4()),
                    follow_up_id.clone(),
                    step.task_type,
                    step.payload,
                    step.scheduled_at,
                    step.max_attempts.unwrap_or(self.default_max_attempts),
                )
            })
            .collect();

        let event = DomainEvent::FollowUpCreated {
            follow_up_id: follow_up_id.clone(),
            patient_id: request.patient_id,
            task_ids: tasks.iter().map(|t| t.id.clone()).collect(),
        };
        let mut uow = UnitOfWork::new(&self.store).event(event);
        for task in tasks.iter_mut() {
            uow = uow.task(task);
        }
        uow.commit(Utc::now())?;

        tracing::info!(follow_up_id = %follow_up_id, tasks = tasks.len(), "follow-up created");
        Ok(tasks)
    }

    /// Cancel a task. Returns `false` when it had already finished.
    pub fn cancel_task(
        &self,
        task_id: &str,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<bool, ServiceError> {
        let mut task = self.load_task(task_id)?;
        let now = Utc::now();
        if !task.cancel(actor, reason, now) {
            return Ok(false);
        }
        UnitOfWork::new(&self.store).task(&mut task).commit(now)?;
        Ok(true)
    }

    /// Put a pending, failed, or dead-lettered task back on the schedule
    /// with a fresh retry budget.
    pub fn reschedule_task(
        &self,
        task_id: &str,
        scheduled_at: DateTime<Utc>,
        actor: &str,
    ) -> Result<FollowUpTask, ServiceError> {
        let mut task = self.load_task(task_id)?;
        if !matches!(
            task.status,
            TaskStatus::Pending | TaskStatus::Failed | TaskStatus::DeadLettered
        ) {
            return Err(ServiceError::TaskNotReschedulable {
                task_id: task.id,
                status: task.status,
            });
        }
        let now = Utc::now();
        task.reschedule(scheduled_at, actor, now);
        UnitOfWork::new(&self.store).task(&mut task).commit(now)?;
        Ok(task)
    }

    fn load_task(&self, task_id: &str) -> Result<FollowUpTask, ServiceError> {
        self.store
            .task(task_id)?
            .ok_or_else(|| ServiceError::not_found("task", task_id))
    }

    fn load_appointment(&self, id: &str) -> Result<Appointment, ServiceError> {
        self.store
            .appointment(id)?
            .ok_or_else(|| ServiceError::not_found("appointment", id))
    }

    fn transition<F>(&self, id: &str, apply: F) -> Result<Appointment, ServiceError>
    where
        F: FnOnce(&mut Appointment, DateTime<Utc>) -> Result<(), crate::domain::DomainError>,
    {
        let doctor_id = self.load_appointment(id)?.doctor_id;
        let _guard = self.locks.acquire(&doctor_id)?;

        // Re-read under the lock; a cascade may have moved it meanwhile.
        let mut appointment = self.load_appointment(id)?;
        let now = Utc::now();
        apply(&mut appointment, now)?;
        UnitOfWork::new(&self.store)
            .appointment(&mut appointment)
            .commit(now)?;
        tracing::info!(appointment_id = %id, status = %appointment.status(), "appointment updated");
        Ok(appointment)
    }
}
