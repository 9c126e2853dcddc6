use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    MedicationReminder,
    RevisitReminder,
    CheckIn,
    CampaignStep,
    ManualAction,
    AdminNotification,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    DeadLettered,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::DeadLettered
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAuditEntry {
    pub at: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub detail: Option<String>,
}

/// A scheduled step of a patient follow-up.
///
/// Only the task scheduler (claim, complete, fail) and the administrative
/// operations (cancel, reschedule) change a task after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FollowUpTask {
    pub id: String,
    pub follow_up_id: String,
    pub task_type: TaskType,
    pub payload: Value,
    pub scheduled_at: DateTime<Utc>,
    pub claimed: bool,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
    /// Earliest time a failed task may be claimed again.
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub last_error: Option<String>,
    audit: Vec<TaskAuditEntry>,
}

impl FollowUpTask {
    pub fn new(
        id: impl Into<String>,
        follow_up_id: impl Into<String>,
        task_type: TaskType,
        payload: Value,
        scheduled_at: DateTime<Utc>,
        max_attempts: u32,
    ) -> Self {
        let mut task = Self {
            id: id.into(),
            follow_up_id: follow_up_id.into(),
            task_type,
            payload,
            scheduled_at,
            claimed: false,
            claimed_at: None,
            claimed_by: None,
            next_attempt_at: None,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            status: TaskStatus::Pending,
            result: None,
            last_error: None,
            audit: Vec::new(),
        };
        task.log(scheduled_at, "system", "created", None);
        task
    }

    pub fn audit(&self) -> &[TaskAuditEntry] {
        &self.audit
    }

    /// When the task next becomes eligible for a claim.
    pub fn due_at(&self) -> DateTime<Utc> {
        self.next_attempt_at.unwrap_or(self.scheduled_at)
    }

    /// Whether a claim pass at `now` may take this task.
    ///
    /// A task stuck `InProgress` past its lease belongs to a worker that
    /// never reported back and is claimable again.
    pub fn is_claimable(&self, now: DateTime<Utc>, lease: chrono::Duration) -> bool {
        if self.attempts >= self.max_attempts {
            return false;
        }
        match self.status {
            TaskStatus::Pending | TaskStatus::Failed => !self.claimed && self.due_at() <= now,
            TaskStatus::InProgress => self
                .claimed_at
                .map(|claimed_at| claimed_at + lease <= now)
                .unwrap_or(true),
            _ => false,
        }
    }

    pub fn claim(&mut self, worker_id: &str, now: DateTime<Utc>) {
        self.claimed = true;
        self.claimed_at = Some(now);
        self.claimed_by = Some(worker_id.to_string());
        self.status = TaskStatus::InProgress;
        self.log(now, worker_id, "claimed", None);
    }

    pub fn complete(&mut self, result: Option<Value>, now: DateTime<Utc>) {
        self.attempts += 1;
        self.status = TaskStatus::Completed;
        self.result = result;
        self.last_error = None;
        self.next_attempt_at = None;
        self.release_claim();
        let actor = self.actor();
        self.log(now, &actor, "completed", None);
    }

    /// Record a failed attempt.
    ///
    /// The final permitted attempt dead-letters the task; earlier ones leave
    /// it `Failed` and claimable again from `retry_at`.
    pub fn fail(&mut self, error: &str, retry_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.attempts += 1;
        self.last_error = Some(error.to_string());
        let actor = self.actor();
        self.release_claim();
        if self.attempts >= self.max_attempts {
            self.status = TaskStatus::DeadLettered;
            self.next_attempt_at = None;
            self.log(now, &actor, "dead_lettered", Some(error.to_string()));
        } else {
            self.status = TaskStatus::Failed;
            self.next_attempt_at = Some(retry_at);
            self.log(now, &actor, "failed", Some(error.to_string()));
        }
    }

    /// Record a failure that retrying cannot fix.
    pub fn dead_letter(&mut self, error: &str, now: DateTime<Utc>) {
        self.attempts += 1;
        self.last_error = Some(error.to_string());
        let actor = self.actor();
        self.release_claim();
        self.status = TaskStatus::DeadLettered;
        self.next_attempt_at = None;
        self.log(now, &actor, "dead_lettered", Some(error.to_string()));
    }

    /// Administrative cancel. Terminal tasks stay as they are.
    pub fn cancel(&mut self, actor: &str, reason: Option<&str>, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Cancelled;
        self.release_claim();
        self.next_attempt_at = None;
        self.log(now, actor, "cancelled", reason.map(String::from));
        true
    }

    /// Administrative reschedule: back to `Pending` with a fresh retry budget.
    pub fn reschedule(&mut self, scheduled_at: DateTime<Utc>, actor: &str, now: DateTime<Utc>) {
        self.status = TaskStatus::Pending;
        self.attempts = 0;
        self.scheduled_at = scheduled_at;
        self.next_attempt_at = None;
        self.last_error = None;
        self.release_claim();
        self.log(
            now,
            actor,
            "rescheduled",
            Some(scheduled_at.to_rfc3339()),
        );
    }

    fn actor(&self) -> String {
        self.claimed_by.clone().unwrap_or_else(|| "scheduler".to_string())
    }

    fn release_claim(&mut self) {
        self.claimed = false;
        self.claimed_at = None;
        self.claimed_by = None;
    }

    fn log(&mut self, at: DateTime<Utc>, actor: &str, action: &str, detail: Option<String>) {
        self.audit.push(TaskAuditEntry {
            at,
            actor: actor.to_string(),
            action: action.to_string(),
            detail,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn task(max_attempts: u32) -> FollowUpTask {
        FollowUpTask::new(
            "task-1",
            "fu-1",
            TaskType::MedicationReminder,
            json!({"drug": "amoxicillin"}),
            Utc::now() - Duration::minutes(1),
            max_attempts,
        )
    }

    #[test]
    fn final_failure_dead_letters() {
        let now = Utc::now();
        let mut task = task(2);

        task.claim("w1", now);
        task.fail("smtp timeout", now + Duration::seconds(10), now);
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.next_attempt_at, Some(now + Duration::seconds(10)));

        task.claim("w1", now);
        task.fail("smtp timeout", now + Duration::seconds(20), now);
        assert_eq!(task.status, TaskStatus::DeadLettered);
        assert_eq!(task.attempts, 2);
        assert!(!task.is_claimable(now + Duration::days(1), Duration::minutes(5)));
    }

    #[test]
    fn failed_task_waits_for_backoff_deadline() {
        let now = Utc::now();
        let lease = Duration::minutes(5);
        let mut task = task(3);
        task.claim("w1", now);
        task.fail("busy", now + Duration::seconds(30), now);

        assert!(!task.is_claimable(now, lease));
        assert!(task.is_claimable(now + Duration::seconds(30), lease));
    }

    #[test]
    fn expired_claim_is_reclaimable() {
        let now = Utc::now();
        let lease = Duration::minutes(5);
        let mut task = task(3);
        task.claim("w1", now);

        assert!(!task.is_claimable(now + Duration::minutes(1), lease));
        assert!(task.is_claimable(now + Duration::minutes(5), lease));
    }

    #[test]
    fn reschedule_resets_retry_budget() {
        let now = Utc::now();
        let mut task = task(1);
        task.claim("w1", now);
        task.fail("bounced", now, now);
        assert_eq!(task.status, TaskStatus::DeadLettered);

        let later = now + Duration::hours(1);
        task.reschedule(later, "admin", now);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempts, 0);
        assert_eq!(task.due_at(), later);
        assert_eq!(task.audit().last().unwrap().action, "rescheduled");
    }

    #[test]
    fn cancel_leaves_terminal_tasks_alone() {
        let now = Utc::now();
        let mut task = task(3);
        task.claim("w1", now);
        task.complete(None, now);
        assert!(!task.cancel("admin", None, now));
        assert_eq!(task.status, TaskStatus::Completed);
    }
}
