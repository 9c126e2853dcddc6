//! A morning at the clinic: book a doctor's queue, run late, cascade the
//! delay, and let the outbox and follow-up workers deliver in the background.
//!
//! Run with `RUST_LOG=clinic_scheduler=debug cargo run --example clinic_day`.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveTime, TimeZone, Utc};
use clinic_scheduler::domain::{TaskType, WorkingHours};
use clinic_scheduler::tasks::LogTaskDelivery;
use clinic_scheduler::{
    ClinicService, CoreConfig, FollowUpStep, HandlerRegistry, InMemoryStore, LogDelivery,
    NewAppointment, NewFollowUp, OutboxProcessor, OutboxWorker, Shutdown, TaskScheduler,
    TaskWorker,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = CoreConfig::from_toml_str(
        r#"
        [outbox]
        poll_interval_ms = 50

        [tasks]
        poll_interval_ms = 50
        default_max_attempts = 3
        "#,
    )?;

    let store = InMemoryStore::new();
    store.set_working_hours(
        "dr-lee",
        WorkingHours::weekdays(
            NaiveTime::from_hms_opt(9, 0, 0).ok_or("bad time")?,
            NaiveTime::from_hms_opt(17, 0, 0).ok_or("bad time")?,
        )?,
    )?;
    let service = ClinicService::new(store.clone(), &config);

    let shutdown = Shutdown::new();
    let notifications = Arc::new(Mutex::new(Vec::new()));
    let outbox = OutboxWorker::spawn_with_shutdown(
        OutboxProcessor::from_config(
            store.clone(),
            HandlerRegistry::new().fallback(LogDelivery::with_buffer(notifications.clone())),
            &config.outbox,
        ),
        config.outbox.poll_interval(),
        &shutdown,
    );
    let reminders = Arc::new(Mutex::new(Vec::new()));
    let tasks = TaskWorker::spawn_with_shutdown(
        TaskScheduler::from_config(
            store.clone(),
            LogTaskDelivery::with_buffer(reminders.clone()),
            &config.tasks,
        ),
        config.tasks.poll_interval(),
        &shutdown,
    );

    // Monday morning queue.
    let monday = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).single().ok_or("bad date")?;
    let mut queue = Vec::new();
    for (i, patient) in ["pat-ana", "pat-ben", "pat-cho", "pat-dev"].iter().enumerate() {
        let start = monday + Duration::minutes(30 * i as i64);
        let appointment = service.schedule_appointment(
            NewAppointment::new("dr-lee", *patient, start, Duration::minutes(30))
                .with_reason("routine check"),
            "front-desk",
        )?;
        service.approve_appointment(&appointment.id, "dr-lee")?;
        queue.push(appointment.id);
    }

    // The first patient needs longer; everyone behind them moves.
    let outcome = service.delay_appointment("dr-lee", &queue[0], Duration::minutes(40), "dr-lee")?;
    for moved in &outcome.reassignments {
        println!(
            "{}: {} -> {}",
            moved.appointment_id, moved.previous, moved.range
        );
    }

    service.complete_appointment(&queue[0], "dr-lee")?;
    service.create_follow_up(NewFollowUp::new(
        "pat-ana",
        vec![
            FollowUpStep::new(
                TaskType::MedicationReminder,
                json!({ "drug": "amoxicillin", "dose": "500mg" }),
                Utc::now(),
            ),
            FollowUpStep::new(
                TaskType::RevisitReminder,
                json!({ "in_days": 14 }),
                Utc::now() + Duration::days(14),
            ),
        ],
    ))?;

    tokio::time::sleep(StdDuration::from_millis(300)).await;
    shutdown.trigger();
    let outbox_stats = outbox.join().await;
    let task_stats = tasks.join().await;

    for line in notifications.lock().map_err(|_| "buffer poisoned")?.iter() {
        println!("{line}");
    }
    for line in reminders.lock().map_err(|_| "buffer poisoned")?.iter() {
        println!("{line}");
    }
    println!(
        "outbox delivered {} records, follow-up worker completed {} tasks",
        outbox_stats.processed, task_stats.processed
    );
    Ok(())
}
