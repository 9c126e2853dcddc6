//! Clinic use cases exposed to the surrounding application.
//!
//! ## Quick Start
//!
//! ```ignore
//! let store = InMemoryStore::new();
//! let service = ClinicService::new(store.clone(), &CoreConfig::default());
//!
//! let appointment = service.schedule_appointment(
//!     NewAppointment::new("doc-1", "pat-1", start, Duration::minutes(30)),
//!     "front-desk",
//! )?;
//! service.delay_appointment("doc-1", &appointment.id, Duration::minutes(20), "dr-lee")?;
//! ```

mod clinic_service;
mod error;

pub use clinic_service::{ClinicService, FollowUpStep, NewAppointment, NewFollowUp};
pub use error::ServiceError;
