mod engine;
mod error;
mod plan;

pub use engine::{CascadeEngine, CascadeOutcome, CascadeRequest};
pub use error::CascadeError;
pub use plan::{plan_cascade, Reassignment};
