//! Core data model for geoprobe.
//!
//! These types describe what a location query asks for, what comes back,
//! and what the observers know about the device around it.

mod options;
mod position;
mod query;
mod reading;

pub use options::PositionOptions;
pub use position::{Coordinates, Position, PositionError, PositionErrorCode};
pub use query::{QueryId, QueryOutcome, QueryRecord};
pub use reading::{NetworkReading, PermissionReading, PermissionState};
