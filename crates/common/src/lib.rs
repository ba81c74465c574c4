//! Shared vocabulary for the trip booking saga.

pub mod resource;
pub mod types;

pub use resource::{ParseError, Payload, PerResource, ResourceType};
pub use types::TripId;
