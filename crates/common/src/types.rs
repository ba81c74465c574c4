use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::resource::ParseError;

/// Unique identifier for a trip.
///
/// Trip IDs are opaque strings chosen by the caller. Every booking record and
/// saga execution is keyed by one, so the same ID always addresses the same
/// trip across all resource services.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TripId(String);

impl TripId {
    /// Creates a new random trip ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parses a caller-supplied trip ID. Blank IDs are rejected.
    pub fn parse(value: impl Into<String>) -> Result<Self, ParseError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ParseError::EmptyTripId);
        }
        Ok(Self(value))
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TripId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TripId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TripId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TripId> for String {
    fn from(id: TripId) -> Self {
        id.0
    }
}

impl From<Uuid> for TripId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}
