//! Resource types and per-resource containers.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Resource-specific booking payload sent to a booking service.
pub type Payload = BTreeMap<String, String>;

/// Errors raised while parsing shared identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The trip ID was empty or whitespace.
    #[error("Trip ID must not be empty")]
    EmptyTripId,

    /// The resource type name is not one of hotel, flight or car.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),
}

/// The kinds of resource a trip reserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Hotel,
    Flight,
    Car,
}

impl ResourceType {
    /// All resource types, in branch order.
    pub const ALL: [ResourceType; 3] = [ResourceType::Hotel, ResourceType::Flight, ResourceType::Car];

    /// Returns the resource name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Hotel => "hotel",
            ResourceType::Flight => "flight",
            ResourceType::Car => "car",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hotel" => Ok(ResourceType::Hotel),
            "flight" => Ok(ResourceType::Flight),
            "car" => Ok(ResourceType::Car),
            other => Err(ParseError::UnknownResource(other.to_string())),
        }
    }
}

/// One value per resource type.
///
/// Used for anything the saga fans out across the three services: payloads,
/// branch outcomes, confirmations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PerResource<T> {
    pub hotel: T,
    pub flight: T,
    pub car: T,
}

impl<T> PerResource<T> {
    /// Creates a container from the three values.
    pub fn new(hotel: T, flight: T, car: T) -> Self {
        Self { hotel, flight, car }
    }

    /// Builds a container by calling `f` once per resource type.
    pub fn from_fn(mut f: impl FnMut(ResourceType) -> T) -> Self {
        Self {
            hotel: f(ResourceType::Hotel),
            flight: f(ResourceType::Flight),
            car: f(ResourceType::Car),
        }
    }

    /// Returns the value for a resource type.
    pub fn get(&self, resource: ResourceType) -> &T {
        match resource {
            ResourceType::Hotel => &self.hotel,
            ResourceType::Flight => &self.flight,
            ResourceType::Car => &self.car,
        }
    }

    pub fn get_mut(&mut self, resource: ResourceType) -> &mut T {
        match resource {
            ResourceType::Hotel => &mut self.hotel,
            ResourceType::Flight => &mut self.flight,
            ResourceType::Car => &mut self.car,
        }
    }

    /// Transforms every value, keeping the resource association.
    pub fn map<U>(self, mut f: impl FnMut(ResourceType, T) -> U) -> PerResource<U> {
        PerResource {
            hotel: f(ResourceType::Hotel, self.hotel),
            flight: f(ResourceType::Flight, self.flight),
            car: f(ResourceType::Car, self.car),
        }
    }

    /// Borrows every value.
    pub fn as_ref(&self) -> PerResource<&T> {
        PerResource {
            hotel: &self.hotel,
            flight: &self.flight,
            car: &self.car,
        }
    }

    /// Iterates values in branch order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceType, &T)> {
        ResourceType::ALL.into_iter().map(|r| (r, self.get(r)))
    }

    /// Returns true if every value satisfies the predicate.
    pub fn all(&self, mut f: impl FnMut(&T) -> bool) -> bool {
        self.iter().all(|(_, v)| f(v))
    }
}

impl<T> PerResource<Option<T>> {
    /// Returns all three values if every one is present.
    pub fn transpose(self) -> Option<PerResource<T>> {
        Some(PerResource {
            hotel: self.hotel?,
            flight: self.flight?,
            car: self.car?,
        })
    }
}
