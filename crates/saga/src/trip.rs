//! Trip requests and their per-resource payloads.

use common::{Payload, PerResource, TripId};
use serde::{Deserialize, Serialize};

/// Hotel stay to reserve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotelStay {
    pub hotel: String,
    pub check_in: String,
    pub check_out: String,
}

/// Flight itinerary to reserve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightItinerary {
    pub depart: String,
    pub depart_at: String,
    pub arrive: String,
    pub arrive_at: String,
}

/// Car rental to reserve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarRental {
    pub rental: String,
    pub rental_from: String,
    pub rental_to: String,
}

fn payload<const N: usize>(fields: [(&str, &str); N]) -> Payload {
    fields
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl HotelStay {
    pub fn to_payload(&self) -> Payload {
        payload([
            ("hotel", self.hotel.as_str()),
            ("check_in", self.check_in.as_str()),
            ("check_out", self.check_out.as_str()),
        ])
    }
}

impl FlightItinerary {
    pub fn to_payload(&self) -> Payload {
        payload([
            ("depart", self.depart.as_str()),
            ("depart_at", self.depart_at.as_str()),
            ("arrive", self.arrive.as_str()),
            ("arrive_at", self.arrive_at.as_str()),
        ])
    }
}

impl CarRental {
    pub fn to_payload(&self) -> Payload {
        payload([
            ("rental", self.rental.as_str()),
            ("rental_from", self.rental_from.as_str()),
            ("rental_to", self.rental_to.as_str()),
        ])
    }
}

/// A trip submitted to the saga. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub hotel: HotelStay,
    pub flight: FlightItinerary,
    pub car: CarRental,
}

impl Trip {
    /// Returns the payload sent to each booking service.
    pub fn payloads(&self) -> PerResource<Payload> {
        PerResource::new(
            self.hotel.to_payload(),
            self.flight.to_payload(),
            self.car.to_payload(),
        )
    }
}
