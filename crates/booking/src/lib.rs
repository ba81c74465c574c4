//! Booking services for the trip saga.
//!
//! Each resource type (hotel, flight, car) is served by its own
//! [`ResourceBookingService`] backed by a private [`RecordStore`]. Both
//! operations are idempotent:
//! - `book` creates a record only if none exists for the trip
//! - `cancel` moves a record to `cancelled` only if it is not already there
//!
//! Stores provide the conditional writes (put-if-absent and compare-and-set on
//! status) that make those guarantees hold under concurrent retries.

pub mod error;
pub mod fault;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod service;
pub mod store;

pub use common::{Payload, ResourceType, TripId};
pub use error::{BookingError, FaultRateError, StoreError};
pub use fault::{FaultInjector, FaultRates};
pub use memory::InMemoryRecordStore;
pub use postgres::PostgresRecordStore;
pub use record::{
    BookingConfirmation, BookingRecord, BookingState, BookingStatus, CancellationConfirmation,
};
pub use service::{BookingService, MissingRecordPolicy, Operation, ResourceBookingService};
pub use store::{CasOutcome, InsertOutcome, RecordStore};
