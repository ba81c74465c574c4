//! Trip booking saga.
//!
//! A trip is booked by reserving a hotel, a flight and a car on three
//! independent services. The orchestrator issues the three bookings in
//! parallel and waits for all of them to settle:
//! - all three succeed: the trip is `Booked`
//! - any one fails: every service is asked to cancel, in parallel
//!   - all cancellations succeed: the trip is `Cancelled`
//!   - any cancellation fails after its retries: the trip is `CancelFailed`
//!     and needs manual reconciliation
//!
//! Transient faults are retried with bounded exponential backoff. Booking
//! calls get a short budget, compensation calls a long one.

pub mod error;
pub mod events;
pub mod execution;
pub mod orchestrator;
pub mod outcome;
pub mod retry;
pub mod state;
pub mod trip;

pub use error::SagaError;
pub use events::SagaEvent;
pub use execution::SagaExecution;
pub use orchestrator::{SagaPolicies, TripSagaOrchestrator};
pub use outcome::{
    BookingOutcome, BranchOutcome, CompensationOutcome, CompensationResult, TripOutcome,
};
pub use retry::{RetryError, RetryPolicy, Retried, retry_with_policy};
pub use state::{SagaPhase, SagaState, TripResult};
pub use trip::{CarRental, FlightItinerary, HotelStay, Trip};
