//! Saga error types.

use common::{ResourceType, TripId};
use thiserror::Error;

use crate::state::{SagaPhase, SagaState};

/// Errors that can occur while driving a saga.
///
/// Remote-call failures are not errors at this level: they are recorded as
/// branch outcomes and decide the saga's terminal state. These variants cover
/// misuse of the orchestrator and violations of the execution record's rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SagaError {
    /// The saga is in a state that does not accept the event.
    #[error("Invalid saga transition: {event} in state {state}")]
    InvalidTransition {
        state: SagaState,
        event: &'static str,
    },

    /// A branch reported its outcome twice in the same phase.
    #[error("{resource} branch already settled in {phase:?} phase")]
    BranchAlreadySettled {
        phase: SagaPhase,
        resource: ResourceType,
    },

    /// A phase was closed before all of its branches settled.
    #[error("{phase:?} phase closed before all branches settled")]
    PhaseNotSettled { phase: SagaPhase },

    /// A phase-closing event disagrees with the recorded branch outcomes.
    #[error("{event} contradicts the recorded branch outcomes")]
    OutcomeMismatch { event: &'static str },

    /// A saga has already been submitted for this trip.
    #[error("Trip {0} has already been submitted")]
    AlreadySubmitted(TripId),

    /// No saga execution exists for this trip.
    #[error("No saga execution for trip {0}")]
    ExecutionNotFound(TripId),

    /// The task driving the saga panicked or was aborted.
    #[error("Saga task for trip {trip_id} aborted: {reason}")]
    TaskAborted { trip_id: TripId, reason: String },
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
