use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::TripId;

use crate::error::StoreError;
use crate::record::{BookingRecord, BookingStatus};

/// Result type for record store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of a put-if-absent write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// No record existed; the given record was stored.
    Inserted(BookingRecord),
    /// A record already existed and was left untouched.
    Existing(BookingRecord),
}

/// Outcome of a compare-and-set on a record's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The status matched and the update was applied.
    Applied(BookingRecord),
    /// The status did not match; the current record is returned unchanged.
    Rejected(BookingRecord),
    /// No record exists for the trip.
    Missing,
}

/// Private per-resource storage for booking records.
///
/// Implementations must make each operation atomic and linearizable per trip
/// ID. No operation spans more than one key.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Stores `record` only if no record exists for its trip ID.
    async fn insert_if_absent(&self, record: BookingRecord) -> Result<InsertOutcome>;

    /// Cancels the record for `trip_id` only if its current status equals
    /// `expected`.
    async fn cancel_if_status(
        &self,
        trip_id: &TripId,
        expected: BookingStatus,
        cancelled_at: DateTime<Utc>,
    ) -> Result<CasOutcome>;

    /// Reads the current record with a consistent read.
    async fn get(&self, trip_id: &TripId) -> Result<Option<BookingRecord>>;
}

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    async fn insert_if_absent(&self, record: BookingRecord) -> Result<InsertOutcome> {
        (**self).insert_if_absent(record).await
    }

    async fn cancel_if_status(
        &self,
        trip_id: &TripId,
        expected: BookingStatus,
        cancelled_at: DateTime<Utc>,
    ) -> Result<CasOutcome> {
        (**self).cancel_if_status(trip_id, expected, cancelled_at).await
    }

    async fn get(&self, trip_id: &TripId) -> Result<Option<BookingRecord>> {
        (**self).get(trip_id).await
    }
}
