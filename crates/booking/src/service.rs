//! The booking service contract and its record-store implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{Payload, ResourceType, TripId};
use serde::{Deserialize, Serialize};

use crate::error::{BookingError, FaultRateError, StoreError};
use crate::fault::{FaultInjector, FaultRates};
use crate::record::{BookingConfirmation, BookingRecord, BookingStatus, CancellationConfirmation};
use crate::store::{CasOutcome, InsertOutcome, RecordStore};

/// The two operations every booking service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Book,
    Cancel,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Book => "book",
            Operation::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `cancel` does when no record exists for the trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingRecordPolicy {
    /// Write a cancelled record with no booking, so a late `book` for the same
    /// trip fails with `AlreadyCancelled`.
    #[default]
    Tombstone,
    /// Fail with `NotFound` and leave the store untouched.
    NotFound,
}

/// Contract of an autonomous resource booking service.
///
/// Both operations are idempotent: repeating a call with the same trip ID
/// returns the same result and leaves the same state as a single call.
#[async_trait]
pub trait BookingService: Send + Sync {
    /// The resource type this service books.
    fn resource(&self) -> ResourceType;

    /// Books the resource for a trip.
    async fn book(
        &self,
        trip_id: &TripId,
        payload: Payload,
    ) -> Result<BookingConfirmation, BookingError>;

    /// Cancels the resource booked for a trip.
    async fn cancel(&self, trip_id: &TripId) -> Result<CancellationConfirmation, BookingError>;
}

#[async_trait]
impl<T: BookingService + ?Sized> BookingService for Arc<T> {
    fn resource(&self) -> ResourceType {
        (**self).resource()
    }

    async fn book(
        &self,
        trip_id: &TripId,
        payload: Payload,
    ) -> Result<BookingConfirmation, BookingError> {
        (**self).book(trip_id, payload).await
    }

    async fn cancel(&self, trip_id: &TripId) -> Result<CancellationConfirmation, BookingError> {
        (**self).cancel(trip_id).await
    }
}

/// Booking service backed by a [`RecordStore`].
#[derive(Clone)]
pub struct ResourceBookingService<S> {
    resource: ResourceType,
    store: S,
    faults: Arc<FaultInjector>,
    missing_record_policy: MissingRecordPolicy,
}

impl<S: RecordStore> ResourceBookingService<S> {
    /// Creates a service with no injected faults.
    pub fn new(resource: ResourceType, store: S) -> Self {
        Self {
            resource,
            store,
            faults: Arc::new(FaultInjector::default()),
            missing_record_policy: MissingRecordPolicy::default(),
        }
    }

    /// Sets the fault-injection rates.
    pub fn with_fault_rates(mut self, rates: FaultRates) -> Result<Self, FaultRateError> {
        self.faults = Arc::new(FaultInjector::new(rates)?);
        Ok(self)
    }

    /// Sets the policy for cancelling a trip with no record.
    pub fn with_missing_record_policy(mut self, policy: MissingRecordPolicy) -> Self {
        self.missing_record_policy = policy;
        self
    }

    /// Returns the fault injector, for adjusting rates at runtime.
    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reads the record for a trip.
    pub async fn record(&self, trip_id: &TripId) -> Result<Option<BookingRecord>, BookingError> {
        self.store
            .get(trip_id)
            .await
            .map_err(|e| self.store_fault(e))
    }

    fn store_fault(&self, err: StoreError) -> BookingError {
        tracing::error!(resource = %self.resource, error = %err, "record store failure");
        BookingError::transient(self.resource, err.to_string())
    }

    fn corrupt(&self, record: &BookingRecord) -> BookingError {
        self.store_fault(StoreError::Corrupt {
            trip_id: record.trip_id.to_string(),
            reason: format!("unexpected status {}", record.status()),
        })
    }

    fn count(&self, operation: Operation, result: &'static str) {
        metrics::counter!(
            "booking_requests_total",
            "resource" => self.resource.as_str(),
            "operation" => operation.as_str(),
            "result" => result
        )
        .increment(1);
    }

    fn inject_fault(&self, operation: Operation) -> Result<(), BookingError> {
        if self.faults.should_fail(operation) {
            self.count(operation, "injected_fault");
            tracing::warn!(resource = %self.resource, %operation, "injected fault");
            let reason = match operation {
                Operation::Book => "failed to create booking",
                Operation::Cancel => "failed to cancel booking",
            };
            return Err(BookingError::transient(self.resource, reason));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: RecordStore> BookingService for ResourceBookingService<S> {
    fn resource(&self) -> ResourceType {
        self.resource
    }

    #[tracing::instrument(skip(self, payload), fields(resource = %self.resource))]
    async fn book(
        &self,
        trip_id: &TripId,
        payload: Payload,
    ) -> Result<BookingConfirmation, BookingError> {
        self.inject_fault(Operation::Book)?;

        let record = BookingRecord::booked(trip_id.clone(), self.resource, payload, Utc::now());
        let outcome = self
            .store
            .insert_if_absent(record)
            .await
            .map_err(|e| self.store_fault(e))?;

        match outcome {
            InsertOutcome::Inserted(record) => {
                self.count(Operation::Book, "created");
                tracing::info!(%trip_id, "created booking");
                BookingConfirmation::from_record(&record).ok_or_else(|| self.corrupt(&record))
            }
            InsertOutcome::Existing(record) => match record.status() {
                BookingStatus::Booked => {
                    self.count(Operation::Book, "duplicate");
                    tracing::warn!(%trip_id, "booking already exists");
                    BookingConfirmation::from_record(&record).ok_or_else(|| self.corrupt(&record))
                }
                BookingStatus::Cancelled => {
                    self.count(Operation::Book, "already_cancelled");
                    tracing::warn!(%trip_id, "booking has already been cancelled");
                    Err(BookingError::AlreadyCancelled {
                        resource: self.resource,
                        trip_id: trip_id.clone(),
                    })
                }
            },
        }
    }

    #[tracing::instrument(skip(self), fields(resource = %self.resource))]
    async fn cancel(&self, trip_id: &TripId) -> Result<CancellationConfirmation, BookingError> {
        self.inject_fault(Operation::Cancel)?;

        let cancelled_at = Utc::now();
        loop {
            let outcome = self
                .store
                .cancel_if_status(trip_id, BookingStatus::Booked, cancelled_at)
                .await
                .map_err(|e| self.store_fault(e))?;

            let record = match outcome {
                CasOutcome::Applied(record) => {
                    self.count(Operation::Cancel, "cancelled");
                    tracing::info!(%trip_id, "cancelled booking");
                    record
                }
                CasOutcome::Rejected(record) => {
                    self.count(Operation::Cancel, "duplicate");
                    tracing::warn!(%trip_id, "booking has already been cancelled");
                    record
                }
                CasOutcome::Missing => match self.missing_record_policy {
                    MissingRecordPolicy::NotFound => {
                        self.count(Operation::Cancel, "not_found");
                        tracing::warn!(%trip_id, "no booking to cancel");
                        return Err(BookingError::NotFound {
                            resource: self.resource,
                            trip_id: trip_id.clone(),
                        });
                    }
                    MissingRecordPolicy::Tombstone => {
                        let tombstone =
                            BookingRecord::tombstone(trip_id.clone(), self.resource, cancelled_at);
                        match self
                            .store
                            .insert_if_absent(tombstone)
                            .await
                            .map_err(|e| self.store_fault(e))?
                        {
                            InsertOutcome::Inserted(record) => {
                                self.count(Operation::Cancel, "tombstoned");
                                tracing::info!(%trip_id, "no booking found, recorded cancellation");
                                record
                            }
                            // A concurrent book or cancel created the record
                            // first; the next CAS sees it.
                            InsertOutcome::Existing(_) => continue,
                        }
                    }
                },
            };

            return CancellationConfirmation::from_record(&record)
                .ok_or_else(|| self.corrupt(&record));
        }
    }
}
