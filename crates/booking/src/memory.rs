use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::TripId;
use tokio::sync::RwLock;

use crate::record::{BookingRecord, BookingStatus};
use crate::store::{CasOutcome, InsertOutcome, RecordStore, Result};

/// In-memory record store.
///
/// Every write takes the map's write lock, which serializes conditional writes
/// for all keys of this store.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<HashMap<TripId, BookingRecord>>>,
}

impl InMemoryRecordStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records stored.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns every record, ordered by trip ID.
    pub async fn all_records(&self) -> Vec<BookingRecord> {
        let records = self.records.read().await;
        let mut all: Vec<_> = records.values().cloned().collect();
        all.sort_by(|a, b| a.trip_id.cmp(&b.trip_id));
        all
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert_if_absent(&self, record: BookingRecord) -> Result<InsertOutcome> {
        let mut records = self.records.write().await;

        if let Some(existing) = records.get(&record.trip_id) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }

        records.insert(record.trip_id.clone(), record.clone());
        Ok(InsertOutcome::Inserted(record))
    }

    async fn cancel_if_status(
        &self,
        trip_id: &TripId,
        expected: BookingStatus,
        cancelled_at: DateTime<Utc>,
    ) -> Result<CasOutcome> {
        let mut records = self.records.write().await;

        let Some(current) = records.get_mut(trip_id) else {
            return Ok(CasOutcome::Missing);
        };

        if current.status() != expected {
            return Ok(CasOutcome::Rejected(current.clone()));
        }

        let updated = current.clone().cancel(cancelled_at);
        *current = updated.clone();
        Ok(CasOutcome::Applied(updated))
    }

    async fn get(&self, trip_id: &TripId) -> Result<Option<BookingRecord>> {
        let records = self.records.read().await;
        Ok(records.get(trip_id).cloned())
    }
}
