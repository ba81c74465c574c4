use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Payload, ResourceType, TripId};
use sqlx::types::Json;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::error::StoreError;
use crate::record::{BookingRecord, BookingState, BookingStatus};
use crate::store::{CasOutcome, InsertOutcome, RecordStore, Result};

const COLUMNS: &str = "resource_type, trip_id, payload, status, booked_at, cancelled_at";

/// PostgreSQL-backed record store scoped to a single resource type.
///
/// Conditional writes map onto single statements: `INSERT ... ON CONFLICT DO
/// NOTHING` for put-if-absent and `UPDATE ... WHERE status = $expected` for
/// compare-and-set. Row-level locking makes both linearizable per key.
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
    resource: ResourceType,
}

impl PostgresRecordStore {
    /// Creates a store for one resource type's bookings.
    pub fn new(pool: PgPool, resource: ResourceType) -> Self {
        Self { pool, resource }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(pool: &PgPool) -> std::result::Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(pool).await?;
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<BookingRecord> {
        let trip_id = parse_trip_id(row.try_get("trip_id")?)?;

        let corrupt = |reason: String| StoreError::Corrupt {
            trip_id: trip_id.to_string(),
            reason,
        };

        let resource: String = row.try_get("resource_type")?;
        let resource: ResourceType = resource.parse().map_err(|e| corrupt(format!("{e}")))?;

        let status: String = row.try_get("status")?;
        let status = BookingStatus::parse(&status)
            .ok_or_else(|| corrupt(format!("unknown status '{status}'")))?;

        let Json(payload): Json<Payload> = row.try_get("payload")?;
        let booked_at: Option<DateTime<Utc>> = row.try_get("booked_at")?;
        let cancelled_at: Option<DateTime<Utc>> = row.try_get("cancelled_at")?;

        let state = match (status, booked_at, cancelled_at) {
            (BookingStatus::Booked, Some(booked_at), None) => BookingState::Booked { booked_at },
            (BookingStatus::Cancelled, booked_at, Some(cancelled_at)) => BookingState::Cancelled {
                booked_at,
                cancelled_at,
            },
            _ => return Err(corrupt(format!("timestamps inconsistent with status {status}"))),
        };

        Ok(BookingRecord {
            trip_id: trip_id.clone(),
            resource,
            payload,
            state,
        })
    }

    async fn fetch(&self, trip_id: &TripId) -> Result<Option<BookingRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM bookings WHERE resource_type = $1 AND trip_id = $2"
        ))
        .bind(self.resource.as_str())
        .bind(trip_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn insert_if_absent(&self, record: BookingRecord) -> Result<InsertOutcome> {
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO bookings ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (resource_type, trip_id) DO NOTHING
            RETURNING {COLUMNS}
            "#
        ))
        .bind(self.resource.as_str())
        .bind(record.trip_id.as_str())
        .bind(Json(&record.payload))
        .bind(record.status().as_str())
        .bind(record.booked_at())
        .bind(record.cancelled_at())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(InsertOutcome::Inserted(Self::row_to_record(row)?));
        }

        // Rows are never deleted, so a conflicting row is still there.
        let existing = self
            .fetch(&record.trip_id)
            .await?
            .ok_or_else(|| StoreError::Corrupt {
                trip_id: record.trip_id.to_string(),
                reason: "insert conflicted but no row was found".to_string(),
            })?;
        Ok(InsertOutcome::Existing(existing))
    }

    async fn cancel_if_status(
        &self,
        trip_id: &TripId,
        expected: BookingStatus,
        cancelled_at: DateTime<Utc>,
    ) -> Result<CasOutcome> {
        let updated = sqlx::query(&format!(
            r#"
            UPDATE bookings
            SET status = 'cancelled', cancelled_at = $3
            WHERE resource_type = $1 AND trip_id = $2 AND status = $4
            RETURNING {COLUMNS}
            "#
        ))
        .bind(self.resource.as_str())
        .bind(trip_id.as_str())
        .bind(cancelled_at)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Ok(CasOutcome::Applied(Self::row_to_record(row)?));
        }

        match self.fetch(trip_id).await? {
            Some(current) => Ok(CasOutcome::Rejected(current)),
            None => Ok(CasOutcome::Missing),
        }
    }

    async fn get(&self, trip_id: &TripId) -> Result<Option<BookingRecord>> {
        self.fetch(trip_id).await
    }
}

fn parse_trip_id(raw: String) -> Result<TripId> {
    TripId::parse(raw.as_str()).map_err(|e| StoreError::Corrupt {
        trip_id: raw,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_trip_id_is_reported_as_stored() {
        let err = parse_trip_id("   ".to_string()).unwrap_err();
        match err {
            StoreError::Corrupt { trip_id, .. } => assert_eq!(trip_id, "   "),
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }

    #[test]
    fn valid_trip_id_parses() {
        assert_eq!(parse_trip_id("t-1".to_string()).unwrap().as_str(), "t-1");
    }
}
