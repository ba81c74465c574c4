//! PostgreSQL record store integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency. Every test
//! works on its own freshly generated trip id, so they can run in parallel.

use std::sync::Arc;

use booking::{
    BookingError, BookingService, BookingStatus, CasOutcome, InsertOutcome, Payload,
    PostgresRecordStore, RecordStore, ResourceBookingService, ResourceType, TripId,
};
use chrono::Utc;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresRecordStore::run_migrations(&temp_pool).await.unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;

    sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(&info.connection_string)
        .await
        .unwrap()
}

fn hotel_payload() -> Payload {
    [
        ("hotel", "inn"),
        ("check_in", "2021-07-07"),
        ("check_out", "2021-07-09"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[tokio::test]
async fn insert_if_absent_keeps_first_record() {
    let store = PostgresRecordStore::new(get_test_pool().await, ResourceType::Hotel);
    let trip_id = TripId::new();

    let first = booking::BookingRecord::booked(
        trip_id.clone(),
        ResourceType::Hotel,
        hotel_payload(),
        Utc::now(),
    );
    let outcome = store.insert_if_absent(first).await.unwrap();
    let InsertOutcome::Inserted(stored) = outcome else {
        panic!("expected Inserted, got {outcome:?}");
    };
    assert_eq!(stored.payload, hotel_payload());

    let second = booking::BookingRecord::booked(
        trip_id.clone(),
        ResourceType::Hotel,
        Payload::new(),
        Utc::now(),
    );
    let outcome = store.insert_if_absent(second).await.unwrap();
    assert_eq!(outcome, InsertOutcome::Existing(stored));
}

#[tokio::test]
async fn cancel_if_status_is_conditional() {
    let store = PostgresRecordStore::new(get_test_pool().await, ResourceType::Car);
    let trip_id = TripId::new();

    let missing = store
        .cancel_if_status(&trip_id, BookingStatus::Booked, Utc::now())
        .await
        .unwrap();
    assert_eq!(missing, CasOutcome::Missing);

    store
        .insert_if_absent(booking::BookingRecord::booked(
            trip_id.clone(),
            ResourceType::Car,
            Payload::new(),
            Utc::now(),
        ))
        .await
        .unwrap();

    let applied = store
        .cancel_if_status(&trip_id, BookingStatus::Booked, Utc::now())
        .await
        .unwrap();
    let CasOutcome::Applied(cancelled) = applied else {
        panic!("expected Applied, got {applied:?}");
    };
    assert_eq!(cancelled.status(), BookingStatus::Cancelled);

    let rejected = store
        .cancel_if_status(&trip_id, BookingStatus::Booked, Utc::now())
        .await
        .unwrap();
    assert_eq!(rejected, CasOutcome::Rejected(cancelled));
}

#[tokio::test]
async fn stores_are_scoped_by_resource_type() {
    let pool = get_test_pool().await;
    let hotel = ResourceBookingService::new(
        ResourceType::Hotel,
        PostgresRecordStore::new(pool.clone(), ResourceType::Hotel),
    );
    let car = ResourceBookingService::new(
        ResourceType::Car,
        PostgresRecordStore::new(pool, ResourceType::Car),
    );
    let trip_id = TripId::new();

    hotel.book(&trip_id, hotel_payload()).await.unwrap();
    car.cancel(&trip_id).await.unwrap();

    let hotel_record = hotel.record(&trip_id).await.unwrap().unwrap();
    assert_eq!(hotel_record.status(), BookingStatus::Booked);
    let car_record = car.record(&trip_id).await.unwrap().unwrap();
    assert!(car_record.is_tombstone());
}

#[tokio::test]
async fn service_idempotency_against_postgres() {
    let pool = get_test_pool().await;
    let service = ResourceBookingService::new(
        ResourceType::Flight,
        PostgresRecordStore::new(pool.clone(), ResourceType::Flight),
    );
    let trip_id = TripId::new();

    let first = service.book(&trip_id, Payload::new()).await.unwrap();
    let second = service.book(&trip_id, Payload::new()).await.unwrap();
    assert_eq!(first.booked_at, second.booked_at);

    let c1 = service.cancel(&trip_id).await.unwrap();
    let c2 = service.cancel(&trip_id).await.unwrap();
    assert_eq!(c1, c2);

    let err = service.book(&trip_id, Payload::new()).await.unwrap_err();
    assert!(matches!(err, BookingError::AlreadyCancelled { .. }));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE trip_id = $1")
        .bind(trip_id.as_str())
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn concurrent_books_create_one_row() {
    let pool = get_test_pool().await;
    let service = ResourceBookingService::new(
        ResourceType::Hotel,
        PostgresRecordStore::new(pool.clone(), ResourceType::Hotel),
    );
    let trip_id = TripId::new();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        let trip_id = trip_id.clone();
        handles.push(tokio::spawn(async move {
            service.book(&trip_id, Payload::new()).await
        }));
    }

    let mut booked_at = Vec::new();
    for handle in handles {
        booked_at.push(handle.await.unwrap().unwrap().booked_at);
    }
    booked_at.dedup();
    assert_eq!(booked_at.len(), 1);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE trip_id = $1")
        .bind(trip_id.as_str())
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}
