use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::info;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        stop::StopDescriptor,
        trip::{Trip, TripPatch, TripStatus},
    },
    services::sequencer::{self, MutationPlan},
};

pub(crate) const TRIP_COLUMNS: &str = "id, user_id, trip_name, start, start_lat, start_lon, \
     destination, destination_lat, destination_lon, start_date, end_date, time, status";

#[derive(Debug, Clone, Serialize)]
pub struct TripUpdated {
    pub trip_id: i64,
    pub status: TripStatus,
    #[serde(skip)]
    pub plan: MutationPlan,
}

pub(crate) async fn fetch_owned_trip(
    conn: &mut SqliteConnection,
    owner_id: i64,
    trip_id: i64,
) -> Result<Trip, AppError> {
    sqlx::query_as::<_, Trip>(&format!(
        "SELECT {TRIP_COLUMNS} FROM trips WHERE id = ?1 AND user_id = ?2"
    ))
    .bind(trip_id)
    .bind(owner_id)
    .fetch_optional(conn)
    .await?
    .ok_or(AppError::NotFound)
}

/// Like [`fetch_owned_trip`], but the first statement is a write, so the
/// transaction takes SQLite's write lock up front. A deferred transaction that
/// reads first cannot be upgraded while another writer is active and fails
/// with `SQLITE_BUSY` instead of waiting out the busy timeout.
pub(crate) async fn lock_owned_trip(
    conn: &mut SqliteConnection,
    owner_id: i64,
    trip_id: i64,
) -> Result<Trip, AppError> {
    sqlx::query_as::<_, Trip>(&format!(
        "UPDATE trips SET id = id WHERE id = ?1 AND user_id = ?2 RETURNING {TRIP_COLUMNS}"
    ))
    .bind(trip_id)
    .bind(owner_id)
    .fetch_optional(conn)
    .await?
    .ok_or(AppError::NotFound)
}

pub(crate) async fn write_trip_fields(
    conn: &mut SqliteConnection,
    trip: &Trip,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE trips SET
            trip_name = ?1, start = ?2, start_lat = ?3, start_lon = ?4,
            destination = ?5, destination_lat = ?6, destination_lon = ?7,
            start_date = ?8, end_date = ?9, time = ?10, status = ?11
        WHERE id = ?12
        "#,
    )
    .bind(&trip.trip_name)
    .bind(&trip.start)
    .bind(trip.start_lat)
    .bind(trip.start_lon)
    .bind(&trip.destination)
    .bind(trip.destination_lat)
    .bind(trip.destination_lon)
    .bind(trip.start_date)
    .bind(trip.end_date)
    .bind(trip.time)
    .bind(trip.status.as_str())
    .bind(trip.id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Applies `patch` to the trip and reconciles its stops with `stops`, all in
/// one transaction. Any error, or dropping the returned future before it
/// completes, rolls the whole update back.
pub async fn update_trip(
    db: &DbPool,
    owner_id: i64,
    trip_id: i64,
    patch: &TripPatch,
    stops: &[StopDescriptor],
) -> Result<TripUpdated, AppError> {
    let mut tx = db.begin().await?;

    let mut trip = lock_owned_trip(&mut tx, owner_id, trip_id).await?;
    trip.apply(patch)?;
    sequencer::validate_sequence(stops)?;

    write_trip_fields(&mut tx, &trip).await?;
    let plan = sequencer::reconcile_trip(&mut tx, trip.id, stops).await?;

    tx.commit().await?;

    info!(
        trip_id = trip.id,
        status = trip.status.as_str(),
        stop_changes = plan.row_changes(),
        created_stops = plan.created_stops.len(),
        "trip updated"
    );

    Ok(TripUpdated {
        trip_id: trip.id,
        status: trip.status,
        plan,
    })
}
