use std::time::Duration;

use tracing::{info, warn};

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        stop::StopDescriptor,
        trip::{NewTrip, Trip, TripPatch, TripStopView, TripView},
    },
    services::{
        mutator::{self, TripUpdated, TRIP_COLUMNS},
        sequencer,
    },
};

#[derive(Clone)]
pub struct TripService {
    db: DbPool,
    update_timeout: Duration,
}

impl TripService {
    pub fn new(db: DbPool, update_timeout: Duration) -> Self {
        Self { db, update_timeout }
    }

    /// Inserts a trip and places its initial stops in the same transaction.
    pub async fn create(&self, owner_id: i64, new_trip: NewTrip) -> Result<i64, AppError> {
        let (trip, stops) = new_trip.into_trip(owner_id)?;
        sequencer::validate_sequence(&stops)?;

        let mut tx = self.db.begin().await?;
        let trip_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO trips (
                user_id, trip_name, start, start_lat, start_lon,
                destination, destination_lat, destination_lon,
                start_date, end_date, time, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            RETURNING id
            "#,
        )
        .bind(trip.user_id)
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
        .fetch_one(&mut *tx)
        .await?;

        if !stops.is_empty() {
            sequencer::reconcile_trip(&mut tx, trip_id, &stops).await?;
        }
        tx.commit().await?;

        info!(trip_id, owner_id, stops = stops.len(), "trip created");
        Ok(trip_id)
    }

    /// The owner's trips, active ones first.
    pub async fn list(&self, owner_id: i64) -> Result<Vec<TripView>, AppError> {
        let mut trips = sqlx::query_as::<_, Trip>(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips WHERE user_id = ?1 ORDER BY id ASC"
        ))
        .bind(owner_id)
        .fetch_all(&self.db)
        .await?;
        trips.sort_by_key(|trip| (trip.status.listing_rank(), trip.id));
        Ok(trips.into_iter().map(TripView::from).collect())
    }

    pub async fn get(&self, owner_id: i64, trip_id: i64) -> Result<TripView, AppError> {
        let mut conn = self.db.acquire().await?;
        let trip = mutator::fetch_owned_trip(&mut conn, owner_id, trip_id).await?;
        let stops = sequencer::load_stops(&mut conn, trip.id)
            .await?
            .into_iter()
            .map(|(position, stop)| TripStopView::new(position, stop))
            .collect();
        let mut view = TripView::from(trip);
        view.stops = Some(stops);
        Ok(view)
    }

    /// Runs the update under `update_timeout`. On expiry the in-flight
    /// transaction is dropped uncommitted and the caller gets `Timeout`.
    pub async fn update(
        &self,
        owner_id: i64,
        trip_id: i64,
        patch: &TripPatch,
        stops: &[StopDescriptor],
    ) -> Result<TripUpdated, AppError> {
        tokio::time::timeout(
            self.update_timeout,
            mutator::update_trip(&self.db, owner_id, trip_id, patch, stops),
        )
        .await
        .map_err(|_| {
            warn!(trip_id, timeout = ?self.update_timeout, "trip update timed out");
            AppError::Timeout
        })?
    }

    /// Deletes an owned trip. Its `trip_stops` rows go with it; the stops
    /// themselves stay in the catalog.
    pub async fn delete(&self, owner_id: i64, trip_id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM trips WHERE id = ?1 AND user_id = ?2")
            .bind(trip_id)
            .bind(owner_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        info!(trip_id, owner_id, "trip deleted");
        Ok(())
    }
}
