use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::{
        stop::StopDescriptor,
        trip::{NewTrip, TripPatch, TripView},
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trips", get(list_trips))
        .route("/trips/:trip_id", get(get_trip))
        .route("/add-trip", post(add_trip))
        .route("/update-trip/:trip_id", put(update_trip))
        .route("/delete-trip/:trip_id", delete(delete_trip))
}

async fn list_trips(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Vec<TripView>>, AppError> {
    let user = current.require_user()?;
    Ok(Json(state.trips.list(user.id).await?))
}

async fn get_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
) -> Result<Json<TripView>, AppError> {
    let user = current.require_user()?;
    Ok(Json(state.trips.get(user.id, trip_id).await?))
}

async fn add_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(new_trip): Json<NewTrip>,
) -> Result<Json<Value>, AppError> {
    let user = current.require_user()?;
    let trip_id = state.trips.create(user.id, new_trip).await?;
    Ok(Json(
        json!({ "message": "Trip added successfully", "trip_id": trip_id }),
    ))
}

#[derive(Deserialize)]
struct UpdateTripRequest {
    #[serde(default)]
    updated_trip: TripPatch,
    stops_of_trip: Vec<StopDescriptor>,
}

async fn update_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
    Json(request): Json<UpdateTripRequest>,
) -> Result<Json<Value>, AppError> {
    let user = current.require_user()?;
    let updated = state
        .trips
        .update(
            user.id,
            trip_id,
            &request.updated_trip,
            &request.stops_of_trip,
        )
        .await?;

    Ok(Json(json!({
        "message": "Trip updated successfully",
        "trip_id": updated.trip_id,
        "trip_status": updated.status,
    })))
}

async fn delete_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let user = current.require_user()?;
    state.trips.delete(user.id, trip_id).await?;
    Ok(Json(json!({ "message": "Trip deleted successfully" })))
}
