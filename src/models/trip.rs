use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize, Serializer};
use sqlx::FromRow;

use crate::{
    error::AppError,
    models::stop::{Coordinates, Stop, StopDescriptor},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TripStatus {
    #[default]
    Upcoming,
    InProgress,
    Finished,
    Cancelled,
    Delayed,
}

impl TripStatus {
    pub const ALL: [TripStatus; 5] = [
        TripStatus::Upcoming,
        TripStatus::InProgress,
        TripStatus::Finished,
        TripStatus::Cancelled,
        TripStatus::Delayed,
    ];

    /// Maps a client label to a status. Matching is exact: `"in progress"`
    /// or `"upcoming"` are rejected.
    pub fn from_wire(label: &str) -> Result<Self, AppError> {
        match label {
            "Upcoming" => Ok(TripStatus::Upcoming),
            "In Progress" => Ok(TripStatus::InProgress),
            "Finished" => Ok(TripStatus::Finished),
            "Cancelled" => Ok(TripStatus::Cancelled),
            "Delayed" => Ok(TripStatus::Delayed),
            other => Err(AppError::InvalidArgument(format!(
                "unknown trip status {other:?}"
            ))),
        }
    }

    pub fn wire_label(&self) -> &'static str {
        match self {
            TripStatus::Upcoming => "Upcoming",
            TripStatus::InProgress => "In Progress",
            TripStatus::Finished => "Finished",
            TripStatus::Cancelled => "Cancelled",
            TripStatus::Delayed => "Delayed",
        }
    }

    /// Column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Upcoming => "upcoming",
            TripStatus::InProgress => "in_progress",
            TripStatus::Finished => "finished",
            TripStatus::Cancelled => "cancelled",
            TripStatus::Delayed => "delayed",
        }
    }

    /// Sort rank for trip listings: active trips first, finished last.
    pub fn listing_rank(&self) -> u8 {
        match self {
            TripStatus::InProgress => 0,
            TripStatus::Upcoming => 1,
            TripStatus::Delayed => 2,
            TripStatus::Cancelled => 3,
            TripStatus::Finished => 4,
        }
    }
}

impl TryFrom<String> for TripStatus {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TripStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| AppError::Other(anyhow::anyhow!("corrupt trip status {value:?}")))
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_label())
    }
}

impl Serialize for TripStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.wire_label())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Trip {
    pub id: i64,
    pub user_id: i64,
    pub trip_name: String,
    pub start: Option<String>,
    pub start_lat: Option<f64>,
    pub start_lon: Option<f64>,
    pub destination: Option<String>,
    pub destination_lat: Option<f64>,
    pub destination_lon: Option<f64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    #[sqlx(try_from = "String")]
    pub status: TripStatus,
}

impl Trip {
    pub fn start_coordinates(&self) -> Option<Coordinates> {
        Some(Coordinates::new(self.start_lat?, self.start_lon?))
    }

    pub fn destination_coordinates(&self) -> Option<Coordinates> {
        Some(Coordinates::new(self.destination_lat?, self.destination_lon?))
    }

    /// Overwrites the fields present in `patch`. Everything is validated
    /// before the first field is touched, so on error `self` is unchanged.
    pub fn apply(&mut self, patch: &TripPatch) -> Result<(), AppError> {
        let status = patch
            .trip_status
            .as_deref()
            .map(TripStatus::from_wire)
            .transpose()?;
        if let Some(name) = &patch.trip_name {
            if name.trim().is_empty() {
                return Err(AppError::InvalidArgument("trip name is empty".into()));
            }
        }
        for coords in [&patch.start_coordinates, &patch.destination_coordinates]
            .into_iter()
            .flatten()
        {
            coords.validate()?;
        }
        let start_date = patch.start_date.or(self.start_date);
        let end_date = patch.end_date.or(self.end_date);
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                return Err(AppError::InvalidArgument(
                    "end date is before start date".into(),
                ));
            }
        }

        if let Some(name) = &patch.trip_name {
            self.trip_name = name.trim().to_string();
        }
        if let Some(start) = &patch.start {
            self.start = Some(start.clone());
        }
        if let Some(coords) = patch.start_coordinates {
            self.start_lat = Some(coords.latitude);
            self.start_lon = Some(coords.longitude);
        }
        if let Some(destination) = &patch.destination {
            self.destination = Some(destination.clone());
        }
        if let Some(coords) = patch.destination_coordinates {
            self.destination_lat = Some(coords.latitude);
            self.destination_lon = Some(coords.longitude);
        }
        self.start_date = start_date;
        self.end_date = end_date;
        if let Some(time) = patch.time {
            self.time = Some(time);
        }
        if let Some(status) = status {
            self.status = status;
        }
        Ok(())
    }
}

/// Sparse set of trip fields. Absent fields leave the stored value alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripPatch {
    pub trip_name: Option<String>,
    pub start: Option<String>,
    pub destination: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub trip_status: Option<String>,
    pub start_coordinates: Option<Coordinates>,
    pub destination_coordinates: Option<Coordinates>,
}

/// Body of the add-trip request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTrip {
    pub trip_name: String,
    pub start: Option<String>,
    pub start_coordinates: Option<Coordinates>,
    pub destination: Option<String>,
    pub destination_coordinates: Option<Coordinates>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub trip_status: Option<String>,
    #[serde(default)]
    pub stops: Vec<StopDescriptor>,
}

impl NewTrip {
    /// Builds the unsaved trip row (id 0) for `user_id`, validating the same
    /// way a patch is validated.
    pub fn into_trip(self, user_id: i64) -> Result<(Trip, Vec<StopDescriptor>), AppError> {
        let mut trip = Trip {
            id: 0,
            user_id,
            trip_name: String::new(),
            start: None,
            start_lat: None,
            start_lon: None,
            destination: None,
            destination_lat: None,
            destination_lon: None,
            start_date: None,
            end_date: None,
            time: None,
            status: TripStatus::default(),
        };
        let patch = TripPatch {
            trip_name: Some(self.trip_name),
            start: self.start,
            destination: self.destination,
            start_date: self.start_date,
            end_date: self.end_date,
            time: self.time,
            trip_status: self.trip_status,
            start_coordinates: self.start_coordinates,
            destination_coordinates: self.destination_coordinates,
        };
        trip.apply(&patch)?;
        Ok((trip, self.stops))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TripStopView {
    pub position: i64,
    pub stop_id: i64,
    pub stop_name: String,
    pub stop_coordinates: Coordinates,
}

impl TripStopView {
    pub fn new(position: i64, stop: Stop) -> Self {
        Self {
            position,
            stop_id: stop.id,
            stop_coordinates: stop.coordinates(),
            stop_name: stop.name,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TripView {
    pub trip_id: i64,
    pub trip_name: String,
    pub start: Option<String>,
    pub start_coordinates: Option<Coordinates>,
    pub destination: Option<String>,
    pub destination_coordinates: Option<Coordinates>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub trip_status: TripStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stops: Option<Vec<TripStopView>>,
}

impl From<Trip> for TripView {
    fn from(trip: Trip) -> Self {
        Self {
            start_coordinates: trip.start_coordinates(),
            destination_coordinates: trip.destination_coordinates(),
            trip_id: trip.id,
            trip_name: trip.trip_name,
            start: trip.start,
            destination: trip.destination,
            start_date: trip.start_date,
            end_date: trip.end_date,
            time: trip.time,
            trip_status: trip.status,
            stops: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trip() -> Trip {
        Trip {
            id: 7,
            user_id: 1,
            trip_name: "Coast run".into(),
            start: Some("Auckland".into()),
            start_lat: Some(-36.85),
            start_lon: Some(174.76),
            destination: Some("Wellington".into()),
            destination_lat: Some(-41.29),
            destination_lon: Some(174.78),
            start_date: NaiveDate::from_ymd_opt(2024, 12, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 5),
            time: NaiveTime::from_hms_opt(8, 30, 0),
            status: TripStatus::Upcoming,
        }
    }

    #[test]
    fn wire_labels_map_exactly() {
        for status in TripStatus::ALL {
            assert_eq!(TripStatus::from_wire(status.wire_label()).unwrap(), status);
            assert_eq!(
                TripStatus::try_from(status.as_str().to_string()).unwrap(),
                status
            );
        }
        for bad in ["Unknown", "upcoming", "In progress", "in_progress", " Delayed", ""] {
            assert!(matches!(
                TripStatus::from_wire(bad),
                Err(AppError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn listing_rank_puts_active_trips_first() {
        let mut statuses = TripStatus::ALL.to_vec();
        statuses.sort_by_key(TripStatus::listing_rank);
        assert_eq!(
            statuses,
            vec![
                TripStatus::InProgress,
                TripStatus::Upcoming,
                TripStatus::Delayed,
                TripStatus::Cancelled,
                TripStatus::Finished,
            ]
        );
    }

    #[test]
    fn apply_only_touches_present_fields() {
        let mut trip = sample_trip();
        let patch = TripPatch {
            destination: Some("Napier".into()),
            trip_status: Some("In Progress".into()),
            ..Default::default()
        };
        trip.apply(&patch).unwrap();
        assert_eq!(trip.destination.as_deref(), Some("Napier"));
        assert_eq!(trip.status, TripStatus::InProgress);
        assert_eq!(trip.trip_name, "Coast run");
        assert_eq!(trip.start.as_deref(), Some("Auckland"));
        assert_eq!(trip.time, NaiveTime::from_hms_opt(8, 30, 0));
    }

    #[test]
    fn unknown_status_leaves_trip_untouched() {
        let mut trip = sample_trip();
        let patch = TripPatch {
            trip_name: Some("Renamed".into()),
            trip_status: Some("Unknown".into()),
            ..Default::default()
        };
        assert!(matches!(
            trip.apply(&patch),
            Err(AppError::InvalidArgument(_))
        ));
        assert_eq!(trip.trip_name, "Coast run");
        assert_eq!(trip.status, TripStatus::Upcoming);
    }

    #[test]
    fn end_before_start_is_rejected() {
        let mut trip = sample_trip();
        let patch = TripPatch {
            end_date: NaiveDate::from_ymd_opt(2024, 11, 30),
            ..Default::default()
        };
        assert!(trip.apply(&patch).is_err());
        assert_eq!(trip.end_date, NaiveDate::from_ymd_opt(2024, 12, 5));
    }

    #[test]
    fn moving_start_past_stored_end_is_rejected() {
        let mut trip = sample_trip();
        let patch = TripPatch {
            start_date: NaiveDate::from_ymd_opt(2024, 12, 9),
            ..Default::default()
        };
        assert!(matches!(
            trip.apply(&patch),
            Err(AppError::InvalidArgument(_))
        ));
        assert_eq!(trip.start_date, NaiveDate::from_ymd_opt(2024, 12, 1));
    }

    #[test]
    fn blank_trip_name_is_rejected() {
        let mut trip = sample_trip();
        let patch = TripPatch {
            trip_name: Some("   ".into()),
            ..Default::default()
        };
        assert!(matches!(
            trip.apply(&patch),
            Err(AppError::InvalidArgument(_))
        ));
        assert_eq!(trip.trip_name, "Coast run");
    }

    #[test]
    fn view_serializes_status_label_and_coordinate_pairs() {
        let view = TripView::from(sample_trip());
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["trip_status"], "Upcoming");
        assert_eq!(json["start_coordinates"], serde_json::json!([-36.85, 174.76]));
        assert!(json.get("stops").is_none());
    }

    #[test]
    fn new_trip_defaults_to_upcoming() {
        let raw = r#"{"trip_name": "Weekend", "start": "Home"}"#;
        let new_trip: NewTrip = serde_json::from_str(raw).unwrap();
        let (trip, stops) = new_trip.into_trip(3).unwrap();
        assert_eq!(trip.user_id, 3);
        assert_eq!(trip.status, TripStatus::Upcoming);
        assert!(stops.is_empty());
    }
}
