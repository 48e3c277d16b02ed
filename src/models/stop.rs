use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;

/// Micro-degrees per degree. Coordinates are compared at this precision.
pub const COORD_SCALE: f64 = 1_000_000.0;

/// A latitude/longitude pair. On the wire it is a two-element array
/// `[latitude, longitude]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(AppError::InvalidArgument(
                "coordinates must be finite numbers".into(),
            ));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(AppError::InvalidArgument(format!(
                "latitude {} is out of range",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(AppError::InvalidArgument(format!(
                "longitude {} is out of range",
                self.longitude
            )));
        }
        Ok(())
    }

    /// Fixed-precision encoding, `(lat_e6, lon_e6)`.
    pub fn to_e6(&self) -> (i64, i64) {
        (
            (self.latitude * COORD_SCALE).round() as i64,
            (self.longitude * COORD_SCALE).round() as i64,
        )
    }
}

impl From<[f64; 2]> for Coordinates {
    fn from([latitude, longitude]: [f64; 2]) -> Self {
        Self::new(latitude, longitude)
    }
}

impl From<Coordinates> for [f64; 2] {
    fn from(value: Coordinates) -> Self {
        [value.latitude, value.longitude]
    }
}

/// Content key identifying a physical stop.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StopKey {
    pub name: String,
    pub lat_e6: i64,
    pub lon_e6: i64,
}

impl StopKey {
    pub fn new(name: &str, coordinates: &Coordinates) -> Result<Self, AppError> {
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(AppError::InvalidArgument("stop name is empty".into()));
        }
        coordinates.validate()?;
        let (lat_e6, lon_e6) = coordinates.to_e6();
        Ok(Self {
            name,
            lat_e6,
            lon_e6,
        })
    }
}

/// Trims and collapses runs of whitespace. Case is kept.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Stop {
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Stop {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// One entry of a submitted stop sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopDescriptor {
    #[serde(alias = "id")]
    pub position: i64,
    #[serde(alias = "stop_name")]
    pub name: String,
    #[serde(alias = "stop_coordinates")]
    pub coordinates: Coordinates,
}

impl StopDescriptor {
    pub fn new(position: i64, name: impl Into<String>, coordinates: Coordinates) -> Self {
        Self {
            position,
            name: name.into(),
            coordinates,
        }
    }
}
