use async_trait::async_trait;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::{
    error::AppError,
    models::stop::{Coordinates, Stop, StopKey},
};

/// Result of resolving a stop descriptor to a catalog entry.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub stop: Stop,
    pub created: bool,
}

/// Registry of physical stops keyed by [`StopKey`]. The catalog only grows.
#[async_trait]
pub trait StopCatalog {
    /// Returns the stop matching `(name, coordinates)`, creating it if no
    /// stop with the same key exists yet.
    async fn resolve(&mut self, name: &str, coordinates: &Coordinates)
        -> Result<Resolved, AppError>;
}

/// Catalog backed by the `stops` table, running on the caller's connection
/// so resolutions take part in the caller's transaction.
pub struct SqlStopCatalog<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SqlStopCatalog<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    async fn find(&mut self, key: &StopKey) -> Result<Option<Stop>, AppError> {
        let stop = sqlx::query_as::<_, Stop>(
            "SELECT id, name, latitude, longitude FROM stops WHERE name = ?1 AND lat_e6 = ?2 AND lon_e6 = ?3",
        )
        .bind(&key.name)
        .bind(key.lat_e6)
        .bind(key.lon_e6)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(stop)
    }
}

#[async_trait]
impl StopCatalog for SqlStopCatalog<'_> {
    async fn resolve(
        &mut self,
        name: &str,
        coordinates: &Coordinates,
    ) -> Result<Resolved, AppError> {
        let key = StopKey::new(name, coordinates)?;
        if let Some(stop) = self.find(&key).await? {
            return Ok(Resolved {
                stop,
                created: false,
            });
        }

        // A concurrent writer may insert the same key between the lookup and
        // the insert; DO NOTHING plus a second lookup converges on its row.
        let inserted = sqlx::query_as::<_, Stop>(
            r#"
            INSERT INTO stops (name, lat_e6, lon_e6, latitude, longitude)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (name, lat_e6, lon_e6) DO NOTHING
            RETURNING id, name, latitude, longitude
            "#,
        )
        .bind(&key.name)
        .bind(key.lat_e6)
        .bind(key.lon_e6)
        .bind(coordinates.latitude)
        .bind(coordinates.longitude)
        .fetch_optional(&mut *self.conn)
        .await?;

        match inserted {
            Some(stop) => {
                debug!(stop_id = stop.id, name = %stop.name, "created stop");
                Ok(Resolved {
                    stop,
                    created: true,
                })
            }
            None => {
                let stop = self.find(&key).await?.ok_or_else(|| {
                    AppError::Conflict(format!("stop {:?} could not be resolved", key.name))
                })?;
                Ok(Resolved {
                    stop,
                    created: false,
                })
            }
        }
    }
}

pub async fn count_stops(conn: &mut SqliteConnection) -> Result<i64, AppError> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM stops")
        .fetch_one(conn)
        .await?;
    Ok(count)
}
