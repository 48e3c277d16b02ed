//! Reconciles the stored stop sequence of a trip with a submitted one.
//!
//! A trip's stops are `(position -> stop_id)` rows in `trip_stops`. A client
//! always submits the complete desired sequence; [`reconcile`] turns it into a
//! [`MutationPlan`] holding the fewest row changes that reach that state, and
//! [`apply_plan`] writes the plan on the same connection.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use sqlx::{FromRow, SqliteConnection};
use tracing::debug;

use crate::{
    error::AppError,
    models::stop::{Stop, StopDescriptor},
    services::catalog::{SqlStopCatalog, StopCatalog},
};

/// "Stop `stop_id` sits at `position`" within one trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, FromRow)]
pub struct StopAssignment {
    pub position: i64,
    pub stop_id: i64,
}

impl StopAssignment {
    pub fn new(position: i64, stop_id: i64) -> Self {
        Self { position, stop_id }
    }
}

/// Row changes that turn the stored sequence into the desired one.
///
/// `deletes` holds positions. All lists are sorted by position.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MutationPlan {
    pub created_stops: Vec<i64>,
    pub deletes: Vec<i64>,
    pub updates: Vec<StopAssignment>,
    pub inserts: Vec<StopAssignment>,
    pub unchanged: usize,
}

impl MutationPlan {
    /// True when applying the plan would not write any `trip_stops` row.
    pub fn is_noop(&self) -> bool {
        self.deletes.is_empty() && self.updates.is_empty() && self.inserts.is_empty()
    }

    pub fn row_changes(&self) -> usize {
        self.deletes.len() + self.updates.len() + self.inserts.len()
    }
}

/// Rejects sequences the diff cannot interpret: negative positions and a
/// position claimed by more than one entry.
pub fn validate_sequence(desired: &[StopDescriptor]) -> Result<(), AppError> {
    let mut seen = HashSet::with_capacity(desired.len());
    for entry in desired {
        if entry.position < 0 {
            return Err(AppError::InvalidArgument(format!(
                "stop position {} is negative",
                entry.position
            )));
        }
        if !seen.insert(entry.position) {
            return Err(AppError::InvalidArgument(format!(
                "stop position {} appears more than once",
                entry.position
            )));
        }
    }
    Ok(())
}

/// Pure ordered-list diff. `desired` must not repeat a position.
pub fn diff(current: &[StopAssignment], desired: &[StopAssignment]) -> MutationPlan {
    let stored: BTreeMap<i64, i64> = current.iter().map(|a| (a.position, a.stop_id)).collect();
    let wanted: BTreeMap<i64, i64> = desired.iter().map(|a| (a.position, a.stop_id)).collect();

    let mut plan = MutationPlan {
        deletes: stored
            .keys()
            .filter(|position| !wanted.contains_key(position))
            .copied()
            .collect(),
        ..Default::default()
    };

    for (&position, &stop_id) in &wanted {
        match stored.get(&position) {
            Some(&existing) if existing == stop_id => plan.unchanged += 1,
            Some(_) => plan.updates.push(StopAssignment::new(position, stop_id)),
            None => plan.inserts.push(StopAssignment::new(position, stop_id)),
        }
    }

    plan
}

/// Resolves every desired entry through `catalog` and diffs the result
/// against `current`.
pub async fn reconcile<C>(
    catalog: &mut C,
    current: &[StopAssignment],
    desired: &[StopDescriptor],
) -> Result<MutationPlan, AppError>
where
    C: StopCatalog + Send,
{
    validate_sequence(desired)?;

    let mut created_stops = Vec::new();
    let mut resolved = Vec::with_capacity(desired.len());
    for entry in desired {
        let outcome = catalog.resolve(&entry.name, &entry.coordinates).await?;
        if outcome.created {
            created_stops.push(outcome.stop.id);
        }
        resolved.push(StopAssignment::new(entry.position, outcome.stop.id));
    }

    let mut plan = diff(current, &resolved);
    created_stops.sort_unstable();
    created_stops.dedup();
    plan.created_stops = created_stops;
    Ok(plan)
}

pub async fn load_assignments(
    conn: &mut SqliteConnection,
    trip_id: i64,
) -> Result<Vec<StopAssignment>, AppError> {
    let rows = sqlx::query_as::<_, StopAssignment>(
        "SELECT position, stop_id FROM trip_stops WHERE trip_id = ?1 ORDER BY position",
    )
    .bind(trip_id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// The trip's stops in position order, joined with their catalog rows.
pub async fn load_stops(
    conn: &mut SqliteConnection,
    trip_id: i64,
) -> Result<Vec<(i64, Stop)>, AppError> {
    #[derive(FromRow)]
    struct Row {
        position: i64,
        id: i64,
        name: String,
        latitude: f64,
        longitude: f64,
    }

    let rows = sqlx::query_as::<_, Row>(
        r#"
        SELECT ts.position, s.id, s.name, s.latitude, s.longitude
        FROM trip_stops ts
        JOIN stops s ON s.id = ts.stop_id
        WHERE ts.trip_id = ?1
        ORDER BY ts.position
        "#,
    )
    .bind(trip_id)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            (
                row.position,
                Stop {
                    id: row.id,
                    name: row.name,
                    latitude: row.latitude,
                    longitude: row.longitude,
                },
            )
        })
        .collect())
}

/// Writes `plan` for `trip_id`: deletes, then in-place updates, then inserts,
/// so no two rows ever claim the same position.
pub async fn apply_plan(
    conn: &mut SqliteConnection,
    trip_id: i64,
    plan: &MutationPlan,
) -> Result<(), AppError> {
    for position in &plan.deletes {
        sqlx::query("DELETE FROM trip_stops WHERE trip_id = ?1 AND position = ?2")
            .bind(trip_id)
            .bind(position)
            .execute(&mut *conn)
            .await?;
    }
    for assignment in &plan.updates {
        sqlx::query("UPDATE trip_stops SET stop_id = ?1 WHERE trip_id = ?2 AND position = ?3")
            .bind(assignment.stop_id)
            .bind(trip_id)
            .bind(assignment.position)
            .execute(&mut *conn)
            .await?;
    }
    for assignment in &plan.inserts {
        sqlx::query("INSERT INTO trip_stops (trip_id, stop_id, position) VALUES (?1, ?2, ?3)")
            .bind(trip_id)
            .bind(assignment.stop_id)
            .bind(assignment.position)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Full reconciliation pass for a stored trip on `conn`. The caller owns the
/// transaction; nothing here commits.
pub async fn reconcile_trip(
    conn: &mut SqliteConnection,
    trip_id: i64,
    desired: &[StopDescriptor],
) -> Result<MutationPlan, AppError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM trips WHERE id = ?1)")
        .bind(trip_id)
        .fetch_one(&mut *conn)
        .await?;
    if !exists {
        return Err(AppError::NotFound);
    }

    let current = load_assignments(conn, trip_id).await?;
    let plan = {
        let mut catalog = SqlStopCatalog::new(conn);
        reconcile(&mut catalog, &current, desired).await?
    };
    debug!(
        trip_id,
        created_stops = plan.created_stops.len(),
        deletes = plan.deletes.len(),
        updates = plan.updates.len(),
        inserts = plan.inserts.len(),
        unchanged = plan.unchanged,
        "reconciled trip stops"
    );

    apply_plan(conn, trip_id, &plan).await?;
    Ok(plan)
}
