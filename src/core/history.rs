//! Version/history manager shared by tenders and bids.
//!
//! Every edit and every rollback first appends the entity's current editable
//! fields to its history table (tagged with the pre-change version), then writes
//! the new content with `version + 1`. The content write is a compare-and-swap on
//! the version that was read, so two writers can never both produce `N + 1`.
//!
//! Callers run [`edit`] and [`rollback`] inside one write transaction.

use crate::core::error::TenderError;
use crate::core::time;
use rusqlite::Connection;

/// A partial update; absent fields leave the live value untouched.
pub trait Patch {
    fn is_empty(&self) -> bool;
}

/// An entity with editable fields, a version counter and a history table.
pub trait Versioned: Sized {
    type Patch: Patch;
    /// The editable fields captured in one history row.
    type Snapshot;

    /// Entity name used in messages ("tender", "bid").
    const ENTITY: &'static str;

    fn load(conn: &Connection, id: &str) -> Result<Self, TenderError>;
    fn id(&self) -> &str;
    fn version(&self) -> i64;
    fn set_version(&mut self, version: i64, updated_at: &str);
    fn snapshot(&self) -> Self::Snapshot;
    fn apply(&mut self, patch: &Self::Patch);
    fn restore(&mut self, snapshot: Self::Snapshot);

    fn load_snapshot(
        conn: &Connection,
        id: &str,
        version: i64,
    ) -> Result<Option<Self::Snapshot>, TenderError>;
    fn append_snapshot(
        conn: &Connection,
        id: &str,
        version: i64,
        snapshot: &Self::Snapshot,
        at: &str,
    ) -> Result<(), TenderError>;
    /// Write editable fields and version where the stored version still equals
    /// `expected_version`. Returns the number of rows changed.
    fn store_content(
        &self,
        conn: &Connection,
        expected_version: i64,
    ) -> Result<usize, TenderError>;
}

/// Apply `patch` to the entity as a new version.
pub fn edit<E: Versioned>(conn: &Connection, id: &str, patch: &E::Patch) -> Result<E, TenderError> {
    if patch.is_empty() {
        return Err(TenderError::ValidationError(format!(
            "{} edit must set at least one field",
            E::ENTITY
        )));
    }
    let mut entity = E::load(conn, id)?;
    let prior = entity.version();
    let now = time::now_epoch_z();
    append_prior::<E>(conn, &entity, &now)?;
    entity.apply(patch);
    commit_next_version(conn, &mut entity, prior, &now)?;
    tracing::info!(entity = E::ENTITY, id, version = entity.version(), "edited");
    Ok(entity)
}

/// Restore the editable fields recorded for `target_version` as a new version.
pub fn rollback<E: Versioned>(
    conn: &Connection,
    id: &str,
    target_version: i64,
) -> Result<E, TenderError> {
    let mut entity = E::load(conn, id)?;
    let prior = entity.version();
    check_rollback_target(E::ENTITY, target_version, prior)?;
    let target = E::load_snapshot(conn, id, target_version)?.ok_or_else(|| {
        TenderError::NotFound(format!(
            "{} '{}' has no version {}",
            E::ENTITY,
            id,
            target_version
        ))
    })?;
    let now = time::now_epoch_z();
    append_prior::<E>(conn, &entity, &now)?;
    entity.restore(target);
    commit_next_version(conn, &mut entity, prior, &now)?;
    tracing::info!(
        entity = E::ENTITY,
        id,
        target_version,
        version = entity.version(),
        "rolled back"
    );
    Ok(entity)
}

/// A rollback must name a strictly earlier version than the live one.
pub fn check_rollback_target(
    entity: &str,
    target_version: i64,
    current_version: i64,
) -> Result<(), TenderError> {
    if target_version < 1 || target_version >= current_version {
        return Err(TenderError::ValidationError(format!(
            "{} rollback target {} must be between 1 and {}",
            entity,
            target_version,
            current_version - 1
        )));
    }
    Ok(())
}

/// Record the live fields under the live version. A second row for the same
/// version means another writer already moved the entity on.
fn append_prior<E: Versioned>(conn: &Connection, entity: &E, now: &str) -> Result<(), TenderError> {
    E::append_snapshot(conn, entity.id(), entity.version(), &entity.snapshot(), now).map_err(|e| {
        if e.is_constraint_violation() {
            TenderError::StaleWrite(format!(
                "{} '{}' already has history for version {}",
                E::ENTITY,
                entity.id(),
                entity.version()
            ))
        } else {
            e
        }
    })
}

fn commit_next_version<E: Versioned>(
    conn: &Connection,
    entity: &mut E,
    prior: i64,
    now: &str,
) -> Result<(), TenderError> {
    entity.set_version(prior + 1, now);
    if entity.store_content(conn, prior)? == 0 {
        return Err(TenderError::StaleWrite(format!(
            "{} '{}' moved past version {}",
            E::ENTITY,
            entity.id(),
            prior
        )));
    }
    Ok(())
}
