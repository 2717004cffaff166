//! Identity resolution and column classification.
//!
//! The aggregate hash says whether a table changed; this module works out
//! what changed by comparing each desired column with its tracked record.

use crate::error::{Error, Result};
use crate::schema::{Column, Table};
use crate::tracking::{ColumnDelta, TrackingColumn, TrackingSnapshot, TrackingTable};
use std::collections::HashMap;
use tracing::debug;

/// How a desired table maps onto the tracking store.
#[derive(Debug, Clone, Copy)]
pub enum TableIdentity<'a> {
    /// Not tracked yet.
    New,
    /// Tracked under its current name.
    Existing(&'a TrackingTable),
    /// Tracked under a name from its rename history.
    Renamed(&'a TrackingTable),
}

impl<'a> TableIdentity<'a> {
    /// The tracked record, if any.
    pub fn tracked(&self) -> Option<&'a TrackingTable> {
        match self {
            TableIdentity::New => None,
            TableIdentity::Existing(t) | TableIdentity::Renamed(t) => Some(t),
        }
    }
}

/// Locate the tracked record for `table`.
///
/// The current name is tried first, then the rename history from the most
/// recent entry back. A declared rename whose internal id disagrees with the
/// tracking store is an error; renames are never inferred.
pub fn resolve_identity<'a>(table: &Table, snapshot: &'a TrackingSnapshot) -> Result<TableIdentity<'a>> {
    if let Some(tracked) = snapshot.find_by_name(&table.name) {
        return Ok(TableIdentity::Existing(tracked));
    }

    // Rename history only ever refers to tables that existed before this run.
    for rename in table.renames.iter().rev() {
        if let Some(tracked) = snapshot
            .loaded_tables()
            .find(|t| t.name == rename.previous_name)
        {
            if tracked.internal_id != rename.internal_id {
                return Err(Error::table_rename(
                    &table.name,
                    format!(
                        "'{}' is tracked with id {} but the rename declares id {}",
                        rename.previous_name, tracked.internal_id, rename.internal_id
                    ),
                ));
            }
            debug!(
                table = %table.name,
                previous = %rename.previous_name,
                internal_id = tracked.internal_id,
                "resolved table through rename history"
            );
            return Ok(TableIdentity::Renamed(tracked));
        }
    }

    for rename in &table.renames {
        if let Some(tracked) = snapshot
            .find_by_id(rename.internal_id)
            .filter(|t| snapshot.is_loaded(t))
        {
            return Err(Error::table_rename(
                &table.name,
                format!(
                    "id {} is tracked as '{}', which is not in the rename history",
                    rename.internal_id, tracked.name
                ),
            ));
        }
    }

    if let Some(rename) = table.renames.last() {
        if snapshot.loaded_tables().next().is_some() {
            return Err(Error::table_rename(
                &table.name,
                format!(
                    "id {} ('{}') is not in the tracking store",
                    rename.internal_id, rename.previous_name
                ),
            ));
        }
    }

    Ok(TableIdentity::New)
}

/// Classification of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnChangeKind {
    /// Same name, same hash, version not bumped.
    Unchanged,
    /// Not tracked.
    Added,
    /// Same name, changed hash or bumped version.
    Modified,
    /// Found through the column's rename history.
    Renamed,
    /// Tracked but no longer declared.
    Removed,
}

impl std::fmt::Display for ColumnChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnChangeKind::Unchanged => write!(f, "unchanged"),
            ColumnChangeKind::Added => write!(f, "added"),
            ColumnChangeKind::Modified => write!(f, "modified"),
            ColumnChangeKind::Renamed => write!(f, "renamed"),
            ColumnChangeKind::Removed => write!(f, "removed"),
        }
    }
}

/// A classified column.
#[derive(Debug, Clone)]
pub struct ColumnChange {
    /// Desired column name; the tracked name for removed columns.
    pub name: String,
    /// Classification.
    pub kind: ColumnChangeKind,
    /// The tracked column this one replaces.
    pub previous: Option<TrackingColumn>,
    /// Attribute differences against `previous`.
    pub delta: ColumnDelta,
    /// Whether a version bump forced the change.
    pub forced: bool,
}

impl ColumnChange {
    /// Check if anything about the column changes.
    pub fn is_change(&self) -> bool {
        self.kind != ColumnChangeKind::Unchanged
    }
}

impl std::fmt::Display for ColumnChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.kind, &self.previous) {
            (ColumnChangeKind::Renamed, Some(previous)) => {
                write!(f, "{} renamed from {}", self.name, previous.name)
            }
            (ColumnChangeKind::Modified, _) if self.forced => {
                write!(f, "{} modified (version)", self.name)
            }
            _ => write!(f, "{} {}", self.name, self.kind),
        }
    }
}

fn claim<'t>(
    claims: &mut HashMap<&'t str, &'t str>,
    table: &Table,
    tracked: &'t TrackingColumn,
    column: &'t Column,
) -> Result<()> {
    if let Some(other) = claims.insert(tracked.name.as_str(), column.name.as_str()) {
        return Err(Error::column_rename(
            &table.name,
            &column.name,
            format!("tracked column '{}' is already claimed by '{}'", tracked.name, other),
        ));
    }
    Ok(())
}

/// Classify every desired and tracked column, desired columns first in
/// declaration order, then removed columns in tracked order.
pub fn classify_columns(table: &Table, tracked: &TrackingTable) -> Result<Vec<ColumnChange>> {
    let mut claims: HashMap<&str, &str> = HashMap::new();
    let mut changes = Vec::with_capacity(table.columns.len());

    for column in &table.columns {
        let (kind, previous) = match tracked.column(&column.name) {
            Some(previous) => {
                claim(&mut claims, table, previous, column)?;
                let kind = if column.hash() != previous.schema_hash()
                    || column.version > previous.version
                {
                    ColumnChangeKind::Modified
                } else {
                    ColumnChangeKind::Unchanged
                };
                (kind, Some(previous))
            }
            None => match column
                .previous_names
                .iter()
                .rev()
                .find_map(|name| tracked.column(name))
            {
                Some(previous) => {
                    claim(&mut claims, table, previous, column)?;
                    (ColumnChangeKind::Renamed, Some(previous))
                }
                None => (ColumnChangeKind::Added, None),
            },
        };

        let delta = previous.map(|p| p.delta(column)).unwrap_or_default();
        let forced = previous.map_or(false, |p| column.version > p.version);
        debug!(table = %table.name, column = %column.name, kind = %kind, "classified column");

        changes.push(ColumnChange {
            name: column.name.clone(),
            kind,
            previous: previous.cloned(),
            delta,
            forced,
        });
    }

    for previous in &tracked.columns {
        if !claims.contains_key(previous.name.as_str()) {
            debug!(table = %table.name, column = %previous.name, "column no longer declared");
            changes.push(ColumnChange {
                name: previous.name.clone(),
                kind: ColumnChangeKind::Removed,
                previous: Some(previous.clone()),
                delta: ColumnDelta::default(),
                forced: false,
            });
        }
    }

    Ok(changes)
}
