//! JSON snapshots of entities.
//!
//! A snapshot holds the entity row, its contents grouped by language and its
//! outgoing non-closure relations. Snapshots outlive the entity: a hard
//! delete clears `entity_id` but keeps the payload.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::db::content::{ContentFilter, contents_of};
use crate::db::query::get_entity;
use crate::db::relation::{RelationFilter, filter_relations};
use crate::db::{json_column, now_us, timestamp};
use crate::error::{StoreError, StoreResult};

/// Kind recorded when the caller does not name one.
pub const DEFAULT_ARCHIVE_KIND: &str = "snapshot";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Archive {
    pub archive_id: i64,
    pub entity_id: Option<String>,
    pub kind: String,
    /// `version_full` of the entity when the snapshot was taken.
    pub version: i64,
    pub payload: Value,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn row_to_archive(row: &Row<'_>) -> rusqlite::Result<Archive> {
    Ok(Archive {
        archive_id: row.get(0)?,
        entity_id: row.get(1)?,
        kind: row.get(2)?,
        version: row.get(3)?,
        payload: json_column(row, 4)?,
        created_by: row.get(5)?,
        created_at: timestamp(row.get(6)?),
    })
}

/// Store a snapshot of `entity_id`, soft-deleted or not.
///
/// # Errors
///
/// Returns [`StoreError::EntityNotFound`] for unknown ids.
pub fn archive_entity(
    conn: &Connection,
    entity_id: &str,
    kind: Option<&str>,
    created_by: Option<&str>,
) -> StoreResult<Archive> {
    let entity = get_entity(conn, entity_id, true)?.ok_or_else(|| StoreError::not_found(entity_id))?;
    let contents = contents_of(conn, entity_id, &ContentFilter::default())?;
    let relations: Vec<_> = filter_relations(
        conn,
        &RelationFilter {
            caller: Some(entity_id.to_string()),
            ..RelationFilter::default()
        },
    )?
    .into_iter()
    .filter(|relation| !relation.is_ancestor())
    .collect();

    let payload = json!({
        "entity": serde_json::to_value(&entity)?,
        "contents": serde_json::to_value(contents.group_by_lang())?,
        "relations": serde_json::to_value(&relations)?,
    });
    let kind = kind
        .map(str::trim)
        .filter(|kind| !kind.is_empty())
        .unwrap_or(DEFAULT_ARCHIVE_KIND);

    conn.execute(
        "INSERT INTO entities_archives (entity_id, kind, version, payload, created_by, created_at_us)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entity_id,
            kind,
            entity.version_full,
            serde_json::to_string(&payload)?,
            created_by,
            now_us()
        ],
    )?;
    let archive_id = conn.last_insert_rowid();
    tracing::info!(entity_id, archive_id, kind, "archived entity");

    Ok(conn.query_row(
        "SELECT archive_id, entity_id, kind, version, payload, created_by, created_at_us
         FROM entities_archives WHERE archive_id = ?1",
        params![archive_id],
        row_to_archive,
    )?)
}

/// Snapshots of `entity_id`, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn archives_of(conn: &Connection, entity_id: &str) -> StoreResult<Vec<Archive>> {
    let mut stmt = conn.prepare(
        "SELECT archive_id, entity_id, kind, version, payload, created_by, created_at_us
         FROM entities_archives WHERE entity_id = ?1
         ORDER BY created_at_us DESC, archive_id DESC",
    )?;
    let rows = stmt.query_map(params![entity_id], row_to_archive)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
