//! Relation CRUD for non-closure edges.
//!
//! Ancestor edges are owned by [`crate::graph::hierarchy`]: they cannot be
//! created or deleted here, but their `position` and `tags` may be edited so
//! callers can reorder children.

use rusqlite::{
    Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params,
    params_from_iter, types::ToSql,
};
use std::fmt::Write as _;

use super::query::tag_condition;
use super::{json_column_or_default, now_us, timestamp};
use crate::error::{StoreError, StoreResult, is_unique_violation};
use crate::model::relation::{ANCESTOR, NewRelation, Relation, RelationPatch, normalize_tags};

const RELATION_COLUMNS: &str = "relation_id, caller_entity_id, called_entity_id, kind, \
     position, depth, tags, created_at_us, updated_at_us";

fn row_to_relation(row: &Row<'_>) -> rusqlite::Result<Relation> {
    Ok(Relation {
        relation_id: row.get(0)?,
        caller_entity_id: row.get(1)?,
        called_entity_id: row.get(2)?,
        kind: row.get(3)?,
        position: row.get(4)?,
        depth: row.get(5)?,
        tags: json_column_or_default(row, 6)?,
        created_at: timestamp(row.get(7)?),
        updated_at: timestamp(row.get(8)?),
    })
}

/// Fetch a relation by id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_relation(conn: &Connection, relation_id: i64) -> StoreResult<Option<Relation>> {
    let sql = format!("SELECT {RELATION_COLUMNS} FROM entities_relations WHERE relation_id = ?1");
    Ok(conn
        .query_row(&sql, params![relation_id], row_to_relation)
        .optional()?)
}

fn require_relation(conn: &Connection, relation_id: i64) -> StoreResult<Relation> {
    get_relation(conn, relation_id)?.ok_or(StoreError::RelationNotFound { relation_id })
}

fn require_entity(conn: &Connection, id: &str) -> StoreResult<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM entities WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(StoreError::not_found(id))
    }
}

fn reserved_kind(id: &str) -> StoreError {
    StoreError::ConstraintViolation {
        id: id.to_string(),
        field: "kind".to_string(),
        reason: format!("'{ANCESTOR}' edges are maintained by the hierarchy"),
    }
}

/// Bump the relation counters of `caller` after a non-closure edge change.
pub(crate) fn touch_relations_version(conn: &Connection, caller: &str) -> StoreResult<()> {
    conn.execute(
        "UPDATE entities
         SET version_relations = version_relations + 1,
             version_full = version_full + 1,
             updated_at_us = ?2
         WHERE id = ?1",
        params![caller, now_us()],
    )?;
    Ok(())
}

/// Create a non-closure relation.
///
/// # Errors
///
/// - [`StoreError::ConstraintViolation`] for the reserved `ancestor` kind, a
///   negative depth or an existing `(caller, called, kind)` triple
/// - [`StoreError::EntityNotFound`] when either endpoint is missing
pub fn create_relation(conn: &Connection, new: &NewRelation) -> StoreResult<Relation> {
    let caller = new.caller_entity_id.as_str();
    let kind = new.kind.trim();
    if kind.is_empty() {
        return Err(StoreError::ConstraintViolation {
            id: caller.to_string(),
            field: "kind".to_string(),
            reason: "kind must not be empty".to_string(),
        });
    }
    if kind == ANCESTOR {
        return Err(reserved_kind(caller));
    }
    if new.depth < 0 {
        return Err(StoreError::ConstraintViolation {
            id: caller.to_string(),
            field: "depth".to_string(),
            reason: "depth must not be negative".to_string(),
        });
    }

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    require_entity(&tx, caller)?;
    require_entity(&tx, &new.called_entity_id)?;

    let now = now_us();
    let tags = serde_json::to_string(&normalize_tags(new.tags.iter().cloned()))?;
    tx.execute(
        "INSERT INTO entities_relations
            (caller_entity_id, called_entity_id, kind, position, depth, tags,
             created_at_us, updated_at_us)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            caller,
            new.called_entity_id,
            kind,
            new.position,
            new.depth,
            tags,
            now
        ],
    )
    .map_err(|err| {
        if is_unique_violation(&err) {
            StoreError::ConstraintViolation {
                id: caller.to_string(),
                field: "kind".to_string(),
                reason: format!(
                    "relation '{kind}' to '{}' already exists",
                    new.called_entity_id
                ),
            }
        } else {
            StoreError::from(err)
        }
    })?;
    let relation_id = tx.last_insert_rowid();
    touch_relations_version(&tx, caller)?;
    let relation = require_relation(&tx, relation_id)?;
    tx.commit()?;

    tracing::info!(
        relation_id,
        caller,
        called = %relation.called_entity_id,
        kind = %relation.kind,
        "created relation"
    );
    Ok(relation)
}

/// Update position, depth or tags of an edge.
///
/// # Errors
///
/// Returns [`StoreError::RelationNotFound`] for unknown ids and
/// [`StoreError::ConstraintViolation`] when changing the depth of an
/// ancestor edge or setting a negative depth.
pub fn update_relation_meta(
    conn: &Connection,
    relation_id: i64,
    patch: &RelationPatch,
) -> StoreResult<Relation> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let current = require_relation(&tx, relation_id)?;
    if patch.is_empty() {
        return Ok(current);
    }

    if let Some(depth) = patch.depth {
        if current.is_ancestor() && depth != current.depth {
            return Err(StoreError::ConstraintViolation {
                id: current.caller_entity_id,
                field: "depth".to_string(),
                reason: "closure depth is derived from the parent chain".to_string(),
            });
        }
        if depth < 0 {
            return Err(StoreError::ConstraintViolation {
                id: current.caller_entity_id,
                field: "depth".to_string(),
                reason: "depth must not be negative".to_string(),
            });
        }
    }

    let tags = patch
        .tags
        .as_ref()
        .map(|tags| serde_json::to_string(&normalize_tags(tags.iter().cloned())))
        .transpose()?;

    tx.execute(
        "UPDATE entities_relations
         SET position = COALESCE(?2, position),
             depth = COALESCE(?3, depth),
             tags = COALESCE(?4, tags),
             updated_at_us = ?5
         WHERE relation_id = ?1",
        params![relation_id, patch.position, patch.depth, tags, now_us()],
    )?;
    if !current.is_ancestor() {
        touch_relations_version(&tx, &current.caller_entity_id)?;
    }
    let updated = require_relation(&tx, relation_id)?;
    tx.commit()?;

    tracing::debug!(relation_id, "updated relation metadata");
    Ok(updated)
}

/// Delete a non-closure edge. Returns the removed relation.
///
/// # Errors
///
/// Returns [`StoreError::RelationNotFound`] for unknown ids and
/// [`StoreError::ConstraintViolation`] for ancestor edges.
pub fn delete_relation(conn: &Connection, relation_id: i64) -> StoreResult<Relation> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let current = require_relation(&tx, relation_id)?;
    if current.is_ancestor() {
        return Err(reserved_kind(&current.caller_entity_id));
    }
    tx.execute(
        "DELETE FROM entities_relations WHERE relation_id = ?1",
        params![relation_id],
    )?;
    touch_relations_version(&tx, &current.caller_entity_id)?;
    tx.commit()?;

    tracing::info!(relation_id, caller = %current.caller_entity_id, "deleted relation");
    Ok(current)
}

/// Criteria for [`filter_relations`]. Set fields combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationFilter {
    pub caller: Option<String>,
    pub called: Option<String>,
    pub kind: Option<String>,
    pub position: Option<i64>,
    pub depth: Option<i64>,
    pub tag: Option<String>,
}

/// List relations matching `filter`, ordered by caller, kind, position.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn filter_relations(conn: &Connection, filter: &RelationFilter) -> StoreResult<Vec<Relation>> {
    let mut conditions: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    let text_fields = [
        ("r.caller_entity_id", &filter.caller),
        ("r.called_entity_id", &filter.called),
        ("r.kind", &filter.kind),
    ];
    for (column, value) in text_fields {
        if let Some(value) = value {
            params.push(Box::new(value.clone()));
            conditions.push(format!("{column} = ?{}", params.len()));
        }
    }
    for (column, value) in [("r.position", filter.position), ("r.depth", filter.depth)] {
        if let Some(value) = value {
            params.push(Box::new(value));
            conditions.push(format!("{column} = ?{}", params.len()));
        }
    }
    if let Some(tag) = &filter.tag {
        params.push(Box::new(tag.clone()));
        conditions.push(tag_condition("r", params.len()));
    }

    let mut sql = format!("SELECT {RELATION_COLUMNS} FROM entities_relations r");
    if !conditions.is_empty() {
        let _ = write!(sql, " WHERE {}", conditions.join(" AND "));
    }
    sql.push_str(" ORDER BY r.caller_entity_id, r.kind, r.position, r.relation_id");

    let mut stmt = conn.prepare(&sql)?;
    let refs: Vec<&dyn ToSql> = params.iter().map(AsRef::as_ref).collect();
    let rows = stmt.query_map(params_from_iter(refs), row_to_relation)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
