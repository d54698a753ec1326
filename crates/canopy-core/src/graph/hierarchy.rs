//! Ancestor closure maintenance and hierarchy queries.
//!
//! The tree is stored twice: as `entities.parent_entity_id` pointers and as a
//! closure of `ancestor` edges in `entities_relations`, one edge per
//! (entity, ancestor) pair carrying the distance as `depth`. Writers change
//! the pointer and then call [`refresh_ancestors`]; readers only touch the
//! closure.
//!
//! # Rebuild
//!
//! [`refresh_ancestors`] regenerates the edge set of an entity and of every
//! descendant. It runs as a worklist over an arena mapping each visited id to
//! its ancestor chain, so a child's chain is its parent's chain with the
//! parent prepended and no parent pointer is read twice. The `position` and
//! `tags` of an edge survive the rebuild when its target is still an
//! ancestor.
//!
//! # Cycle prevention
//!
//! [`validate_reparent`] must run before a parent write. The rebuild keeps a
//! visited-set guard anyway and reports [`StoreError::CycleDetected`] rather
//! than looping.

#![allow(clippy::module_name_repetitions)]

use rusqlite::{Connection, OptionalExtension, params, types::ToSql};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Write as _;

use super::cycles::{self, parent_chain};
use crate::db::now_us;
use crate::db::query::{
    Direction, ENTITY_COLUMNS, EntityRow, META_COLUMNS, collect_rows, row_to_entity, tag_condition,
};
use crate::error::{StoreError, StoreResult};
use crate::model::entity::Entity;
use crate::model::relation::ANCESTOR;

/// Default depth limit for [`descendants_of`].
pub const DEFAULT_MAX_DEPTH: u32 = 99;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Options for [`ancestors_of`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AncestorOptions {
    /// Add the entity itself as a depth-0 row without metadata.
    pub include_self: bool,
    pub include_relation_meta: bool,
    /// Depth ordering; `None` leaves the order to the store.
    pub order: Option<Direction>,
}

/// Options for [`descendants_of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescendantOptions {
    pub max_depth: u32,
    pub include_self: bool,
    pub include_relation_meta: bool,
}

impl Default for DescendantOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            include_self: false,
            include_relation_meta: false,
        }
    }
}

/// Options for [`siblings_of`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SiblingOptions {
    pub include_self: bool,
    pub include_relation_meta: bool,
}

// ---------------------------------------------------------------------------
// Closure maintenance
// ---------------------------------------------------------------------------

/// Outcome of a closure rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Entities whose edge set was regenerated, in visiting order.
    pub refreshed: Vec<String>,
    /// Ancestor edges removed before regeneration.
    pub edges_removed: usize,
    /// Ancestor edges written.
    pub edges_written: usize,
}

struct PriorEdge {
    position: i64,
    tags: String,
}

/// Regenerate the ancestor edges of `entity_id` and of all its descendants.
///
/// Run it on the connection that holds the write transaction so the pointer
/// change and the rebuild commit together. Soft-deleted entities are
/// rebuilt too. Re-running against an unchanged tree yields the same edges.
///
/// # Errors
///
/// Returns [`StoreError::EntityNotFound`] if `entity_id` or a parent in its
/// chain is missing and [`StoreError::CycleDetected`] if the parent pointers
/// contain a loop.
pub fn refresh_ancestors(conn: &Connection, entity_id: &str) -> StoreResult<RefreshStats> {
    let mut stats = RefreshStats::default();
    let mut arena: HashMap<String, Vec<String>> = HashMap::new();
    let mut queue: VecDeque<String> = VecDeque::new();

    arena.insert(entity_id.to_string(), parent_chain(conn, entity_id)?);
    queue.push_back(entity_id.to_string());

    let mut children_stmt =
        conn.prepare_cached("SELECT id FROM entities WHERE parent_entity_id = ?1 ORDER BY id")?;

    while let Some(current) = queue.pop_front() {
        let chain = arena.get(&current).cloned().unwrap_or_default();
        let (removed, written) = rewrite_edges(conn, &current, &chain)?;
        stats.edges_removed += removed;
        stats.edges_written += written;

        let children = children_stmt
            .query_map(params![current], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        for child in children {
            if arena.contains_key(&child) {
                return Err(StoreError::CycleDetected {
                    entity_id: child,
                    parent_id: current,
                });
            }
            let mut child_chain = Vec::with_capacity(chain.len() + 1);
            child_chain.push(current.clone());
            child_chain.extend(chain.iter().cloned());
            arena.insert(child.clone(), child_chain);
            queue.push_back(child);
        }

        stats.refreshed.push(current);
    }

    tracing::debug!(
        entity_id,
        refreshed = stats.refreshed.len(),
        removed = stats.edges_removed,
        written = stats.edges_written,
        "rebuilt ancestor closure"
    );
    Ok(stats)
}

fn rewrite_edges(conn: &Connection, entity_id: &str, chain: &[String]) -> StoreResult<(usize, usize)> {
    let mut prior: HashMap<String, PriorEdge> = HashMap::new();
    {
        let mut stmt = conn.prepare_cached(
            "SELECT called_entity_id, position, tags FROM entities_relations
             WHERE caller_entity_id = ?1 AND kind = ?2",
        )?;
        let rows = stmt.query_map(params![entity_id, ANCESTOR], |row| {
            Ok((
                row.get::<_, String>(0)?,
                PriorEdge {
                    position: row.get(1)?,
                    tags: row.get(2)?,
                },
            ))
        })?;
        for row in rows {
            let (called, edge) = row?;
            prior.insert(called, edge);
        }
    }

    let removed = conn.execute(
        "DELETE FROM entities_relations WHERE caller_entity_id = ?1 AND kind = ?2",
        params![entity_id, ANCESTOR],
    )?;

    let now = now_us();
    let mut insert = conn.prepare_cached(
        "INSERT INTO entities_relations
            (caller_entity_id, called_entity_id, kind, position, depth, tags,
             created_at_us, updated_at_us)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
    )?;
    let mut depth: i64 = 0;
    for ancestor in chain {
        depth += 1;
        let (position, tags) = prior
            .get(ancestor)
            .map_or((0, "[]"), |edge| (edge.position, edge.tags.as_str()));
        insert.execute(params![entity_id, ancestor, ANCESTOR, position, depth, tags, now])?;
    }

    Ok((removed, chain.len()))
}

/// Check that `new_parent` may become the parent of `entity_id`.
///
/// `None` (detaching to a root) is always allowed.
///
/// # Errors
///
/// - [`StoreError::CycleDetected`] for self-parenting or a descendant parent
/// - [`StoreError::ConstraintViolation`] on `parent_entity_id` when the
///   parent does not exist
pub fn validate_reparent(
    conn: &Connection,
    entity_id: &str,
    new_parent: Option<&str>,
) -> StoreResult<()> {
    let Some(parent) = new_parent else {
        return Ok(());
    };

    if parent == entity_id {
        return Err(StoreError::CycleDetected {
            entity_id: entity_id.to_string(),
            parent_id: parent.to_string(),
        });
    }

    require_parent(conn, entity_id, parent)?;

    if let Some(cycle) = cycles::would_create_cycle(conn, entity_id, parent)? {
        tracing::debug!(entity_id, parent, %cycle, "rejected reparent");
        return Err(StoreError::CycleDetected {
            entity_id: entity_id.to_string(),
            parent_id: parent.to_string(),
        });
    }

    Ok(())
}

/// Check the id and parent of an entity that is about to be inserted.
///
/// A row that does not exist yet has no descendants, so only self-parenting
/// can form a cycle here.
///
/// # Errors
///
/// - [`StoreError::DuplicateId`] when `entity_id` is taken, deleted rows included
/// - [`StoreError::CycleDetected`] when `new_parent` is `entity_id`
/// - [`StoreError::ConstraintViolation`] when the parent does not exist
pub fn validate_new_parent(
    conn: &Connection,
    entity_id: &str,
    new_parent: Option<&str>,
) -> StoreResult<()> {
    if cycles::parent_pointer(conn, entity_id)?.is_some() {
        return Err(StoreError::DuplicateId {
            id: entity_id.to_string(),
        });
    }
    match new_parent {
        None => Ok(()),
        Some(parent) if parent == entity_id => Err(StoreError::CycleDetected {
            entity_id: entity_id.to_string(),
            parent_id: parent.to_string(),
        }),
        Some(parent) => require_parent(conn, entity_id, parent),
    }
}

fn require_parent(conn: &Connection, entity_id: &str, parent: &str) -> StoreResult<()> {
    if cycles::parent_pointer(conn, parent)?.is_none() {
        return Err(StoreError::ConstraintViolation {
            id: entity_id.to_string(),
            field: "parent_entity_id".to_string(),
            reason: format!("parent '{parent}' does not exist"),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

fn boxed(id: &str) -> Vec<Box<dyn ToSql>> {
    vec![Box::new(id.to_string()), Box::new(ANCESTOR)]
}

/// Direct children of `id` with edge metadata, ordered by position then id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn children_of(conn: &Connection, id: &str, tag: Option<&str>) -> StoreResult<Vec<EntityRow>> {
    let mut params = boxed(id);
    let mut tag_clause = String::new();
    if let Some(tag) = tag.map(str::trim).filter(|t| !t.is_empty()) {
        params.push(Box::new(tag.to_string()));
        tag_clause = format!(" AND {}", tag_condition("r", params.len()));
    }

    let sql = format!(
        "SELECT {ENTITY_COLUMNS}, {META_COLUMNS} \
         FROM entities e \
         INNER JOIN entities_relations r ON r.caller_entity_id = e.id \
         WHERE r.called_entity_id = ?1 AND r.kind = ?2 AND r.depth = 1 \
         AND e.deleted_at_us IS NULL{tag_clause} \
         ORDER BY r.position ASC, e.id ASC"
    );
    collect_rows(conn, &sql, &params, true)
}

/// The parent reached through the depth-1 ancestor edge, if any.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn parent_of(conn: &Connection, id: &str) -> StoreResult<Option<Entity>> {
    let sql = format!(
        "SELECT {ENTITY_COLUMNS} \
         FROM entities e \
         INNER JOIN entities_relations r ON r.called_entity_id = e.id \
         WHERE r.caller_entity_id = ?1 AND r.kind = ?2 AND r.depth = 1 \
         AND e.deleted_at_us IS NULL"
    );
    Ok(conn
        .query_row(&sql, params![id, ANCESTOR], row_to_entity)
        .optional()?)
}

const SELF_ROW_META: &str = "NULL, NULL, NULL, NULL, NULL";

/// All ancestors of `id`.
///
/// Ascending order lists the parent first (and the self row before it);
/// descending lists the root first and the self row last.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn ancestors_of(
    conn: &Connection,
    id: &str,
    options: &AncestorOptions,
) -> StoreResult<Vec<EntityRow>> {
    let mut sql = format!(
        "SELECT {ENTITY_COLUMNS}, {META_COLUMNS}, r.depth AS sort_depth, e.id AS sort_id \
         FROM entities e \
         INNER JOIN entities_relations r ON r.called_entity_id = e.id \
         WHERE r.caller_entity_id = ?1 AND r.kind = ?2 AND e.deleted_at_us IS NULL"
    );
    if options.include_self {
        let _ = write!(
            sql,
            " UNION ALL \
             SELECT {ENTITY_COLUMNS}, {SELF_ROW_META}, 0 AS sort_depth, e.id AS sort_id \
             FROM entities e WHERE e.id = ?1 AND e.deleted_at_us IS NULL"
        );
    }
    if let Some(direction) = options.order {
        let _ = write!(sql, " ORDER BY sort_depth {}, sort_id ASC", direction.sql());
    }

    collect_rows(conn, &sql, &boxed(id), options.include_relation_meta)
}

/// Descendants of `id` down to `max_depth`, ordered by depth, position, id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn descendants_of(
    conn: &Connection,
    id: &str,
    options: &DescendantOptions,
) -> StoreResult<Vec<EntityRow>> {
    let mut params = boxed(id);
    params.push(Box::new(i64::from(options.max_depth)));

    let mut sql = format!(
        "SELECT {ENTITY_COLUMNS}, {META_COLUMNS}, r.depth AS sort_depth, \
         r.position AS sort_position, e.id AS sort_id \
         FROM entities e \
         INNER JOIN entities_relations r ON r.caller_entity_id = e.id \
         WHERE r.called_entity_id = ?1 AND r.kind = ?2 AND r.depth <= ?3 \
         AND e.deleted_at_us IS NULL"
    );
    if options.include_self {
        let _ = write!(
            sql,
            " UNION ALL \
             SELECT {ENTITY_COLUMNS}, {SELF_ROW_META}, 0 AS sort_depth, 0 AS sort_position, e.id AS sort_id \
             FROM entities e WHERE e.id = ?1 AND e.deleted_at_us IS NULL"
        );
    }
    sql.push_str(" ORDER BY sort_depth ASC, sort_position ASC, sort_id ASC");

    collect_rows(conn, &sql, &params, options.include_relation_meta)
}

/// Entities sharing the non-null parent of `id`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn siblings_of(
    conn: &Connection,
    id: &str,
    options: &SiblingOptions,
) -> StoreResult<Vec<EntityRow>> {
    let self_clause = if options.include_self {
        ""
    } else {
        " AND e.id <> ?1"
    };
    let sql = format!(
        "SELECT {ENTITY_COLUMNS}, {META_COLUMNS} \
         FROM entities e \
         LEFT JOIN entities_relations r \
           ON r.caller_entity_id = e.id AND r.kind = ?2 AND r.depth = 1 \
         WHERE e.parent_entity_id = (SELECT parent_entity_id FROM entities WHERE id = ?1) \
         AND e.deleted_at_us IS NULL{self_clause} \
         ORDER BY r.position ASC, e.id ASC"
    );
    collect_rows(conn, &sql, &boxed(id), options.include_relation_meta)
}

/// The farthest live ancestor of `id`; `None` when `id` is itself a root or
/// every ancestor is soft-deleted.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn root_of(conn: &Connection, id: &str) -> StoreResult<Option<Entity>> {
    let sql = format!(
        "SELECT {ENTITY_COLUMNS} \
         FROM entities e \
         INNER JOIN entities_relations r ON r.called_entity_id = e.id \
         WHERE r.caller_entity_id = ?1 AND r.kind = ?2 \
         AND e.deleted_at_us IS NULL \
         ORDER BY r.depth DESC LIMIT 1"
    );
    Ok(conn
        .query_row(&sql, params![id, ANCESTOR], row_to_entity)
        .optional()?)
}

/// Ids in the subtree of `root_id` (itself first), breadth first, following
/// parent pointers rather than the closure. Deleted entities are included.
///
/// # Errors
///
/// Returns an error if a query fails.
pub fn subtree_ids(conn: &Connection, root_id: &str) -> StoreResult<Vec<String>> {
    let mut stmt =
        conn.prepare_cached("SELECT id FROM entities WHERE parent_entity_id = ?1 ORDER BY id")?;
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::from([root_id.to_string()]);
    let mut result = Vec::new();

    while let Some(current) = queue.pop_front() {
        if !visited.insert(current.clone()) {
            continue;
        }
        let children = stmt
            .query_map(params![current], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        queue.extend(children.into_iter().filter(|child| !visited.contains(child)));
        result.push(current);
    }

    Ok(result)
}
