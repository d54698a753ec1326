//! Entity reads and relation traversal.
//!
//! Every function takes a shared `&Connection` and returns typed rows. Relation
//! queries join `entities e` against `entities_relations r`; the edge columns
//! are always selected and only attached to the result when the caller asks
//! for relation metadata.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter, types::ToSql};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::str::FromStr;

use super::{from_us, json_column, json_column_or_default, timestamp, to_us};
use crate::error::StoreResult;
use crate::model::entity::Entity;
use crate::model::relation::RelationMeta;

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Entity columns in [`row_to_entity`] order, qualified with the `e` alias.
pub(crate) const ENTITY_COLUMNS: &str = "e.id, e.model, e.view, e.props, e.langs, \
     e.parent_entity_id, e.published, e.publish_at_us, e.unpublish_at_us, \
     e.version, e.version_tree, e.version_relations, e.version_full, \
     e.created_by, e.updated_by, e.created_at_us, e.updated_at_us, e.deleted_at_us";

const ENTITY_COLUMN_COUNT: usize = 18;

/// Relation columns appended after [`ENTITY_COLUMNS`], qualified with `r`.
pub(crate) const META_COLUMNS: &str = "r.relation_id, r.kind, r.position, r.depth, r.tags";

/// Map a row selected with [`ENTITY_COLUMNS`] into an [`Entity`].
pub(crate) fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<Entity> {
    Ok(Entity {
        id: row.get(0)?,
        model: row.get(1)?,
        view: row.get(2)?,
        props: json_column(row, 3)?,
        langs: json_column_or_default(row, 4)?,
        parent_entity_id: row.get(5)?,
        published: row.get(6)?,
        publish_at: from_us(row.get(7)?),
        unpublish_at: from_us(row.get(8)?),
        version: row.get(9)?,
        version_tree: row.get(10)?,
        version_relations: row.get(11)?,
        version_full: row.get(12)?,
        created_by: row.get(13)?,
        updated_by: row.get(14)?,
        created_at: timestamp(row.get(15)?),
        updated_at: timestamp(row.get(16)?),
        deleted_at: from_us(row.get(17)?),
    })
}

/// Map a row selected with `ENTITY_COLUMNS, META_COLUMNS`.
///
/// The relation id may be NULL (self rows, left joins); metadata is then
/// absent regardless of `include_meta`.
pub(crate) fn row_to_entity_row(row: &Row<'_>, include_meta: bool) -> rusqlite::Result<EntityRow> {
    let entity = row_to_entity(row)?;
    if !include_meta {
        return Ok(EntityRow::bare(entity));
    }

    let base = ENTITY_COLUMN_COUNT;
    let relation_id: Option<i64> = row.get(base)?;
    let relation = match relation_id {
        Some(relation_id) => Some(RelationMeta {
            relation_id,
            kind: row.get(base + 1)?,
            position: row.get(base + 2)?,
            depth: row.get(base + 3)?,
            tags: json_column_or_default(row, base + 4)?,
        }),
        None => None,
    };
    Ok(EntityRow { entity, relation })
}

/// An entity returned by a relation query, optionally with edge metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRow {
    #[serde(flatten)]
    pub entity: Entity,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub relation: Option<RelationMeta>,
}

impl EntityRow {
    #[must_use]
    pub const fn bare(entity: Entity) -> Self {
        Self {
            entity,
            relation: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.entity.id
    }

    /// Closure depth of the edge, when metadata was requested.
    #[must_use]
    pub fn depth(&self) -> Option<i64> {
        self.relation.as_ref().map(|meta| meta.depth)
    }
}

pub(crate) fn collect_rows(
    conn: &Connection,
    sql: &str,
    params: &[Box<dyn ToSql>],
    include_meta: bool,
) -> StoreResult<Vec<EntityRow>> {
    let mut stmt = conn.prepare(sql)?;
    let refs: Vec<&dyn ToSql> = params.iter().map(AsRef::as_ref).collect();
    let rows = stmt.query_map(params_from_iter(refs), |row| {
        row_to_entity_row(row, include_meta)
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Sort direction shared by every ordered query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub(crate) const fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => f.write_str("asc"),
            Self::Desc => f.write_str("desc"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Asc),
            "desc" | "descending" => Ok(Self::Desc),
            other => Err(format!("unknown direction '{other}': expected asc or desc")),
        }
    }
}

/// Relation column a relation query can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderColumn {
    Depth,
    Position,
}

impl OrderColumn {
    const fn sql(self) -> &'static str {
        match self {
            Self::Depth => "r.depth",
            Self::Position => "r.position",
        }
    }
}

/// Ordering for [`related_by`] and [`relating`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationOrder {
    pub column: OrderColumn,
    pub direction: Direction,
}

impl RelationOrder {
    #[must_use]
    pub const fn new(column: OrderColumn, direction: Direction) -> Self {
        Self { column, direction }
    }

    /// Parse `depth_asc`, `depth asc`, `position desc` or a bare column.
    ///
    /// Returns `None` for anything else.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let normalized = input.trim().to_ascii_lowercase().replace('_', " ");
        let mut parts = normalized.split_whitespace();
        let column = match parts.next()? {
            "depth" => OrderColumn::Depth,
            "position" => OrderColumn::Position,
            _ => return None,
        };
        let direction = match parts.next() {
            None => Direction::Asc,
            Some(raw) => raw.parse().ok()?,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(column, direction))
    }

    fn sql_clause(self) -> String {
        format!(
            "ORDER BY {} {}, e.id ASC",
            self.column.sql(),
            self.direction.sql()
        )
    }
}

impl From<(OrderColumn, Direction)> for RelationOrder {
    fn from((column, direction): (OrderColumn, Direction)) -> Self {
        Self::new(column, direction)
    }
}

// ---------------------------------------------------------------------------
// Relation queries
// ---------------------------------------------------------------------------

/// Options for [`related_by`] and [`relating`].
///
/// `kinds` restricts to the listed kinds, `except_kinds` removes kinds and
/// wins when a kind appears in both. Blank kind strings are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationOptions {
    pub kinds: Vec<String>,
    pub except_kinds: Vec<String>,
    pub tag: Option<String>,
    pub include_relation_meta: bool,
    pub order_by: Option<RelationOrder>,
}

impl RelationOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kinds.push(kind.into());
        self
    }

    #[must_use]
    pub fn kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.kinds.extend(kinds.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn except_kind(mut self, kind: impl Into<String>) -> Self {
        self.except_kinds.push(kind.into());
        self
    }

    #[must_use]
    pub fn except_kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.except_kinds.extend(kinds.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    #[must_use]
    pub const fn with_meta(mut self) -> Self {
        self.include_relation_meta = true;
        self
    }

    #[must_use]
    pub const fn order(mut self, order: RelationOrder) -> Self {
        self.order_by = Some(order);
        self
    }

    /// Order from free text; unrecognized input leaves the order unset.
    #[must_use]
    pub fn order_str(mut self, raw: &str) -> Self {
        match RelationOrder::parse(raw) {
            Some(order) => self.order_by = Some(order),
            None => tracing::debug!(order = raw, "ignoring unrecognized relation order"),
        }
        self
    }
}

fn clean_kinds(kinds: &[String]) -> Vec<String> {
    kinds
        .iter()
        .map(|kind| kind.trim())
        .filter(|kind| !kind.is_empty())
        .map(str::to_string)
        .collect()
}

fn push_in_clause(
    conditions: &mut Vec<String>,
    params: &mut Vec<Box<dyn ToSql>>,
    column: &str,
    negate: bool,
    values: Vec<String>,
) {
    if values.is_empty() {
        return;
    }
    let mut placeholders = Vec::with_capacity(values.len());
    for value in values {
        params.push(Box::new(value));
        placeholders.push(format!("?{}", params.len()));
    }
    let op = if negate { "NOT IN" } else { "IN" };
    conditions.push(format!("{column} {op} ({})", placeholders.join(", ")));
}

/// `EXISTS` test for a tag inside the JSON `tags` array of `alias`.
pub(crate) fn tag_condition(alias: &str, placeholder: usize) -> String {
    format!("EXISTS (SELECT 1 FROM json_each({alias}.tags) WHERE json_each.value = ?{placeholder})")
}

#[derive(Clone, Copy)]
enum Side {
    /// `id` is the caller; return called entities.
    Outgoing,
    /// `id` is the called; return callers.
    Incoming,
}

fn relation_query(
    conn: &Connection,
    id: &str,
    options: &RelationOptions,
    side: Side,
) -> StoreResult<Vec<EntityRow>> {
    let (join_col, anchor_col) = match side {
        Side::Outgoing => ("r.called_entity_id", "r.caller_entity_id"),
        Side::Incoming => ("r.caller_entity_id", "r.called_entity_id"),
    };

    let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(id.to_string())];
    let mut conditions = vec![
        format!("{anchor_col} = ?1"),
        "e.deleted_at_us IS NULL".to_string(),
    ];

    push_in_clause(
        &mut conditions,
        &mut params,
        "r.kind",
        false,
        clean_kinds(&options.kinds),
    );
    push_in_clause(
        &mut conditions,
        &mut params,
        "r.kind",
        true,
        clean_kinds(&options.except_kinds),
    );

    if let Some(tag) = options.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        params.push(Box::new(tag.to_string()));
        conditions.push(tag_condition("r", params.len()));
    }

    let order = options.order_by.map_or_else(
        || "ORDER BY r.position ASC, e.id ASC".to_string(),
        RelationOrder::sql_clause,
    );

    let sql = format!(
        "SELECT {ENTITY_COLUMNS}, {META_COLUMNS} \
         FROM entities e \
         INNER JOIN entities_relations r ON {join_col} = e.id \
         WHERE {} {order}",
        conditions.join(" AND ")
    );

    collect_rows(conn, &sql, &params, options.include_relation_meta)
}

/// Entities that `id` points at (outgoing edges).
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn related_by(
    conn: &Connection,
    id: &str,
    options: &RelationOptions,
) -> StoreResult<Vec<EntityRow>> {
    relation_query(conn, id, options, Side::Outgoing)
}

/// Entities that point at `id` (incoming edges).
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn relating(
    conn: &Connection,
    id: &str,
    options: &RelationOptions,
) -> StoreResult<Vec<EntityRow>> {
    relation_query(conn, id, options, Side::Incoming)
}

// ---------------------------------------------------------------------------
// Entity reads
// ---------------------------------------------------------------------------

/// Fetch one entity. Soft-deleted rows are hidden unless `include_deleted`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_entity(
    conn: &Connection,
    id: &str,
    include_deleted: bool,
) -> StoreResult<Option<Entity>> {
    let filter = if include_deleted {
        ""
    } else {
        " AND e.deleted_at_us IS NULL"
    };
    let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities e WHERE e.id = ?1{filter}");
    Ok(conn
        .query_row(&sql, params![id], row_to_entity)
        .optional()?)
}

/// Returns `true` if a row with `id` exists, deleted or not.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn entity_exists(conn: &Connection, id: &str) -> StoreResult<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM entities WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )?)
}

/// Comparison used by [`ContentMatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentOp {
    Eq,
    Like,
}

impl ContentOp {
    const fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Like => "LIKE",
        }
    }
}

/// Restrict to entities whose `field` content in `lang` matches `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMatch {
    pub field: String,
    pub op: ContentOp,
    pub value: String,
    pub lang: Option<String>,
}

/// Order by the text of `field` in `lang`; entities without it sort as NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentOrder {
    pub field: String,
    pub direction: Direction,
    pub lang: Option<String>,
}

/// Filter criteria for [`list_entities`]. Set fields combine with AND.
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    /// Exact model match.
    pub model: Option<String>,
    /// Exact parent match.
    pub parent_entity_id: Option<String>,
    /// Only entities whose status is live at this instant.
    pub live_at: Option<DateTime<Utc>>,
    pub content_matches: Vec<ContentMatch>,
    pub content_order: Option<ContentOrder>,
    /// Include soft-deleted entities (default: false).
    pub include_deleted: bool,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl EntityFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn of_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn child_of(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_entity_id = Some(parent_id.into());
        self
    }

    #[must_use]
    pub const fn currently_live(mut self, now: DateTime<Utc>) -> Self {
        self.live_at = Some(now);
        self
    }

    #[must_use]
    pub fn order_by_content(
        mut self,
        field: impl Into<String>,
        direction: Direction,
        lang: Option<&str>,
    ) -> Self {
        self.content_order = Some(ContentOrder {
            field: field.into(),
            direction,
            lang: lang.map(str::to_string),
        });
        self
    }

    #[must_use]
    pub fn where_content(
        mut self,
        field: impl Into<String>,
        op: ContentOp,
        value: impl Into<String>,
        lang: Option<&str>,
    ) -> Self {
        self.content_matches.push(ContentMatch {
            field: field.into(),
            op,
            value: value.into(),
            lang: lang.map(str::to_string),
        });
        self
    }

    #[must_use]
    pub const fn include_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// List entities matching `filter`.
///
/// Content matches without a language accept any language; a content order
/// without one sorts by `default_lang`. Without a content order, rows come
/// oldest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_entities(
    conn: &Connection,
    filter: &EntityFilter,
    default_lang: &str,
) -> StoreResult<Vec<Entity>> {
    let mut conditions: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();
    let mut joins = String::new();

    if !filter.include_deleted {
        conditions.push("e.deleted_at_us IS NULL".to_string());
    }

    if let Some(model) = &filter.model {
        params.push(Box::new(model.clone()));
        conditions.push(format!("e.model = ?{}", params.len()));
    }

    if let Some(parent) = &filter.parent_entity_id {
        params.push(Box::new(parent.clone()));
        conditions.push(format!("e.parent_entity_id = ?{}", params.len()));
    }

    if let Some(now) = filter.live_at {
        params.push(Box::new(to_us(Some(now))));
        let at = params.len();
        conditions.push(format!(
            "e.published = 1 AND e.publish_at_us IS NOT NULL AND e.publish_at_us <= ?{at} \
             AND (e.unpublish_at_us IS NULL OR e.unpublish_at_us >= ?{at})"
        ));
    }

    for matcher in &filter.content_matches {
        params.push(Box::new(matcher.field.clone()));
        let field = params.len();
        let lang_clause = match &matcher.lang {
            Some(lang) => {
                params.push(Box::new(lang.clone()));
                format!(" AND c.lang = ?{}", params.len())
            }
            None => String::new(),
        };
        params.push(Box::new(matcher.value.clone()));
        let value = params.len();
        conditions.push(format!(
            "EXISTS (SELECT 1 FROM entities_contents c \
             WHERE c.entity_id = e.id AND c.field = ?{field}{lang_clause} \
             AND c.text {} ?{value})",
            matcher.op.sql()
        ));
    }

    let order = if let Some(order) = &filter.content_order {
        params.push(Box::new(order.field.clone()));
        let field = params.len();
        params.push(Box::new(
            order.lang.clone().unwrap_or_else(|| default_lang.to_string()),
        ));
        let lang = params.len();
        let _ = write!(
            joins,
            " LEFT JOIN entities_contents oc \
             ON oc.entity_id = e.id AND oc.field = ?{field} AND oc.lang = ?{lang}"
        );
        format!("ORDER BY oc.text {}, e.id ASC", order.direction.sql())
    } else {
        "ORDER BY e.created_at_us ASC, e.id ASC".to_string()
    };

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let limit_clause = match (filter.limit, filter.offset) {
        (Some(limit), Some(offset)) => format!(" LIMIT {limit} OFFSET {offset}"),
        (Some(limit), None) => format!(" LIMIT {limit}"),
        (None, Some(offset)) => format!(" LIMIT -1 OFFSET {offset}"),
        (None, None) => String::new(),
    };

    let sql = format!(
        "SELECT {ENTITY_COLUMNS} FROM entities e{joins}{where_clause} {order}{limit_clause}"
    );

    let mut stmt = conn.prepare(&sql)?;
    let refs: Vec<&dyn ToSql> = params.iter().map(AsRef::as_ref).collect();
    let rows = stmt.query_map(params_from_iter(refs), row_to_entity)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
