//! Multilingual content fields: `(entity, lang, field) -> text`.

use rusqlite::{
    Connection, Row, Transaction, TransactionBehavior, params, params_from_iter, types::ToSql,
};
use std::fmt::Write as _;

use super::{now_us, timestamp};
use crate::error::{StoreError, StoreResult, is_foreign_key_violation};
use crate::model::content::{Content, ContentSet};

/// Restricts [`contents_of`] to one language and/or a set of fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentFilter {
    pub lang: Option<String>,
    pub fields: Vec<String>,
}

impl ContentFilter {
    #[must_use]
    pub fn lang(lang: impl Into<String>) -> Self {
        Self {
            lang: Some(lang.into()),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }
}

/// Upsert `fields` for `entity_id` in one IMMEDIATE transaction.
///
/// `lang` falls back to `default_lang`. Returns the number of rows written.
///
/// # Errors
///
/// Returns [`StoreError::EntityNotFound`] when the entity does not exist,
/// [`StoreError::ConstraintViolation`] for blank field names, and SQLite
/// errors otherwise. Nothing is written on error.
pub fn upsert_contents<I, F, T>(
    conn: &Connection,
    entity_id: &str,
    fields: I,
    lang: Option<&str>,
    default_lang: &str,
) -> StoreResult<usize>
where
    I: IntoIterator<Item = (F, T)>,
    F: AsRef<str>,
    T: AsRef<str>,
{
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let written = write_contents(&tx, entity_id, fields, lang, default_lang)?;
    tx.commit()?;
    Ok(written)
}

/// Upsert rows on a connection that is already inside a transaction.
pub(crate) fn write_contents<I, F, T>(
    conn: &Connection,
    entity_id: &str,
    fields: I,
    lang: Option<&str>,
    default_lang: &str,
) -> StoreResult<usize>
where
    I: IntoIterator<Item = (F, T)>,
    F: AsRef<str>,
    T: AsRef<str>,
{
    let lang = lang
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
        .unwrap_or(default_lang);
    let now = now_us();

    let mut stmt = conn.prepare_cached(
        "INSERT INTO entities_contents (entity_id, lang, field, text, created_at_us, updated_at_us)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT (entity_id, lang, field)
         DO UPDATE SET text = excluded.text, updated_at_us = excluded.updated_at_us",
    )?;

    let mut written = 0;
    for (field, text) in fields {
        let field = field.as_ref().trim();
        if field.is_empty() {
            return Err(StoreError::ConstraintViolation {
                id: entity_id.to_string(),
                field: "field".to_string(),
                reason: "content field names must not be blank".to_string(),
            });
        }
        stmt.execute(params![entity_id, lang, field, text.as_ref(), now])
            .map_err(|err| {
                if is_foreign_key_violation(&err) {
                    StoreError::not_found(entity_id)
                } else {
                    StoreError::from(err)
                }
            })?;
        written += 1;
    }

    tracing::debug!(entity_id, lang, written, "upserted contents");
    Ok(written)
}

fn row_to_content(row: &Row<'_>) -> rusqlite::Result<Content> {
    Ok(Content {
        content_id: row.get(0)?,
        entity_id: row.get(1)?,
        lang: row.get(2)?,
        field: row.get(3)?,
        text: row.get(4)?,
        created_at: timestamp(row.get(5)?),
        updated_at: timestamp(row.get(6)?),
    })
}

/// Content rows of `entity_id`, ordered by language then field.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn contents_of(
    conn: &Connection,
    entity_id: &str,
    filter: &ContentFilter,
) -> StoreResult<ContentSet> {
    let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(entity_id.to_string())];
    let mut sql = String::from(
        "SELECT content_id, entity_id, lang, field, text, created_at_us, updated_at_us \
         FROM entities_contents WHERE entity_id = ?1",
    );

    if let Some(lang) = &filter.lang {
        params.push(Box::new(lang.clone()));
        let _ = write!(sql, " AND lang = ?{}", params.len());
    }

    if !filter.fields.is_empty() {
        let mut placeholders = Vec::with_capacity(filter.fields.len());
        for field in &filter.fields {
            params.push(Box::new(field.clone()));
            placeholders.push(format!("?{}", params.len()));
        }
        let _ = write!(sql, " AND field IN ({})", placeholders.join(", "));
    }
    sql.push_str(" ORDER BY lang ASC, field ASC");

    let mut stmt = conn.prepare(&sql)?;
    let refs: Vec<&dyn ToSql> = params.iter().map(AsRef::as_ref).collect();
    let rows = stmt.query_map(params_from_iter(refs), row_to_content)?;
    Ok(ContentSet::new(rows.collect::<Result<Vec<_>, _>>()?))
}
