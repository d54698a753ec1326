//! Entity lifecycle: creation defaults, id assignment, moves, deletes and
//! lifecycle events.
//!
//! Every mutation runs in one `BEGIN IMMEDIATE` transaction that covers the
//! row write and, when the parent changes, the full closure rebuild. Events
//! are delivered outside the transaction: pre-write events before it opens,
//! post-write events after it commits.

use anyhow::Context as _;
use chrono::Utc;
use rusqlite::{Connection, Transaction, TransactionBehavior, params};
use std::path::Path;

use crate::archive::{self, Archive};
use crate::config::{self, StoreConfig};
use crate::db::content::{self, ContentFilter};
use crate::db::query::{self, EntityFilter};
use crate::db::relation;
use crate::db::{self, now_us, to_us};
use crate::error::{StoreError, StoreResult, is_foreign_key_violation, is_unique_violation};
use crate::events::{EntityListener, EventKind, Listeners};
use crate::graph::hierarchy::{self, RefreshStats};
use crate::ids::{self, IdGenerator, ShortIdGenerator};
use crate::model::content::ContentSet;
use crate::model::entity::{Entity, EntityPatch, NewEntity};
use crate::model::relation::{NewRelation, Relation, RelationPatch};

/// Owns the store connection, configuration, id source and listeners.
pub struct EntityStore {
    conn: Connection,
    config: StoreConfig,
    ids: Box<dyn IdGenerator>,
    listeners: Listeners,
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("config", &self.config)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

impl EntityStore {
    /// Wrap an open, migrated connection.
    #[must_use]
    pub fn new(conn: Connection, config: StoreConfig) -> Self {
        Self {
            conn,
            config,
            ids: Box::new(ShortIdGenerator),
            listeners: Listeners::default(),
        }
    }

    /// Open the store of the project at `project_root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the database cannot be
    /// opened or migrated.
    pub fn open(project_root: &Path) -> anyhow::Result<Self> {
        let config = config::resolve_config(project_root)?;
        let path = config::store_path(project_root);
        let conn = db::open_store(&path)
            .with_context(|| format!("open entity store at {}", path.display()))?;
        Ok(Self::new(conn, config))
    }

    /// A fresh in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn in_memory(config: StoreConfig) -> anyhow::Result<Self> {
        Ok(Self::new(db::open_in_memory()?, config))
    }

    /// Replace the id source.
    #[must_use]
    pub fn with_id_generator(mut self, generator: impl IdGenerator + 'static) -> Self {
        self.ids = Box::new(generator);
        self
    }

    /// Register a lifecycle listener.
    pub fn subscribe(&mut self, listener: impl EntityListener + 'static) {
        self.listeners.register(listener);
    }

    /// The underlying connection, for the read queries in [`crate::db`] and
    /// [`crate::graph`].
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Fetch a live (not soft-deleted) entity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] if it is missing or deleted.
    pub fn find(&self, id: &str) -> StoreResult<Entity> {
        query::get_entity(&self.conn, id, false)?.ok_or_else(|| StoreError::not_found(id))
    }

    /// Fetch an entity whether or not it is soft-deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] if no row exists.
    pub fn find_with_trashed(&self, id: &str) -> StoreResult<Entity> {
        query::get_entity(&self.conn, id, true)?.ok_or_else(|| StoreError::not_found(id))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self, filter: &EntityFilter) -> StoreResult<Vec<Entity>> {
        query::list_entities(&self.conn, filter, &self.config.default_language)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn contents(&self, id: &str, filter: &ContentFilter) -> StoreResult<ContentSet> {
        content::contents_of(&self.conn, id, filter)
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Create an entity, filling unset attributes with defaults.
    ///
    /// Event order: `saving`, `creating`, write, `created`, `saved`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DuplicateId`] when a provided id is already taken,
    ///   even if it also names an ancestor of the requested parent
    /// - [`StoreError::GenerationExhausted`] when no free id was generated
    /// - [`StoreError::CycleDetected`] when the entity names itself as parent
    /// - [`StoreError::ConstraintViolation`] when the parent does not exist
    pub fn create(&self, new: NewEntity) -> StoreResult<Entity> {
        self.create_inner(new, None::<(std::iter::Empty<(&str, &str)>, Option<&str>)>)
    }

    /// Create an entity and write its contents in the same transaction.
    ///
    /// # Errors
    ///
    /// As [`EntityStore::create`], plus content write failures.
    pub fn create_with_contents<I, F, T>(
        &self,
        new: NewEntity,
        fields: I,
        lang: Option<&str>,
    ) -> StoreResult<Entity>
    where
        I: IntoIterator<Item = (F, T)>,
        F: AsRef<str>,
        T: AsRef<str>,
    {
        self.create_inner(new, Some((fields, lang)))
    }

    fn create_inner<I, F, T>(
        &self,
        new: NewEntity,
        contents: Option<(I, Option<&str>)>,
    ) -> StoreResult<Entity>
    where
        I: IntoIterator<Item = (F, T)>,
        F: AsRef<str>,
        T: AsRef<str>,
    {
        let now = Utc::now();
        let new = new.with_defaults(&self.config.default_model, now);
        let max_len = self.config.id_length();

        let provided = new
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| ids::truncate_id(id, max_len));
        let id = match provided {
            Some(id) => id,
            None => ids::generate_unique(
                &self.conn,
                self.ids.as_ref(),
                max_len,
                self.config.short_id_max_attempts,
            )?,
        };

        let candidate = Entity {
            id,
            model: new.model.unwrap_or_else(|| self.config.default_model.clone()),
            view: new.view,
            props: new.props.unwrap_or_default(),
            langs: new.langs,
            parent_entity_id: new.parent_entity_id,
            published: new.published.unwrap_or(true),
            publish_at: new.publish_at.flatten(),
            unpublish_at: new.unpublish_at.flatten(),
            version: 1,
            version_tree: 1,
            version_relations: 1,
            version_full: 1,
            created_by: new.created_by.clone(),
            updated_by: new.created_by,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.listeners
            .emit(&[EventKind::Saving, EventKind::Creating], &candidate);

        let tx = self.begin()?;
        hierarchy::validate_new_parent(&tx, &candidate.id, candidate.parent_entity_id.as_deref())?;
        insert_entity(&tx, &candidate)?;
        if candidate.parent_entity_id.is_some() {
            hierarchy::refresh_ancestors(&tx, &candidate.id)?;
        }
        if let Some((fields, lang)) = contents {
            content::write_contents(
                &tx,
                &candidate.id,
                fields,
                lang,
                &self.config.default_language,
            )?;
        }
        let created = query::get_entity(&tx, &candidate.id, true)?
            .ok_or_else(|| StoreError::not_found(&candidate.id))?;
        tx.commit()?;

        tracing::info!(
            id = %created.id,
            model = %created.model,
            parent = created.parent_entity_id.as_deref().unwrap_or("-"),
            "created entity"
        );
        self.listeners
            .emit(&[EventKind::Created, EventKind::Saved], &created);
        Ok(created)
    }

    // -----------------------------------------------------------------------
    // Updates and moves
    // -----------------------------------------------------------------------

    /// Apply `patch` to a live entity.
    ///
    /// Bumps `version` and `version_full`. A parent change is validated
    /// before the write and rebuilds the closure of the whole subtree, which
    /// bumps `version_tree` on every rebuilt entity.
    ///
    /// Event order: `saving`, `updating`, write, `updated`, `saved`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::EntityNotFound`] for unknown or deleted ids
    /// - [`StoreError::CycleDetected`] when moving under itself or a descendant
    /// - [`StoreError::ConstraintViolation`] when the new parent is missing
    pub fn update(&self, id: &str, patch: &EntityPatch) -> StoreResult<Entity> {
        let current = self.find(id)?;
        let parent_changed = patch.changes_parent(&current);
        let mut candidate = current.clone();
        patch.apply_to(&mut candidate);

        self.listeners
            .emit(&[EventKind::Saving, EventKind::Updating], &candidate);

        let tx = self.begin()?;
        if parent_changed {
            hierarchy::validate_reparent(&tx, id, candidate.parent_entity_id.as_deref())?;
        }
        tx.execute(
            "UPDATE entities
             SET model = ?2, view = ?3, props = ?4, langs = ?5, parent_entity_id = ?6,
                 published = ?7, publish_at_us = ?8, unpublish_at_us = ?9, updated_by = ?10,
                 version = version + 1, version_full = version_full + 1, updated_at_us = ?11
             WHERE id = ?1",
            params![
                id,
                candidate.model,
                candidate.view,
                serde_json::to_string(&candidate.props)?,
                serde_json::to_string(&candidate.langs)?,
                candidate.parent_entity_id,
                candidate.published,
                to_us(candidate.publish_at),
                to_us(candidate.unpublish_at),
                candidate.updated_by,
                now_us(),
            ],
        )?;
        if parent_changed {
            let stats = hierarchy::refresh_ancestors(&tx, id)?;
            bump_tree_versions(&tx, &stats)?;
            tracing::info!(
                id,
                from = current.parent_entity_id.as_deref().unwrap_or("-"),
                to = candidate.parent_entity_id.as_deref().unwrap_or("-"),
                subtree = stats.refreshed.len(),
                "moved entity"
            );
        }
        let updated =
            query::get_entity(&tx, id, true)?.ok_or_else(|| StoreError::not_found(id))?;
        tx.commit()?;

        self.listeners
            .emit(&[EventKind::Updated, EventKind::Saved], &updated);
        Ok(updated)
    }

    /// Set or clear the parent of `id`.
    ///
    /// # Errors
    ///
    /// As [`EntityStore::update`].
    pub fn move_entity(&self, id: &str, new_parent: Option<&str>) -> StoreResult<Entity> {
        let patch = EntityPatch {
            parent_entity_id: Some(new_parent.map(str::to_string)),
            ..EntityPatch::default()
        };
        self.update(id, &patch)
    }

    /// Read-modify-write of a single prop path.
    ///
    /// # Errors
    ///
    /// As [`EntityStore::update`].
    pub fn set_prop(&self, id: &str, path: &str, value: serde_json::Value) -> StoreResult<Entity> {
        let mut entity = self.find(id)?;
        entity.set_prop(path, value);
        let patch = EntityPatch {
            props: Some(entity.props),
            ..EntityPatch::default()
        };
        self.update(id, &patch)
    }

    // -----------------------------------------------------------------------
    // Deletion
    // -----------------------------------------------------------------------

    /// Soft-delete: hide the entity from reads, keep rows and edges.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] for unknown or deleted ids.
    pub fn delete(&self, id: &str) -> StoreResult<Entity> {
        let current = self.find(id)?;
        self.listeners.emit(&[EventKind::Deleting], &current);

        let now = now_us();
        self.conn.execute(
            "UPDATE entities SET deleted_at_us = ?2, updated_at_us = ?2 WHERE id = ?1",
            params![id, now],
        )?;
        let deleted = self.find_with_trashed(id)?;

        tracing::info!(id, "soft-deleted entity");
        self.listeners.emit(&[EventKind::Deleted], &deleted);
        Ok(deleted)
    }

    /// Undo a soft delete. Restoring a live entity is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] if no row exists.
    pub fn restore(&self, id: &str) -> StoreResult<Entity> {
        let current = self.find_with_trashed(id)?;
        if !current.is_trashed() {
            return Ok(current);
        }
        self.listeners.emit(&[EventKind::Restoring], &current);

        self.conn.execute(
            "UPDATE entities SET deleted_at_us = NULL, updated_at_us = ?2 WHERE id = ?1",
            params![id, now_us()],
        )?;
        let restored = self.find(id)?;

        tracing::info!(id, "restored entity");
        self.listeners.emit(&[EventKind::Restored], &restored);
        Ok(restored)
    }

    /// Remove the entity row for good.
    ///
    /// Fails while non-closure relations point at the entity. Otherwise its
    /// contents and outgoing relations go with it, its children become roots
    /// and their subtrees get a fresh closure.
    ///
    /// # Errors
    ///
    /// - [`StoreError::EntityNotFound`] if no row exists
    /// - [`StoreError::ConstraintViolation`] while incoming relations remain
    pub fn force_delete(&self, id: &str) -> StoreResult<Entity> {
        let current = self.find_with_trashed(id)?;
        self.listeners.emit(&[EventKind::Deleting], &current);

        let tx = self.begin()?;
        let incoming: i64 = tx.query_row(
            "SELECT COUNT(*) FROM entities_relations
             WHERE called_entity_id = ?1 AND kind <> 'ancestor'",
            params![id],
            |row| row.get(0),
        )?;
        if incoming > 0 {
            return Err(StoreError::ConstraintViolation {
                id: id.to_string(),
                field: "called_entity_id".to_string(),
                reason: format!("{incoming} relation(s) still point at this entity"),
            });
        }

        let children: Vec<String> = {
            let mut stmt =
                tx.prepare("SELECT id FROM entities WHERE parent_entity_id = ?1 ORDER BY id")?;
            let rows = stmt.query_map(params![id], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        tx.execute(
            "DELETE FROM entities_relations WHERE called_entity_id = ?1 AND kind = 'ancestor'",
            params![id],
        )?;
        tx.execute("DELETE FROM entities WHERE id = ?1", params![id])
            .map_err(|err| {
                if is_foreign_key_violation(&err) {
                    StoreError::ConstraintViolation {
                        id: id.to_string(),
                        field: "called_entity_id".to_string(),
                        reason: "entity is still referenced".to_string(),
                    }
                } else {
                    StoreError::from(err)
                }
            })?;

        for child in &children {
            let stats = hierarchy::refresh_ancestors(&tx, child)?;
            bump_tree_versions(&tx, &stats)?;
        }
        tx.commit()?;

        tracing::info!(id, orphaned = children.len(), "hard-deleted entity");
        self.listeners.emit(&[EventKind::Deleted], &current);
        Ok(current)
    }

    // -----------------------------------------------------------------------
    // Contents, relations, archives
    // -----------------------------------------------------------------------

    /// Upsert contents; `lang` defaults to the configured language.
    ///
    /// # Errors
    ///
    /// See [`content::upsert_contents`].
    pub fn upsert_contents<I, F, T>(&self, id: &str, fields: I, lang: Option<&str>) -> StoreResult<usize>
    where
        I: IntoIterator<Item = (F, T)>,
        F: AsRef<str>,
        T: AsRef<str>,
    {
        content::upsert_contents(&self.conn, id, fields, lang, &self.config.default_language)
    }

    /// # Errors
    ///
    /// See [`relation::create_relation`].
    pub fn relate(&self, new: &NewRelation) -> StoreResult<Relation> {
        relation::create_relation(&self.conn, new)
    }

    /// # Errors
    ///
    /// See [`relation::update_relation_meta`].
    pub fn update_relation(&self, relation_id: i64, patch: &RelationPatch) -> StoreResult<Relation> {
        relation::update_relation_meta(&self.conn, relation_id, patch)
    }

    /// # Errors
    ///
    /// See [`relation::delete_relation`].
    pub fn unrelate(&self, relation_id: i64) -> StoreResult<Relation> {
        relation::delete_relation(&self.conn, relation_id)
    }

    /// # Errors
    ///
    /// See [`archive::archive_entity`].
    pub fn archive(&self, id: &str, kind: Option<&str>, by: Option<&str>) -> StoreResult<Archive> {
        archive::archive_entity(&self.conn, id, kind, by)
    }

    fn begin(&self) -> StoreResult<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }
}

fn insert_entity(conn: &Connection, entity: &Entity) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO entities
            (id, model, view, props, langs, parent_entity_id, published,
             publish_at_us, unpublish_at_us, created_by, updated_by,
             created_at_us, updated_at_us)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
        params![
            entity.id,
            entity.model,
            entity.view,
            serde_json::to_string(&entity.props)?,
            serde_json::to_string(&entity.langs)?,
            entity.parent_entity_id,
            entity.published,
            to_us(entity.publish_at),
            to_us(entity.unpublish_at),
            entity.created_by,
            entity.updated_by,
            entity.created_at.timestamp_micros(),
        ],
    )
    .map_err(|err| {
        if is_unique_violation(&err) {
            StoreError::DuplicateId {
                id: entity.id.clone(),
            }
        } else if is_foreign_key_violation(&err) {
            StoreError::ConstraintViolation {
                id: entity.id.clone(),
                field: "parent_entity_id".to_string(),
                reason: "parent does not exist".to_string(),
            }
        } else {
            StoreError::from(err)
        }
    })?;
    Ok(())
}

fn bump_tree_versions(conn: &Connection, stats: &RefreshStats) -> StoreResult<()> {
    let mut stmt =
        conn.prepare_cached("UPDATE entities SET version_tree = version_tree + 1 WHERE id = ?1")?;
    for id in &stats.refreshed {
        stmt.execute(params![id])?;
    }
    Ok(())
}
