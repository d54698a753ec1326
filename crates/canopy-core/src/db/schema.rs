//! Canonical SQLite schema for the entity store.
//!
//! - `entities` holds one row per node; `parent_entity_id` is the adjacency
//!   pointer the closure is derived from
//! - `entities_contents` stores `(entity, lang, field) -> text`
//! - `entities_relations` stores kind-tagged edges; kind `ancestor` rows are
//!   the materialized closure
//! - `entities_archives` keeps JSON snapshots of entities
//! - `store_meta` tracks the schema version

/// Schema v1: tables, closure indexes and the metadata row.
pub const SCHEMA_V1_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY CHECK (length(id) BETWEEN 1 AND 26),
    model TEXT NOT NULL DEFAULT 'Entity',
    view TEXT,
    props TEXT NOT NULL DEFAULT '{}',
    langs TEXT NOT NULL DEFAULT '[]',
    parent_entity_id TEXT REFERENCES entities(id) ON DELETE SET NULL ON UPDATE CASCADE,
    published INTEGER NOT NULL DEFAULT 1 CHECK (published IN (0, 1)),
    publish_at_us INTEGER,
    unpublish_at_us INTEGER,
    version INTEGER NOT NULL DEFAULT 1,
    version_tree INTEGER NOT NULL DEFAULT 1,
    version_relations INTEGER NOT NULL DEFAULT 1,
    version_full INTEGER NOT NULL DEFAULT 1,
    created_by TEXT,
    updated_by TEXT,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    deleted_at_us INTEGER,
    CHECK (parent_entity_id IS NULL OR parent_entity_id <> id)
);

CREATE TABLE IF NOT EXISTS entities_contents (
    content_id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE ON UPDATE CASCADE,
    lang TEXT NOT NULL CHECK (length(trim(lang)) > 0),
    field TEXT NOT NULL CHECK (length(trim(field)) > 0),
    text TEXT NOT NULL DEFAULT '',
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    UNIQUE (entity_id, lang, field)
);

CREATE TABLE IF NOT EXISTS entities_relations (
    relation_id INTEGER PRIMARY KEY AUTOINCREMENT,
    caller_entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE ON UPDATE CASCADE,
    called_entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE RESTRICT ON UPDATE CASCADE,
    kind TEXT NOT NULL DEFAULT 'relation' CHECK (length(trim(kind)) > 0),
    position INTEGER NOT NULL DEFAULT 0,
    depth INTEGER NOT NULL DEFAULT 0 CHECK (depth >= 0),
    tags TEXT NOT NULL DEFAULT '[]',
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    UNIQUE (caller_entity_id, called_entity_id, kind)
);

CREATE TABLE IF NOT EXISTS entities_archives (
    archive_id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id TEXT REFERENCES entities(id) ON DELETE SET NULL ON UPDATE CASCADE,
    kind TEXT NOT NULL,
    version INTEGER NOT NULL,
    payload TEXT NOT NULL,
    created_by TEXT,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_entities_parent
    ON entities(parent_entity_id);

CREATE INDEX IF NOT EXISTS idx_entities_model
    ON entities(model);

CREATE INDEX IF NOT EXISTS idx_entities_published_window
    ON entities(published, publish_at_us, unpublish_at_us);

CREATE INDEX IF NOT EXISTS idx_relations_caller_kind_depth
    ON entities_relations(caller_entity_id, kind, depth);

CREATE INDEX IF NOT EXISTS idx_relations_called_kind_depth
    ON entities_relations(called_entity_id, kind, depth);

CREATE INDEX IF NOT EXISTS idx_contents_entity_lang
    ON entities_contents(entity_id, lang);

CREATE INDEX IF NOT EXISTS idx_contents_field_lang_text
    ON entities_contents(field, lang, text);

CREATE INDEX IF NOT EXISTS idx_archives_entity
    ON entities_archives(entity_id, created_at_us DESC);

INSERT OR IGNORE INTO store_meta (id, schema_version, created_at_us) VALUES (1, 1, 0);
"#;

/// Indexes expected by hierarchy, relation and content query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_entities_parent",
    "idx_entities_model",
    "idx_entities_published_window",
    "idx_relations_caller_kind_depth",
    "idx_relations_called_kind_depth",
    "idx_contents_entity_lang",
    "idx_contents_field_lang_text",
    "idx_archives_entity",
];
