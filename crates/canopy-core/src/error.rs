use rusqlite::ErrorCode as SqliteCode;
use std::fmt;
use std::path::PathBuf;

/// Machine-readable error codes for callers that branch on failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    EntityNotFound,
    RelationNotFound,
    DuplicateId,
    CycleDetected,
    ConstraintViolation,
    GenerationExhausted,
    CorruptStore,
    StoreBusy,
    StorageFailure,
    SchemaTooNew,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::EntityNotFound => "E2001",
            Self::RelationNotFound => "E2006",
            Self::DuplicateId => "E2002",
            Self::CycleDetected => "E2003",
            Self::ConstraintViolation => "E2004",
            Self::GenerationExhausted => "E2005",
            Self::CorruptStore => "E3001",
            Self::StoreBusy => "E3002",
            Self::StorageFailure => "E3003",
            Self::SchemaTooNew => "E3004",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Store not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::EntityNotFound => "Entity not found",
            Self::RelationNotFound => "Relation not found",
            Self::DuplicateId => "Entity ID already in use",
            Self::CycleDetected => "Cycle would be created",
            Self::ConstraintViolation => "Store constraint violated",
            Self::GenerationExhausted => "Could not generate a unique ID",
            Self::CorruptStore => "Corrupt SQLite store",
            Self::StoreBusy => "Store is locked by another writer",
            Self::StorageFailure => "SQLite operation failed",
            Self::SchemaTooNew => "Store schema is newer than this build",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `cnp init` to create the store."),
            Self::ConfigParseError => Some("Fix syntax in .canopy/config.toml and retry."),
            Self::EntityNotFound | Self::RelationNotFound => None,
            Self::DuplicateId => Some("Pick another ID or omit it to get a generated one."),
            Self::CycleDetected => {
                Some("An entity cannot be moved under itself or one of its descendants.")
            }
            Self::ConstraintViolation => {
                Some("See the message for the offending field and adjust the write.")
            }
            Self::GenerationExhausted => {
                Some("Raise short_id_length or short_id_max_attempts in the config.")
            }
            Self::CorruptStore => Some("Restore the store from a backup."),
            Self::StoreBusy => Some("Another process holds the write lock; retry shortly."),
            Self::StorageFailure => Some("Check disk space and permissions of .canopy/."),
            Self::SchemaTooNew => Some("Upgrade cnp to open this store."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failures surfaced by store writes and hierarchy maintenance.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store not found at {}", path.display())]
    NotInitialized { path: PathBuf },

    #[error("failed to parse {}: {reason}", path.display())]
    ConfigParse { path: PathBuf, reason: String },

    #[error("entity not found: '{id}'")]
    EntityNotFound { id: String },

    #[error("relation not found: {relation_id}")]
    RelationNotFound { relation_id: i64 },

    #[error("duplicated entity id '{id}'")]
    DuplicateId { id: String },

    #[error("setting parent of '{entity_id}' to '{parent_id}' would create a cycle")]
    CycleDetected { entity_id: String, parent_id: String },

    #[error("constraint violated on {field} of '{id}': {reason}")]
    ConstraintViolation {
        id: String,
        field: String,
        reason: String,
    },

    #[error("failed to generate a unique short id after {attempts} attempts")]
    GenerationExhausted { attempts: u32 },

    #[error("store schema v{found} is newer than supported v{supported}")]
    SchemaTooNew { found: u32, supported: u32 },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized { .. } => ErrorCode::NotInitialized,
            Self::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Self::EntityNotFound { .. } => ErrorCode::EntityNotFound,
            Self::RelationNotFound { .. } => ErrorCode::RelationNotFound,
            Self::DuplicateId { .. } => ErrorCode::DuplicateId,
            Self::CycleDetected { .. } => ErrorCode::CycleDetected,
            Self::ConstraintViolation { .. } => ErrorCode::ConstraintViolation,
            Self::GenerationExhausted { .. } => ErrorCode::GenerationExhausted,
            Self::SchemaTooNew { .. } => ErrorCode::SchemaTooNew,
            Self::Sqlite(err) => sqlite_code(err),
            Self::Json(_) => ErrorCode::InternalUnexpected,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    pub(crate) fn not_found(id: &str) -> Self {
        Self::EntityNotFound { id: id.to_string() }
    }
}

fn sqlite_code(err: &rusqlite::Error) -> ErrorCode {
    match err.sqlite_error_code() {
        Some(SqliteCode::ConstraintViolation) => ErrorCode::ConstraintViolation,
        Some(SqliteCode::DatabaseBusy | SqliteCode::DatabaseLocked) => ErrorCode::StoreBusy,
        Some(SqliteCode::DatabaseCorrupt | SqliteCode::NotADatabase) => ErrorCode::CorruptStore,
        _ => ErrorCode::StorageFailure,
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Returns `true` when `err` is a SQLite primary-key or unique violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Returns `true` when `err` is a SQLite foreign-key violation.
pub(crate) fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}
