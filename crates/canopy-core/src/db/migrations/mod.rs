//! Schema versioning for the entity store.
//!
//! The version lives in `PRAGMA user_version` and is mirrored into
//! `store_meta.schema_version`. A store stamped with a version above
//! [`LATEST_SCHEMA_VERSION`] is refused rather than written to.

use super::{now_us, schema};
use crate::error::{StoreError, StoreResult};
use rusqlite::{Connection, TransactionBehavior, params, types::Type};

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 1;

struct SchemaStep {
    version: u32,
    sql: &'static str,
}

const STEPS: &[SchemaStep] = &[SchemaStep {
    version: 1,
    sql: schema::SCHEMA_V1_SQL,
}];

/// Schema version recorded in `PRAGMA user_version` (0 for a blank file).
///
/// # Errors
///
/// Returns an error if the pragma cannot be read or holds a negative value.
pub fn schema_version(conn: &Connection) -> StoreResult<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(err)).into()
    })
}

/// Bring the store up to [`LATEST_SCHEMA_VERSION`].
///
/// Pending steps run together in one IMMEDIATE transaction, so a store is
/// never left between versions.
///
/// # Errors
///
/// - [`StoreError::SchemaTooNew`] when the file was written by a newer build
/// - [`StoreError::Sqlite`] when a step fails; nothing is applied
pub fn migrate(conn: &mut Connection) -> StoreResult<u32> {
    let found = schema_version(conn)?;
    if found > LATEST_SCHEMA_VERSION {
        return Err(StoreError::SchemaTooNew {
            found,
            supported: LATEST_SCHEMA_VERSION,
        });
    }
    if found == LATEST_SCHEMA_VERSION {
        return Ok(found);
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    for step in STEPS.iter().filter(|step| step.version > found) {
        tx.execute_batch(step.sql)?;
    }
    tx.pragma_update(None, "user_version", i64::from(LATEST_SCHEMA_VERSION))?;
    tx.execute(
        "UPDATE store_meta SET schema_version = ?1 WHERE id = 1",
        params![i64::from(LATEST_SCHEMA_VERSION)],
    )?;
    if found == 0 {
        tx.execute(
            "UPDATE store_meta SET created_at_us = ?1 WHERE id = 1",
            params![now_us()],
        )?;
    }
    tx.commit()?;

    tracing::info!(from = found, to = LATEST_SCHEMA_VERSION, "migrated store schema");
    Ok(LATEST_SCHEMA_VERSION)
}

#[cfg(test)]
mod tests {
    use super::{LATEST_SCHEMA_VERSION, migrate, schema_version};
    use crate::db::schema::REQUIRED_INDEXES;
    use crate::error::{ErrorCode, StoreError};
    use rusqlite::{Connection, params};

    fn exists(conn: &Connection, kind: &str, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2)",
            params![kind, name],
            |row| row.get(0),
        )
        .expect("sqlite_master")
    }

    #[test]
    fn blank_file_gets_full_schema() {
        let mut conn = Connection::open_in_memory().expect("open");
        assert_eq!(schema_version(&conn).expect("version"), 0);

        assert_eq!(migrate(&mut conn).expect("migrate"), LATEST_SCHEMA_VERSION);
        assert_eq!(schema_version(&conn).expect("version"), LATEST_SCHEMA_VERSION);

        for table in [
            "entities",
            "entities_contents",
            "entities_relations",
            "entities_archives",
            "store_meta",
        ] {
            assert!(exists(&conn, "table", table), "missing table {table}");
        }
        for index in REQUIRED_INDEXES {
            assert!(exists(&conn, "index", index), "missing index {index}");
        }

        let (version, created): (i64, i64) = conn
            .query_row(
                "SELECT schema_version, created_at_us FROM store_meta WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("meta row");
        assert_eq!(version, i64::from(LATEST_SCHEMA_VERSION));
        assert!(created > 0, "fresh stores record their creation time");
    }

    #[test]
    fn rerun_keeps_rows_and_meta() {
        let mut conn = Connection::open_in_memory().expect("open");
        migrate(&mut conn).expect("first");
        conn.execute(
            "INSERT INTO entities (id, created_at_us, updated_at_us) VALUES ('home', 1, 1)",
            [],
        )
        .expect("insert");

        assert_eq!(migrate(&mut conn).expect("second"), LATEST_SCHEMA_VERSION);

        let (entities, meta): (i64, i64) = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM entities), (SELECT COUNT(*) FROM store_meta)",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("counts");
        assert_eq!((entities, meta), (1, 1));
    }

    #[test]
    fn newer_schema_is_refused() {
        let mut conn = Connection::open_in_memory().expect("open");
        conn.pragma_update(None, "user_version", i64::from(LATEST_SCHEMA_VERSION) + 1)
            .expect("stamp");

        let err = migrate(&mut conn).expect_err("newer store");
        assert!(matches!(err, StoreError::SchemaTooNew { found, .. } if found == LATEST_SCHEMA_VERSION + 1));
        assert_eq!(err.code(), ErrorCode::SchemaTooNew);
        assert!(!exists(&conn, "table", "entities"), "nothing may be written");
    }
}
