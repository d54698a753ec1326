//! Entity id assignment.

use rand::{Rng, distributions::Alphanumeric};
use rusqlite::Connection;

use crate::db::query::entity_exists;
use crate::error::{StoreError, StoreResult};

/// Source of candidate entity ids.
///
/// Implementations only propose ids; uniqueness is checked by the store.
pub trait IdGenerator: Send + Sync {
    /// Return an id of at most `max_len` characters.
    fn generate(&self, max_len: usize) -> String;
}

impl<F> IdGenerator for F
where
    F: Fn(usize) -> String + Send + Sync,
{
    fn generate(&self, max_len: usize) -> String {
        self(max_len)
    }
}

/// Random alphanumeric ids of exactly `max_len` characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortIdGenerator;

impl IdGenerator for ShortIdGenerator {
    fn generate(&self, max_len: usize) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(max_len)
            .map(char::from)
            .collect()
    }
}

/// Cut `id` to at most `max_len` characters.
#[must_use]
pub fn truncate_id(id: &str, max_len: usize) -> String {
    id.chars().take(max_len).collect()
}

/// Ask `generator` for ids until one is unused, at most `max_attempts` times.
///
/// # Errors
///
/// Returns [`StoreError::GenerationExhausted`] when every candidate collided
/// (or was empty), and SQLite errors from the existence check.
pub fn generate_unique(
    conn: &Connection,
    generator: &dyn IdGenerator,
    max_len: usize,
    max_attempts: u32,
) -> StoreResult<String> {
    for attempt in 1..=max_attempts {
        let candidate = truncate_id(generator.generate(max_len).trim(), max_len);
        if candidate.is_empty() {
            tracing::warn!(attempt, "id generator returned an empty id");
            continue;
        }
        if !entity_exists(conn, &candidate)? {
            return Ok(candidate);
        }
        tracing::warn!(attempt, id = %candidate, "generated id collided, retrying");
    }
    Err(StoreError::GenerationExhausted {
        attempts: max_attempts,
    })
}
