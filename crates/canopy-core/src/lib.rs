//! canopy-core library.
//!
//! Entities form a tree through `parent_entity_id`. Every entity also keeps
//! one `ancestor` edge per ancestor in `entities_relations`, so hierarchy
//! reads are single joins. [`store::EntityStore`] keeps those edges in step
//! with the parent pointers.

pub mod archive;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod graph;
pub mod ids;
pub mod model;
pub mod store;

pub use error::{ErrorCode, StoreError, StoreResult};
pub use store::EntityStore;

/// # Conventions
///
/// - **Errors**: `StoreResult` for store operations, `anyhow::Result` at the
///   config and file boundaries.
/// - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).
pub fn init() {
    tracing::debug!("canopy-core initialized");
}
