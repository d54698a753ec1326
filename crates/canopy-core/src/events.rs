//! Synchronous lifecycle notifications.
//!
//! Pre-write events (`Saving`, `Creating`, `Updating`, `Deleting`,
//! `Restoring`) fire before the write transaction opens and carry the entity
//! as it is about to be written. Post-write events fire after commit with the
//! stored row. Listeners observe; they cannot veto or alter a write.

use serde::Serialize;
use std::fmt;

use crate::model::entity::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Creating,
    Created,
    Saving,
    Saved,
    Updating,
    Updated,
    Deleting,
    Deleted,
    Restoring,
    Restored,
}

impl EventKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Created => "created",
            Self::Saving => "saving",
            Self::Saved => "saved",
            Self::Updating => "updating",
            Self::Updated => "updated",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Restoring => "restoring",
            Self::Restored => "restored",
        }
    }

    /// Returns `true` for events emitted before the write.
    #[must_use]
    pub const fn is_pre_write(self) -> bool {
        matches!(
            self,
            Self::Creating | Self::Saving | Self::Updating | Self::Deleting | Self::Restoring
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives lifecycle events from [`crate::store::EntityStore`].
pub trait EntityListener: Send + Sync {
    fn on_event(&self, kind: EventKind, entity: &Entity);
}

impl<F> EntityListener for F
where
    F: Fn(EventKind, &Entity) + Send + Sync,
{
    fn on_event(&self, kind: EventKind, entity: &Entity) {
        self(kind, entity);
    }
}

/// Registered listeners, notified in registration order.
#[derive(Default)]
pub struct Listeners {
    inner: Vec<Box<dyn EntityListener>>,
}

impl Listeners {
    pub fn register(&mut self, listener: impl EntityListener + 'static) {
        self.inner.push(Box::new(listener));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Deliver each of `kinds`, in order, to every listener.
    pub fn emit(&self, kinds: &[EventKind], entity: &Entity) {
        for &kind in kinds {
            tracing::trace!(event = %kind, entity_id = %entity.id, "entity event");
            for listener in &self.inner {
                listener.on_event(kind, entity);
            }
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.inner.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn entity() -> Entity {
        let now = Utc::now();
        Entity {
            id: "e".into(),
            model: "Entity".into(),
            view: None,
            props: json!({}),
            langs: vec![],
            parent_entity_id: None,
            published: true,
            publish_at: None,
            unpublish_at: None,
            version: 1,
            version_tree: 1,
            version_relations: 1,
            version_full: 1,
            created_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn closures_receive_events_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut listeners = Listeners::default();
        listeners.register(move |kind: EventKind, e: &Entity| {
            sink.lock().expect("lock").push(format!("{kind}:{}", e.id));
        });

        listeners.emit(&[EventKind::Saving, EventKind::Creating], &entity());
        assert_eq!(
            *seen.lock().expect("lock"),
            vec!["saving:e".to_string(), "creating:e".to_string()]
        );
    }

    #[test]
    fn pre_write_classification() {
        assert!(EventKind::Creating.is_pre_write());
        assert!(EventKind::Restoring.is_pre_write());
        assert!(!EventKind::Saved.is_pre_write());
        assert!(!EventKind::Deleted.is_pre_write());
    }
}
