use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::props;
use super::status::Status;

/// A persisted node of the content hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub model: String,
    pub view: Option<String>,
    pub props: Value,
    pub langs: Vec<String>,
    pub parent_entity_id: Option<String>,
    pub published: bool,
    pub publish_at: Option<DateTime<Utc>>,
    pub unpublish_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub version_tree: i64,
    pub version_relations: i64,
    pub version_full: i64,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity {
    /// Publish status as of `now`, computed from the current field values.
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> Status {
        Status::derive(
            Some(self.published),
            self.publish_at,
            self.unpublish_at,
            now,
        )
    }

    /// Publish status as of the wall clock.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status_at(Utc::now())
    }

    /// Returns `true` if the entity has been soft-deleted.
    #[must_use]
    pub const fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Read a prop by dot path (`seo.title` or `seo->title`).
    #[must_use]
    pub fn prop(&self, path: &str) -> Option<&Value> {
        props::get(&self.props, path)
    }

    /// Write a prop by dot path, creating intermediate objects.
    pub fn set_prop(&mut self, path: &str, value: Value) -> &mut Self {
        props::set(&mut self.props, path, value);
        self
    }
}

/// Attributes for a new entity. Unset fields receive lifecycle defaults.
///
/// `publish_at` and `unpublish_at` distinguish "not provided" (`None`) from
/// "explicitly empty" (`Some(None)`); only the former gets a default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewEntity {
    pub id: Option<String>,
    pub model: Option<String>,
    pub view: Option<String>,
    pub props: Option<Value>,
    pub langs: Vec<String>,
    pub parent_entity_id: Option<String>,
    pub published: Option<bool>,
    pub publish_at: Option<Option<DateTime<Utc>>>,
    pub unpublish_at: Option<Option<DateTime<Utc>>>,
    pub created_by: Option<String>,
}

impl NewEntity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(view.into());
        self
    }

    #[must_use]
    pub fn props(mut self, props: Value) -> Self {
        self.props = Some(props);
        self
    }

    #[must_use]
    pub fn langs<I, S>(mut self, langs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.langs = langs.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn child_of(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_entity_id = Some(parent_id.into());
        self
    }

    #[must_use]
    pub const fn published(mut self, published: bool) -> Self {
        self.published = Some(published);
        self
    }

    #[must_use]
    pub const fn publish_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.publish_at = Some(at);
        self
    }

    #[must_use]
    pub const fn unpublish_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.unpublish_at = Some(at);
        self
    }

    #[must_use]
    pub fn created_by(mut self, user: impl Into<String>) -> Self {
        self.created_by = Some(user.into());
        self
    }

    /// Not published, no publish window.
    #[must_use]
    pub fn draft(self) -> Self {
        self.published(false).publish_at(None).unpublish_at(None)
    }

    /// Published with a publish date at `when`.
    #[must_use]
    pub fn scheduled(self, when: DateTime<Utc>) -> Self {
        self.published(true).publish_at(Some(when)).unpublish_at(None)
    }

    /// Published since `since`, optionally until `until`.
    #[must_use]
    pub fn live(self, since: DateTime<Utc>, until: Option<DateTime<Utc>>) -> Self {
        self.published(true).publish_at(Some(since)).unpublish_at(until)
    }

    /// Published between `since` and `until`, where `until` has passed.
    #[must_use]
    pub fn expired(self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.published(true)
            .publish_at(Some(since))
            .unpublish_at(Some(until))
    }

    /// Status of the attributes as they stand, before defaults are applied.
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> Status {
        Status::derive(
            self.published,
            self.publish_at.flatten(),
            self.unpublish_at.flatten(),
            now,
        )
    }

    /// Fill every unset attribute with its default.
    ///
    /// The id is left untouched; id assignment belongs to the store.
    #[must_use]
    pub fn with_defaults(mut self, default_model: &str, now: DateTime<Utc>) -> Self {
        let model = self
            .model
            .take()
            .unwrap_or_else(|| default_model.to_string());
        if self.view.is_none() {
            self.view = Some(snake_case(&model));
        }
        self.model = Some(model);
        if self.publish_at.is_none() {
            self.publish_at = Some(Some(now));
        }
        if self.unpublish_at.is_none() {
            self.unpublish_at = Some(None);
        }
        if self.props.is_none() {
            self.props = Some(Value::Object(Map::new()));
        }
        if self.published.is_none() {
            self.published = Some(true);
        }
        self
    }
}

/// A partial update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityPatch {
    pub model: Option<String>,
    pub view: Option<String>,
    pub props: Option<Value>,
    pub langs: Option<Vec<String>>,
    pub parent_entity_id: Option<Option<String>>,
    pub published: Option<bool>,
    pub publish_at: Option<Option<DateTime<Utc>>>,
    pub unpublish_at: Option<Option<DateTime<Utc>>>,
    pub updated_by: Option<String>,
}

impl EntityPatch {
    /// Returns `true` when the patch would change the parent of `entity`.
    #[must_use]
    pub fn changes_parent(&self, entity: &Entity) -> bool {
        self.parent_entity_id
            .as_ref()
            .is_some_and(|parent| parent.as_deref() != entity.parent_entity_id.as_deref())
    }

    /// Apply the patch onto an in-memory copy of `entity`.
    pub fn apply_to(&self, entity: &mut Entity) {
        if let Some(model) = &self.model {
            entity.model.clone_from(model);
        }
        if let Some(view) = &self.view {
            entity.view = Some(view.clone());
        }
        if let Some(props) = &self.props {
            entity.props = props.clone();
        }
        if let Some(langs) = &self.langs {
            entity.langs.clone_from(langs);
        }
        if let Some(parent) = &self.parent_entity_id {
            entity.parent_entity_id.clone_from(parent);
        }
        if let Some(published) = self.published {
            entity.published = published;
        }
        if let Some(publish_at) = self.publish_at {
            entity.publish_at = publish_at;
        }
        if let Some(unpublish_at) = self.unpublish_at {
            entity.unpublish_at = unpublish_at;
        }
        if let Some(user) = &self.updated_by {
            entity.updated_by = Some(user.clone());
        }
    }
}

/// Convert a model name such as `BlogPost` into `blog_post`.
#[must_use]
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower_or_digit = false;
    for ch in name.trim().chars() {
        if ch.is_whitespace() || ch == '-' {
            if !out.ends_with('_') && !out.is_empty() {
                out.push('_');
            }
            prev_lower_or_digit = false;
        } else if ch.is_uppercase() {
            if prev_lower_or_digit && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower_or_digit = false;
        } else {
            out.push(ch);
            prev_lower_or_digit = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn snake_case_matches_view_naming() {
        assert_eq!(snake_case("Entity"), "entity");
        assert_eq!(snake_case("BlogPost"), "blog_post");
        assert_eq!(snake_case("home page"), "home_page");
        assert_eq!(snake_case("Page2Section"), "page2_section");
        assert_eq!(snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn defaults_only_fill_missing_fields() {
        let now = Utc::now();
        let filled = NewEntity::new().with_defaults("Entity", now);
        assert_eq!(filled.model.as_deref(), Some("Entity"));
        assert_eq!(filled.view.as_deref(), Some("entity"));
        assert_eq!(filled.publish_at, Some(Some(now)));
        assert_eq!(filled.props, Some(json!({})));
        assert_eq!(filled.published, Some(true));

        let explicit = NewEntity::new()
            .model("BlogPost")
            .view("custom")
            .draft()
            .with_defaults("Entity", now);
        assert_eq!(explicit.view.as_deref(), Some("custom"));
        assert_eq!(explicit.published, Some(false));
        assert_eq!(explicit.publish_at, Some(None));
    }

    #[test]
    fn view_defaults_from_provided_model() {
        let filled = NewEntity::new()
            .model("BlogPost")
            .with_defaults("Entity", Utc::now());
        assert_eq!(filled.view.as_deref(), Some("blog_post"));
    }

    #[test]
    fn unsaved_status_tracks_in_memory_mutation() {
        let now = Utc::now();
        let mut draft = NewEntity::new();
        assert_eq!(draft.status_at(now), Status::Unknown);

        draft = draft.published(true);
        assert_eq!(draft.status_at(now), Status::Draft);

        draft = draft.publish_at(Some(now + Duration::days(1)));
        assert_eq!(draft.status_at(now), Status::Scheduled);

        draft = draft.publish_at(Some(now - Duration::days(1)));
        assert_eq!(draft.status_at(now), Status::Live);
    }

    #[test]
    fn patch_detects_parent_changes() {
        let now = Utc::now();
        let entity = Entity {
            id: "a".into(),
            model: "Entity".into(),
            view: None,
            props: json!({}),
            langs: vec![],
            parent_entity_id: Some("p".into()),
            published: true,
            publish_at: Some(now),
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
        };

        assert!(!EntityPatch::default().changes_parent(&entity));
        let same = EntityPatch {
            parent_entity_id: Some(Some("p".into())),
            ..EntityPatch::default()
        };
        assert!(!same.changes_parent(&entity));
        let detach = EntityPatch {
            parent_entity_id: Some(None),
            ..EntityPatch::default()
        };
        assert!(detach.changes_parent(&entity));

        let mut copy = entity;
        detach.apply_to(&mut copy);
        assert_eq!(copy.parent_entity_id, None);
    }

    #[test]
    fn props_accessors_use_dot_paths() {
        let now = Utc::now();
        let mut entity = Entity {
            id: "a".into(),
            model: "Entity".into(),
            view: None,
            props: json!({}),
            langs: vec![],
            parent_entity_id: None,
            published: true,
            publish_at: Some(now),
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
        };
        entity.set_prop("seo.title", json!("Welcome"));
        assert_eq!(entity.prop("seo->title"), Some(&json!("Welcome")));
        assert_eq!(entity.prop("seo.missing"), None);
    }
}
