use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved kind for materialized closure edges.
pub const ANCESTOR: &str = "ancestor";

/// Kind used when a relation is created without one.
pub const DEFAULT_KIND: &str = "relation";

/// A directed, kind-tagged edge from `caller` to `called`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub relation_id: i64,
    pub caller_entity_id: String,
    pub called_entity_id: String,
    pub kind: String,
    pub position: i64,
    pub depth: i64,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Relation {
    #[must_use]
    pub fn is_ancestor(&self) -> bool {
        self.kind == ANCESTOR
    }
}

/// Edge metadata attached to query results when requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationMeta {
    pub relation_id: i64,
    pub kind: String,
    pub position: i64,
    pub depth: i64,
    pub tags: Vec<String>,
}

/// Attributes for a new non-closure relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRelation {
    pub caller_entity_id: String,
    pub called_entity_id: String,
    pub kind: String,
    pub position: i64,
    pub depth: i64,
    pub tags: Vec<String>,
}

impl NewRelation {
    #[must_use]
    pub fn new(caller: impl Into<String>, called: impl Into<String>) -> Self {
        Self {
            caller_entity_id: caller.into(),
            called_entity_id: called.into(),
            kind: DEFAULT_KIND.to_string(),
            position: 0,
            depth: 0,
            tags: Vec::new(),
        }
    }

    /// Set the kind. A blank kind falls back to [`DEFAULT_KIND`].
    #[must_use]
    pub fn kind(mut self, kind: &str) -> Self {
        let kind = kind.trim();
        self.kind = if kind.is_empty() {
            DEFAULT_KIND.to_string()
        } else {
            kind.to_string()
        };
        self
    }

    #[must_use]
    pub const fn position(mut self, position: i64) -> Self {
        self.position = position;
        self
    }

    #[must_use]
    pub const fn depth(mut self, depth: i64) -> Self {
        self.depth = depth;
        self
    }

    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = normalize_tags(tags);
        self
    }
}

/// Partial update of relation metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationPatch {
    pub position: Option<i64>,
    pub depth: Option<i64>,
    pub tags: Option<Vec<String>>,
}

impl RelationPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.position.is_none() && self.depth.is_none() && self.tags.is_none()
    }
}

/// Trim, drop blanks and de-duplicate tags while keeping first-seen order.
#[must_use]
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag: String = tag.into();
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|seen| seen == tag) {
            out.push(tag.to_string());
        }
    }
    out
}
