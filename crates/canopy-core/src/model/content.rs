use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One translatable text field of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub content_id: i64,
    pub entity_id: String,
    pub lang: String,
    pub field: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Content rows fetched for one or more entities.
///
/// The reshaping helpers are pure; they never touch the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentSet {
    rows: Vec<Content>,
}

impl ContentSet {
    #[must_use]
    pub const fn new(rows: Vec<Content>) -> Self {
        Self { rows }
    }

    #[must_use]
    pub fn rows(&self) -> &[Content] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Text of `field` in `lang`, if present.
    #[must_use]
    pub fn text(&self, field: &str, lang: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|row| row.field == field && row.lang == lang)
            .map(|row| row.text.as_str())
    }

    /// `field -> text`. When several languages are present the last row wins.
    #[must_use]
    pub fn flatten_by_field(&self) -> BTreeMap<String, String> {
        self.rows
            .iter()
            .map(|row| (row.field.clone(), row.text.clone()))
            .collect()
    }

    /// `field -> lang -> text`.
    #[must_use]
    pub fn group_by_field(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut grouped: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for row in &self.rows {
            grouped
                .entry(row.field.clone())
                .or_default()
                .insert(row.lang.clone(), row.text.clone());
        }
        grouped
    }

    /// `lang -> field -> text`.
    #[must_use]
    pub fn group_by_lang(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut grouped: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for row in &self.rows {
            grouped
                .entry(row.lang.clone())
                .or_default()
                .insert(row.field.clone(), row.text.clone());
        }
        grouped
    }
}

impl From<Vec<Content>> for ContentSet {
    fn from(rows: Vec<Content>) -> Self {
        Self::new(rows)
    }
}

impl IntoIterator for ContentSet {
    type Item = Content;
    type IntoIter = std::vec::IntoIter<Content>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{Content, ContentSet};
    use chrono::Utc;

    fn row(lang: &str, field: &str, text: &str) -> Content {
        let now = Utc::now();
        Content {
            content_id: 0,
            entity_id: "home".into(),
            lang: lang.into(),
            field: field.into(),
            text: text.into(),
            created_at: now,
            updated_at: now,
        }
    }

    fn sample() -> ContentSet {
        ContentSet::new(vec![
            row("en", "title", "Hello"),
            row("en", "body", "Text"),
            row("es", "title", "Hola"),
        ])
    }

    #[test]
    fn group_by_field_nests_languages() {
        let grouped = sample().group_by_field();
        assert_eq!(grouped["title"]["en"], "Hello");
        assert_eq!(grouped["title"]["es"], "Hola");
        assert_eq!(grouped["body"].len(), 1);
    }

    #[test]
    fn group_by_lang_nests_fields() {
        let grouped = sample().group_by_lang();
        assert_eq!(grouped["en"].len(), 2);
        assert_eq!(grouped["es"]["title"], "Hola");
    }

    #[test]
    fn flatten_by_field_keeps_last_language() {
        let flat = sample().flatten_by_field();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat["title"], "Hola");
        assert_eq!(flat["body"], "Text");
    }

    #[test]
    fn text_looks_up_single_cell() {
        let set = sample();
        assert_eq!(set.text("title", "es"), Some("Hola"));
        assert_eq!(set.text("title", "fr"), None);
    }
}
