pub mod archive;
pub mod contents;
pub mod create;
pub mod delete;
pub mod hierarchy;
pub mod init;
pub mod list;
pub mod move_cmd;
pub mod relate;
pub mod show;
pub mod update;

use anyhow::{Context as _, Result};
use canopy_core::{EntityStore, StoreError};
use canopy_core::config;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Open the project store; fails with `NotInitialized` if `cnp init` never ran.
pub fn open_store(project_root: &Path) -> Result<EntityStore> {
    let path = config::store_path(project_root);
    if !path.exists() {
        return Err(StoreError::NotInitialized { path }.into());
    }
    EntityStore::open(project_root)
}

/// Parse `key=value` pairs from repeated CLI arguments.
pub fn parse_pairs(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("expected key=value, got '{pair}'"))?;
            let key = key.trim();
            if key.is_empty() {
                anyhow::bail!("empty key in '{pair}'");
            }
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Parse an RFC 3339 timestamp; `none` or an empty string clears the value.
pub fn parse_optional_time(raw: &str) -> Result<Option<DateTime<Utc>>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid timestamp '{raw}': expected RFC 3339"))?;
    Ok(Some(parsed.with_timezone(&Utc)))
}

/// Parse a `--parent` value; `none` detaches.
pub fn parse_parent(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Parse a JSON value, falling back to a plain string for bare words.
pub fn parse_json_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_split_on_first_equals() {
        let pairs = parse_pairs(&["title=a=b".to_string()]).expect("pairs");
        assert_eq!(pairs, vec![("title".to_string(), "a=b".to_string())]);
        assert!(parse_pairs(&["novalue".to_string()]).is_err());
        assert!(parse_pairs(&["=x".to_string()]).is_err());
    }

    #[test]
    fn none_clears_times_and_parents() {
        assert_eq!(parse_optional_time("none").expect("none"), None);
        assert!(parse_optional_time("2024-01-02T03:04:05Z").expect("time").is_some());
        assert!(parse_optional_time("yesterday").is_err());
        assert_eq!(parse_parent("None"), None);
        assert_eq!(parse_parent("home"), Some("home".to_string()));
    }

    #[test]
    fn json_values_fall_back_to_strings() {
        assert_eq!(parse_json_value("3"), serde_json::json!(3));
        assert_eq!(parse_json_value("hello"), serde_json::json!("hello"));
        assert_eq!(parse_json_value("{\"a\":1}"), serde_json::json!({"a": 1}));
    }
}
