//! Dot-path access into an entity's `props` document.
//!
//! Paths use `.` between segments; `->` is accepted as an alias so that
//! `seo->title` and `seo.title` address the same key. Numeric segments index
//! into arrays on read.

use serde_json::{Map, Value};

fn segments(path: &str) -> Vec<&str> {
    path.split("->")
        .flat_map(|part| part.split('.'))
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Look up `path` inside `doc`.
///
/// An empty path returns the whole document.
#[must_use]
pub fn get<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in segments(path) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Set `path` inside `doc` to `value`, creating intermediate objects.
///
/// Any non-object found on the way (including `doc` itself) is replaced by an
/// empty object. An empty path replaces the whole document.
pub fn set(doc: &mut Value, path: &str, value: Value) {
    let segments = segments(path);
    let Some((last, parents)) = segments.split_last() else {
        *doc = value;
        return;
    };

    let mut current = doc;
    for segment in parents {
        let map = ensure_object(current);
        current = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(current).insert((*last).to_string(), value);
}

/// Remove `path` from `doc`, returning the removed value.
pub fn remove(doc: &mut Value, path: &str) -> Option<Value> {
    let segments = segments(path);
    let (last, parents) = segments.split_last()?;

    let mut current = doc;
    for segment in parents {
        current = current.as_object_mut()?.get_mut(*segment)?;
    }
    current.as_object_mut()?.remove(*last)
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced by an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::{get, remove, set};
    use serde_json::json;

    #[test]
    fn get_walks_nested_objects_and_arrays() {
        let doc = json!({"seo": {"title": "Home", "keywords": ["a", "b"]}});
        assert_eq!(get(&doc, "seo.title"), Some(&json!("Home")));
        assert_eq!(get(&doc, "seo->title"), Some(&json!("Home")));
        assert_eq!(get(&doc, "seo.keywords.1"), Some(&json!("b")));
        assert_eq!(get(&doc, "seo.missing"), None);
        assert_eq!(get(&doc, "seo.title.deeper"), None);
        assert_eq!(get(&doc, ""), Some(&doc));
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let mut doc = json!({});
        set(&mut doc, "layout.header.color", json!("blue"));
        assert_eq!(doc, json!({"layout": {"header": {"color": "blue"}}}));

        set(&mut doc, "layout->footer", json!(true));
        assert_eq!(get(&doc, "layout.footer"), Some(&json!(true)));
        assert_eq!(get(&doc, "layout.header.color"), Some(&json!("blue")));
    }

    #[test]
    fn set_replaces_scalars_on_the_path() {
        let mut doc = json!({"a": 1});
        set(&mut doc, "a.b", json!(2));
        assert_eq!(doc, json!({"a": {"b": 2}}));

        let mut scalar = json!("text");
        set(&mut scalar, "x", json!(1));
        assert_eq!(scalar, json!({"x": 1}));
    }

    #[test]
    fn remove_returns_previous_value() {
        let mut doc = json!({"a": {"b": 2, "c": 3}});
        assert_eq!(remove(&mut doc, "a.b"), Some(json!(2)));
        assert_eq!(doc, json!({"a": {"c": 3}}));
        assert_eq!(remove(&mut doc, "a.zzz"), None);
    }
}
