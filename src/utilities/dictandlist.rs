use serde_json::Value;

use crate::error::{HdxError, Result};

/// Ordered metadata map as used by every HDX object.
pub type Metadata = serde_json::Map<String, Value>;

/// Merges `source` into `target` and returns the merged value.
///
/// Primitives (and `null`) in `target` are replaced wholesale by `source`.
/// Lists are replaced by a list `source` unless `merge_lists` is set, in which
/// case the elements of `source` are appended; a non-list `source` is appended
/// as a single element. Maps are merged key by key, recursing into keys present
/// on both sides and inserting the rest.
///
/// Note the direction: for a key present in both maps the recursion ends with
/// the `source` value replacing the `target` scalar, so `source` wins on
/// scalar conflicts.
///
/// # Arguments
///
/// * `target` - The value to merge into.
/// * `source` - The value to merge from.
/// * `merge_lists` - Whether to append lists (true) or replace them (false).
///
/// # Returns
///
/// The merged value, or `HdxError::IncompatibleMerge` if a map would have to
/// absorb a non-map value.
pub fn merge_two(target: Value, source: Value, merge_lists: bool) -> Result<Value> {
    merge_at(target, source, merge_lists, None)
}

/// Merges `source` into the metadata map `target` in place.
///
/// This is the map-level form of [`merge_two`] that objects use to fold one
/// snapshot into another.
pub fn merge_metadata(target: &mut Metadata, source: Metadata) -> Result<()> {
    merge_map_into(target, source, false)
}

/// Merges all values into the first one of the list.
///
/// # Arguments
///
/// * `values` - Values to merge; the first one is the initial target.
/// * `merge_lists` - Whether to append lists (true) or replace them (false).
pub fn merge_dictionaries(values: Vec<Value>, merge_lists: bool) -> Result<Value> {
    let mut values = values.into_iter();
    let mut merged = values.next().unwrap_or(Value::Null);
    for value in values {
        merged = merge_two(merged, value, merge_lists)?;
    }
    Ok(merged)
}

fn merge_at(target: Value, source: Value, merge_lists: bool, key: Option<&str>) -> Result<Value> {
    match target {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => Ok(source),
        Value::Array(mut items) => {
            match source {
                Value::Array(other) if merge_lists => items.extend(other),
                Value::Array(other) => items = other,
                other => items.push(other),
            }
            Ok(Value::Array(items))
        }
        Value::Object(mut map) => match source {
            Value::Object(other) => {
                merge_map_into(&mut map, other, merge_lists)?;
                Ok(Value::Object(map))
            }
            other => Err(HdxError::IncompatibleMerge {
                key: key.unwrap_or("<root>").to_string(),
                into: Value::Object(map).to_string(),
                from: other.to_string(),
            }),
        },
    }
}

fn merge_map_into(target: &mut Metadata, source: Metadata, merge_lists: bool) -> Result<()> {
    for (key, value) in source {
        match target.get_mut(&key) {
            Some(existing) => {
                let current = existing.take();
                *existing = merge_at(current, value, merge_lists, Some(&key))?;
            }
            None => {
                target.insert(key, value);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn as_map(value: Value) -> Metadata {
        match value {
            Value::Object(map) => map,
            _ => panic!("Expected an object"),
        }
    }

    /// The old snapshot wins on shared scalar keys and fills in keys the
    /// newer snapshot does not carry.
    #[test]
    fn test_merge_metadata_precedence() {
        let mut data = as_map(json!({"title": "B"}));
        let old_data = as_map(json!({"title": "A", "notes": "X"}));

        merge_metadata(&mut data, old_data).expect("Failed to merge");

        assert_eq!(data["title"], "A");
        assert_eq!(data["notes"], "X");
    }

    #[test]
    fn test_merge_two_nested_maps() {
        let target = json!({"a": {"b": 1, "c": [1, 2]}, "d": "keep"});
        let source = json!({"a": {"b": 2, "c": [3]}, "e": null});

        let merged = merge_two(target, source, false).expect("Failed to merge");

        assert_eq!(
            merged,
            json!({"a": {"b": 2, "c": [3]}, "d": "keep", "e": null})
        );
    }

    #[test]
    fn test_merge_two_appends_lists_when_asked() {
        let merged = merge_two(json!([1, 2]), json!([3]), true).expect("Failed to merge");
        assert_eq!(merged, json!([1, 2, 3]));

        let merged = merge_two(json!([1, 2]), json!(3), false).expect("Failed to merge");
        assert_eq!(merged, json!([1, 2, 3]));
    }

    #[test]
    fn test_merge_two_replaces_primitives() {
        assert_eq!(merge_two(Value::Null, json!({"a": 1}), false).unwrap(), json!({"a": 1}));
        assert_eq!(merge_two(json!(true), json!("x"), false).unwrap(), json!("x"));
    }

    #[test]
    fn test_merge_two_map_with_scalar_fails() {
        let err = merge_two(json!({"a": {"b": 1}}), json!({"a": "flat"}), false)
            .expect_err("Merge should have failed");

        match err {
            HdxError::IncompatibleMerge { key, .. } => assert_eq!(key, "a"),
            other => panic!("Unexpected error: {other}"),
        }
    }

    #[test]
    fn test_merge_keeps_insertion_order() {
        let mut data = as_map(json!({"name": "n", "title": "t"}));
        merge_metadata(&mut data, as_map(json!({"notes": "x", "name": "m"}))).unwrap();

        let keys: Vec<&str> = data.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["name", "title", "notes"]);
    }

    #[test]
    fn test_merge_dictionaries_folds_into_first() {
        let merged = merge_dictionaries(
            vec![json!({"a": 1}), json!({"b": 2}), json!({"a": 3})],
            false,
        )
        .unwrap();

        assert_eq!(merged, json!({"a": 3, "b": 2}));
    }
}
