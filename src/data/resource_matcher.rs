//! Pairing of resources between two lists.
//!
//! Resources are matched by `(id, grouping)` first. Whatever is left is matched
//! by `(name, grouping)`; when a name occurs more than once the format has to
//! agree as well (case-insensitively).

use std::collections::{HashMap, HashSet};

use crate::utilities::dictandlist::Metadata;

/// Fields a resource is matched on.
pub trait MatchKey {
    fn match_id(&self) -> Option<&str>;
    fn match_name(&self) -> Option<&str>;
    fn match_grouping(&self) -> Option<&str>;
    fn match_format(&self) -> Option<&str>;

    /// Lowercased format used for tie-breaks.
    fn match_format_lower(&self) -> Option<String> {
        self.match_format().map(str::to_lowercase)
    }
}

impl MatchKey for Metadata {
    fn match_id(&self) -> Option<&str> {
        self.get("id").and_then(|v| v.as_str())
    }

    fn match_name(&self) -> Option<&str> {
        self.get("name").and_then(|v| v.as_str())
    }

    fn match_grouping(&self) -> Option<&str> {
        self.get("grouping").and_then(|v| v.as_str())
    }

    fn match_format(&self) -> Option<&str> {
        self.get("format").and_then(|v| v.as_str())
    }
}

/// Result of matching an old list against a new list.
///
/// `old_matches[k]` and `new_matches[k]` form the k-th pair, in the order the
/// pairs were discovered. Unmatched indices are in list order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchResult {
    pub old_matches: Vec<usize>,
    pub new_matches: Vec<usize>,
    pub old_unmatched: Vec<usize>,
    pub new_unmatched: Vec<usize>,
}

impl MatchResult {
    /// Iterates over `(old index, new index)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.old_matches
            .iter()
            .copied()
            .zip(self.new_matches.iter().copied())
    }
}

fn duplicated<K: std::hash::Hash + Eq>(keys: impl Iterator<Item = K>) -> HashSet<K> {
    let mut counts: HashMap<K, usize> = HashMap::new();
    for key in keys {
        *counts.entry(key).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(key, _)| key)
        .collect()
}

/// Finds the index in `old` of the resource matching `new`.
///
/// # Arguments
///
/// * `old` - Resources to search.
/// * `new` - Resource to find.
///
/// # Returns
///
/// The first `(id, grouping)` match if `new` has an id and one exists,
/// otherwise the last `(name, grouping)` match (with the format tie-break for
/// duplicated names), otherwise `None`.
pub fn match_single<O: MatchKey, N: MatchKey>(old: &[O], new: &N) -> Option<usize> {
    let grouping = new.match_grouping();

    if let Some(id) = new.match_id() {
        let found = old
            .iter()
            .position(|o| o.match_id() == Some(id) && o.match_grouping() == grouping);
        if found.is_some() {
            return found;
        }
    }

    let name = new.match_name();
    let format = new.match_format_lower();
    let dupnames = duplicated(old.iter().map(|o| (o.match_name(), o.match_grouping())));

    let mut matched = None;
    for (i, o) in old.iter().enumerate() {
        let key = (o.match_name(), o.match_grouping());
        if key != (name, grouping) {
            continue;
        }
        if dupnames.contains(&key) && o.match_format_lower() != format {
            continue;
        }
        matched = Some(i);
    }
    matched
}

/// Matches two lists of resources.
///
/// # Arguments
///
/// * `old` - Typically the resources read from HDX.
/// * `new` - Typically the resources the caller set up.
///
/// # Returns
///
/// A [`MatchResult`] where every index appears in at most one pair.
pub fn match_lists<O: MatchKey, N: MatchKey>(old: &[O], new: &[N]) -> MatchResult {
    let mut result = MatchResult::default();
    let mut old_used = vec![false; old.len()];
    let mut new_used = vec![false; new.len()];

    for (i, o) in old.iter().enumerate() {
        let id = match o.match_id() {
            Some(id) => id,
            None => continue,
        };
        for (j, n) in new.iter().enumerate() {
            if new_used[j] || n.match_id() != Some(id) {
                continue;
            }
            if o.match_grouping() == n.match_grouping() {
                result.old_matches.push(i);
                result.new_matches.push(j);
                old_used[i] = true;
                new_used[j] = true;
                break;
            }
        }
    }

    let mut dupnames = duplicated(old.iter().map(|o| o.match_name()));
    dupnames.extend(duplicated(new.iter().map(|n| n.match_name())));

    for (i, o) in old.iter().enumerate() {
        if old_used[i] {
            continue;
        }
        for (j, n) in new.iter().enumerate() {
            if new_used[j] || o.match_name() != n.match_name() {
                continue;
            }
            if dupnames.contains(&o.match_name())
                && o.match_format_lower() != n.match_format_lower()
            {
                continue;
            }
            if o.match_grouping() == n.match_grouping() {
                result.old_matches.push(i);
                result.new_matches.push(j);
                old_used[i] = true;
                new_used[j] = true;
                break;
            }
        }
    }

    result.old_unmatched = (0..old.len()).filter(|i| !old_used[*i]).collect();
    result.new_unmatched = (0..new.len()).filter(|j| !new_used[*j]).collect();
    result
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn resources(value: Value) -> Vec<Metadata> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => map,
                    _ => panic!("Expected an object"),
                })
                .collect(),
            _ => panic!("Expected an array"),
        }
    }

    fn resource(value: Value) -> Metadata {
        resources(json!([value])).remove(0)
    }

    /// An id match wins even though the names differ.
    #[test]
    fn test_match_single_by_id() {
        let old = resources(json!([
            {"id": "r1", "name": "alpha", "format": "csv"},
            {"id": "r2", "name": "beta", "format": "csv"}
        ]));
        let new = resource(json!({"id": "r2", "name": "renamed", "format": "csv"}));

        assert_eq!(match_single(&old, &new), Some(1));
    }

    /// Duplicated names are told apart by format, ignoring case.
    #[test]
    fn test_match_single_duplicate_name_uses_format() {
        let old = resources(json!([
            {"name": "data", "format": "csv"},
            {"name": "data", "format": "xlsx"}
        ]));
        let new = resource(json!({"name": "data", "format": "XLSX"}));

        assert_eq!(match_single(&old, &new), Some(1));
    }

    #[test]
    fn test_match_single_returns_last_name_match() {
        let old = resources(json!([
            {"name": "data", "format": "csv"},
            {"name": "other", "format": "csv"}
        ]));
        let new = resource(json!({"name": "data", "format": "json"}));

        assert_eq!(match_single(&old, &new), Some(0));
    }

    #[test]
    fn test_match_single_respects_grouping() {
        let old = resources(json!([
            {"id": "r1", "name": "data", "format": "csv", "grouping": "2020"},
        ]));
        let by_id = resource(json!({"id": "r1", "name": "x", "format": "csv", "grouping": "2021"}));
        let by_name = resource(json!({"name": "data", "format": "csv"}));

        assert_eq!(match_single(&old, &by_id), None);
        assert_eq!(match_single(&old, &by_name), None);
    }

    #[test]
    fn test_match_single_unknown_id_falls_back_to_name() {
        let old = resources(json!([{"id": "r1", "name": "data", "format": "csv"}]));
        let new = resource(json!({"id": "r9", "name": "data", "format": "csv"}));

        assert_eq!(match_single(&old, &new), Some(0));
    }

    #[test]
    fn test_match_lists() {
        // Arrange
        let old = resources(json!([
            {"id": "a", "name": "A", "format": "csv"},
            {"id": "b", "name": "B", "format": "csv"},
            {"id": "c", "name": "C", "format": "csv"},
            {"id": "d", "name": "D", "format": "csv"}
        ]));
        let new = resources(json!([
            {"name": "C", "format": "csv"},
            {"id": "b", "name": "B2", "format": "csv"},
            {"name": "E", "format": "csv"}
        ]));

        // Act
        let result = match_lists(&old, &new);

        // Assert
        assert_eq!(result.old_matches, vec![1, 2]);
        assert_eq!(result.new_matches, vec![1, 0]);
        assert_eq!(result.old_unmatched, vec![0, 3]);
        assert_eq!(result.new_unmatched, vec![2]);
        assert_eq!(result.pairs().collect::<Vec<_>>(), vec![(1, 1), (2, 0)]);
    }

    /// A name duplicated only in the new list still requires the format to agree.
    #[test]
    fn test_match_lists_duplicates_in_either_list() {
        let old = resources(json!([{"name": "data", "format": "csv"}]));
        let new = resources(json!([
            {"name": "data", "format": "xlsx"},
            {"name": "data", "format": "CSV"}
        ]));

        let result = match_lists(&old, &new);

        assert_eq!(result.old_matches, vec![0]);
        assert_eq!(result.new_matches, vec![1]);
        assert_eq!(result.new_unmatched, vec![0]);
    }

    #[test]
    fn test_match_lists_each_index_used_once() {
        let old = resources(json!([
            {"name": "data", "format": "csv"},
            {"name": "data", "format": "csv"}
        ]));
        let new = resources(json!([{"name": "data", "format": "csv"}]));

        let result = match_lists(&old, &new);

        assert_eq!(result.old_matches, vec![0]);
        assert_eq!(result.old_unmatched, vec![1]);
        assert!(result.new_unmatched.is_empty());
    }
}
