//! Merge engine
//!
//! Rebuilds the target's attribute mapping from what is observed:
//!
//! | owned before | claimable now | result                         |
//! |--------------|---------------|--------------------------------|
//! | yes          | yes           | set to desired value           |
//! | yes          | no            | removed (dropped from spec)    |
//! | no           | yes           | set to desired value           |
//! | no           | no            | left as observed               |
//!
//! A previously owned key can only become unclaimable by leaving the desired
//! set, so "owned, not claimable" is exactly "owned, no longer desired".

use annotator_model::{Attributes, StoreError, Target};
use serde::Serialize;
use tracing::debug;

use crate::store::Store;

/// Compute the next attribute mapping for the target.
pub fn merge(
    current: &Attributes,
    claimable: &[String],
    desired: &Attributes,
    previously_owned: &[String],
) -> Attributes {
    let is_claimable = |key: &str| claimable.iter().any(|k| k == key);
    let was_owned = |key: &str| previously_owned.iter().any(|k| k == key);

    let mut next: Attributes = current
        .iter()
        .filter(|(key, _)| is_claimable(key.as_str()) || !was_owned(key.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    for (key, value) in desired {
        if is_claimable(key) {
            next.insert(key.clone(), value.clone());
        }
    }
    next
}

/// Key-level difference between two attribute mappings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttributeDiff {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
}

impl AttributeDiff {
    pub fn between(current: &Attributes, next: &Attributes) -> Self {
        let mut diff = Self::default();
        for (key, value) in next {
            match current.get(key) {
                None => diff.added.push(key.clone()),
                Some(old) if old != value => diff.changed.push(key.clone()),
                Some(_) => {}
            }
        }
        diff.removed = current
            .keys()
            .filter(|key| !next.contains_key(*key))
            .cloned()
            .collect();
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Write `next` onto the target unless it already matches.
///
/// Returns the stored target when a write happened.
pub fn sync_target<S: Store + ?Sized>(
    store: &S,
    target: &Target,
    next: Attributes,
) -> Result<Option<Target>, StoreError> {
    let diff = AttributeDiff::between(&target.attributes, &next);
    if diff.is_empty() {
        return Ok(None);
    }

    debug!(
        target_name = %target.name,
        added = ?diff.added,
        changed = ?diff.changed,
        removed = ?diff.removed,
        "Updating target attributes"
    );
    let mut updated = target.clone();
    updated.attributes = next;
    store.update_target(&updated).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn keys(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_adds_claimable_keys() {
        let next = merge(
            &attrs(&[("c", "keep")]),
            &keys(&["a"]),
            &attrs(&[("a", "1")]),
            &[],
        );
        assert_eq!(next, attrs(&[("a", "1"), ("c", "keep")]));
    }

    #[test]
    fn test_removes_dropped_owned_key() {
        let next = merge(
            &attrs(&[("a", "1"), ("b", "2")]),
            &keys(&["a"]),
            &attrs(&[("a", "1")]),
            &keys(&["a", "b"]),
        );
        assert_eq!(next, attrs(&[("a", "1")]));
    }

    #[test]
    fn test_leaves_conflicted_key_alone() {
        let next = merge(&attrs(&[("a", "foreign")]), &[], &attrs(&[("a", "1")]), &[]);
        assert_eq!(next, attrs(&[("a", "foreign")]));
    }

    #[test]
    fn test_restores_edited_owned_key() {
        let next = merge(
            &attrs(&[("a", "edited")]),
            &keys(&["a"]),
            &attrs(&[("a", "1")]),
            &keys(&["a"]),
        );
        assert_eq!(next, attrs(&[("a", "1")]));
    }

    #[test]
    fn test_diff() {
        let diff = AttributeDiff::between(
            &attrs(&[("a", "1"), ("b", "2"), ("c", "3")]),
            &attrs(&[("a", "1"), ("b", "20"), ("d", "4")]),
        );
        assert_eq!(diff.added, keys(&["d"]));
        assert_eq!(diff.changed, keys(&["b"]));
        assert_eq!(diff.removed, keys(&["c"]));
        assert!(!diff.is_empty());
        assert!(AttributeDiff::between(&attrs(&[("a", "1")]), &attrs(&[("a", "1")])).is_empty());
    }
}
