//! Poll-based change detection.
//!
//! Each poll fingerprints every overlay and target and reports the objects
//! that appeared, changed or disappeared since the previous poll.

use std::collections::BTreeMap;

use annotator_model::{ObjectKey, Overlay, StoreError, Target};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::store::Store;

/// Something that may require reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Trigger {
    Overlay(ObjectKey),
    /// A target changed; every overlay scoped to it must be reconciled.
    Target(String),
}

fn fingerprint<T: Serialize>(value: &T) -> Result<String, StoreError> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| StoreError::Unavailable(format!("fingerprint: {}", e)))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

fn overlay_fingerprint(overlay: &Overlay) -> Result<String, StoreError> {
    fingerprint(overlay)
}

/// Only the attributes matter for a target; version bumps alone are ignored.
fn target_fingerprint(target: &Target) -> Result<String, StoreError> {
    fingerprint(&target.attributes)
}

#[derive(Debug, Default)]
pub struct ChangeDetector {
    overlays: BTreeMap<ObjectKey, String>,
    targets: BTreeMap<String, String>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poll<S: Store + ?Sized>(&mut self, store: &S) -> Result<Vec<Trigger>, StoreError> {
        let mut triggers = Vec::new();

        let mut seen_overlays = BTreeMap::new();
        for overlay in store.list_overlays(None)? {
            let key = overlay.key();
            let print = overlay_fingerprint(&overlay)?;
            if self.overlays.get(&key) != Some(&print) {
                triggers.push(Trigger::Overlay(key.clone()));
            }
            seen_overlays.insert(key, print);
        }
        let gone: Vec<ObjectKey> = self
            .overlays
            .keys()
            .filter(|k| !seen_overlays.contains_key(*k))
            .cloned()
            .collect();
        triggers.extend(gone.into_iter().map(Trigger::Overlay));
        self.overlays = seen_overlays;

        let mut seen_targets = BTreeMap::new();
        for target in store.list_targets()? {
            let print = target_fingerprint(&target)?;
            if self.targets.get(&target.name) != Some(&print) {
                triggers.push(Trigger::Target(target.name.clone()));
            }
            seen_targets.insert(target.name, print);
        }
        let gone: Vec<String> = self
            .targets
            .keys()
            .filter(|k| !seen_targets.contains_key(*k))
            .cloned()
            .collect();
        triggers.extend(gone.into_iter().map(Trigger::Target));
        self.targets = seen_targets;

        Ok(triggers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_first_poll_reports_everything() {
        let store = MemoryStore::new();
        store.create_target(Target::new("team-a", [("c", "x")])).unwrap();
        store
            .create_overlay(Overlay::new("team-a", "labels", [("a", "1")]))
            .unwrap();

        let mut detector = ChangeDetector::new();
        let triggers = detector.poll(&store).unwrap();
        assert_eq!(
            triggers,
            vec![
                Trigger::Overlay(ObjectKey::new("team-a", "labels")),
                Trigger::Target("team-a".to_string()),
            ]
        );
        assert!(detector.poll(&store).unwrap().is_empty());
    }

    #[test]
    fn test_reports_changes_and_removals() {
        let store = MemoryStore::new();
        store.create_target(Target::new("team-a", [("c", "x")])).unwrap();
        store
            .create_overlay(Overlay::new("team-a", "labels", [("a", "1")]))
            .unwrap();
        let mut detector = ChangeDetector::new();
        detector.poll(&store).unwrap();

        store.set_target_attribute("team-a", "c", "y").unwrap();
        assert_eq!(
            detector.poll(&store).unwrap(),
            vec![Trigger::Target("team-a".to_string())]
        );

        let key = ObjectKey::new("team-a", "labels");
        store.delete_overlay(&key).unwrap();
        assert_eq!(detector.poll(&store).unwrap(), vec![Trigger::Overlay(key)]);
    }
}
