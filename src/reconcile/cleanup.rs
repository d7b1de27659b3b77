//! Cleanup on overlay deletion
//!
//! Removes every owned key from the target, then releases the finalizer.
//! Releasing the finalizer is the last durable effect: if anything before it
//! fails the finalizer stays, deletion cannot finalize, and the next cycle
//! repeats the cleanup from scratch. Removing keys that are already gone is
//! a no-op.

use annotator_model::{Overlay, StoreError, Target};
use serde::Serialize;
use tracing::{debug, info};

use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CleanupOutcome {
    /// The overlay never carried our finalizer; nothing to undo.
    NothingToClean,
    /// Owned keys removed and finalizer released.
    Released {
        /// Owned keys that were present on the target and got removed.
        removed: Vec<String>,
        target_written: bool,
    },
}

pub fn cleanup<S: Store + ?Sized>(
    store: &S,
    overlay: &Overlay,
    target: &Target,
    finalizer: &str,
) -> Result<CleanupOutcome, StoreError> {
    if !overlay.meta.has_finalizer(finalizer) {
        debug!(overlay = %overlay.key(), "No finalizer present, nothing to clean");
        return Ok(CleanupOutcome::NothingToClean);
    }

    let mut stripped = target.clone();
    let removed: Vec<String> = overlay
        .status
        .owned_keys
        .iter()
        .filter(|key| stripped.attributes.remove(key.as_str()).is_some())
        .cloned()
        .collect();

    let target_written = !removed.is_empty();
    if target_written {
        store.update_target(&stripped)?;
    }

    release_finalizer(store, overlay, finalizer)?;
    info!(
        overlay = %overlay.key(),
        target_name = %target.name,
        removed = ?removed,
        "Removed owned attributes and released finalizer"
    );
    Ok(CleanupOutcome::Released {
        removed,
        target_written,
    })
}

/// Drop `finalizer` from the overlay and persist it.
pub fn release_finalizer<S: Store + ?Sized>(
    store: &S,
    overlay: &Overlay,
    finalizer: &str,
) -> Result<Overlay, StoreError> {
    let mut released = overlay.clone();
    released.meta.remove_finalizer(finalizer);
    store.update_overlay(&released)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FailureConfig, MemoryStore, StoreOp};
    use annotator_model::ObjectKey;

    const FINALIZER: &str = "example.domain/finalizer";

    fn deleting_overlay(store: &MemoryStore, owned: &[&str]) -> Overlay {
        let mut overlay = Overlay::new("team-a", "labels", [("a", "1"), ("b", "2")]);
        overlay.meta.add_finalizer(FINALIZER);
        let created = store.create_overlay(overlay).unwrap();

        let mut with_status = created;
        with_status.status.owned_keys = owned.iter().map(|k| k.to_string()).collect();
        store.update_overlay_status(&with_status).unwrap();
        store
            .delete_overlay(&ObjectKey::new("team-a", "labels"))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_removes_owned_keys_and_releases() {
        let store = MemoryStore::new();
        store
            .create_target(Target::new("team-a", [("a", "1"), ("b", "2"), ("c", "keep")]))
            .unwrap();
        let overlay = deleting_overlay(&store, &["a", "b"]);
        let target = store.get_target("team-a").unwrap();

        let outcome = cleanup(&store, &overlay, &target, FINALIZER).unwrap();
        assert_eq!(
            outcome,
            CleanupOutcome::Released {
                removed: vec!["a".to_string(), "b".to_string()],
                target_written: true,
            }
        );
        let target = store.get_target("team-a").unwrap();
        assert_eq!(target.attributes.len(), 1);
        assert_eq!(target.attribute("c"), Some("keep"));
        assert!(store
            .get_overlay(&ObjectKey::new("team-a", "labels"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_tolerates_already_removed_keys() {
        let store = MemoryStore::new();
        store.create_target(Target::new("team-a", [("c", "keep")])).unwrap();
        let overlay = deleting_overlay(&store, &["a", "b"]);
        let target = store.get_target("team-a").unwrap();

        let outcome = cleanup(&store, &overlay, &target, FINALIZER).unwrap();
        assert_eq!(
            outcome,
            CleanupOutcome::Released {
                removed: vec![],
                target_written: false,
            }
        );
        assert_eq!(store.call_count(StoreOp::UpdateTarget), 0);
        assert_eq!(store.call_count(StoreOp::UpdateOverlay), 1);
    }

    #[test]
    fn test_without_finalizer_is_noop() {
        let store = MemoryStore::new();
        let target = store.create_target(Target::new("team-a", [("a", "1")])).unwrap();
        let overlay = Overlay::new("team-a", "labels", [("a", "1")]);

        let outcome = cleanup(&store, &overlay, &target, FINALIZER).unwrap();
        assert_eq!(outcome, CleanupOutcome::NothingToClean);
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_target_failure_keeps_finalizer() {
        let store = MemoryStore::new();
        store.create_target(Target::new("team-a", [("a", "1")])).unwrap();
        let overlay = deleting_overlay(&store, &["a"]);
        let target = store.get_target("team-a").unwrap();
        store.inject_failure(StoreOp::UpdateTarget, FailureConfig::unavailable("down"));

        assert!(cleanup(&store, &overlay, &target, FINALIZER).is_err());
        let still_there = store
            .get_overlay(&ObjectKey::new("team-a", "labels"))
            .unwrap();
        assert!(still_there.meta.has_finalizer(FINALIZER));
        assert_eq!(
            store.get_target("team-a").unwrap().attribute("a"),
            Some("1")
        );
    }
}
