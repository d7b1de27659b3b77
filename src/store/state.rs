//! Store tables and the rules every store implementation shares.

use std::collections::BTreeMap;

use annotator_model::{Attributes, ObjectKey, ObjectKind, Overlay, StoreError, Target};
use chrono::Utc;
use uuid::Uuid;

/// Overlays and targets plus the write rules of the object store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreState {
    overlays: BTreeMap<ObjectKey, Overlay>,
    targets: BTreeMap<String, Target>,
}

fn check_version(kind: ObjectKind, key: &str, expected: u64, found: u64) -> Result<(), StoreError> {
    if expected != found {
        return Err(StoreError::Conflict {
            kind,
            key: key.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

fn validate_overlay(overlay: &Overlay) -> Result<(), StoreError> {
    overlay.spec.validate().map_err(|errors| StoreError::Invalid {
        key: overlay.key().to_string(),
        reasons: errors.iter().map(ToString::to_string).collect(),
    })
}

impl StoreState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild tables from a flat list of objects.
    pub fn from_objects(overlays: Vec<Overlay>, targets: Vec<Target>) -> Self {
        Self {
            overlays: overlays.into_iter().map(|o| (o.key(), o)).collect(),
            targets: targets.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }

    pub fn overlays(&self) -> impl Iterator<Item = &Overlay> {
        self.overlays.values()
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    // === Reconciler-facing primitives ===

    pub fn get_overlay(&self, key: &ObjectKey) -> Result<Overlay, StoreError> {
        self.overlays
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(ObjectKind::Overlay, key))
    }

    pub fn get_target(&self, name: &str) -> Result<Target, StoreError> {
        self.targets
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found(ObjectKind::Target, name))
    }

    pub fn update_overlay(&mut self, overlay: &Overlay) -> Result<Overlay, StoreError> {
        let key = overlay.key();
        let stored = self
            .overlays
            .get_mut(&key)
            .ok_or_else(|| StoreError::not_found(ObjectKind::Overlay, &key))?;
        check_version(
            ObjectKind::Overlay,
            &key.to_string(),
            overlay.meta.resource_version,
            stored.meta.resource_version,
        )?;

        // Identity and deletion state are owned by the store.
        stored.meta.finalizers = overlay.meta.finalizers.clone();
        stored.meta.resource_version += 1;
        stored.spec = overlay.spec.clone();

        let finalized = stored.meta.is_deletion_requested() && stored.meta.finalizers.is_empty();
        let result = stored.clone();
        if finalized {
            self.overlays.remove(&key);
        }
        Ok(result)
    }

    pub fn update_overlay_status(&mut self, overlay: &Overlay) -> Result<Overlay, StoreError> {
        let key = overlay.key();
        let stored = self
            .overlays
            .get_mut(&key)
            .ok_or_else(|| StoreError::not_found(ObjectKind::Overlay, &key))?;
        check_version(
            ObjectKind::Overlay,
            &key.to_string(),
            overlay.meta.resource_version,
            stored.meta.resource_version,
        )?;

        stored.status = overlay.status.clone();
        stored.meta.resource_version += 1;
        Ok(stored.clone())
    }

    pub fn update_target(&mut self, target: &Target) -> Result<Target, StoreError> {
        let stored = self
            .targets
            .get_mut(&target.name)
            .ok_or_else(|| StoreError::not_found(ObjectKind::Target, &target.name))?;
        check_version(
            ObjectKind::Target,
            &target.name,
            target.resource_version,
            stored.resource_version,
        )?;

        stored.attributes = target.attributes.clone();
        stored.resource_version += 1;
        Ok(stored.clone())
    }

    pub fn list_overlays(&self, scope: Option<&str>) -> Vec<Overlay> {
        self.overlays
            .values()
            .filter(|o| scope.map_or(true, |s| o.meta.scope == s))
            .cloned()
            .collect()
    }

    pub fn list_targets(&self) -> Vec<Target> {
        self.targets.values().cloned().collect()
    }

    // === External writers (users, other controllers) ===

    /// Admit a new overlay. Keys are validated; status is reset.
    pub fn create_overlay(&mut self, overlay: Overlay) -> Result<Overlay, StoreError> {
        validate_overlay(&overlay)?;
        let key = overlay.key();
        if let Some(existing) = self.overlays.get(&key) {
            return Err(StoreError::Conflict {
                kind: ObjectKind::Overlay,
                key: key.to_string(),
                expected: 0,
                found: existing.meta.resource_version,
            });
        }

        let mut created = overlay;
        created.meta.uid = Uuid::new_v4().to_string();
        created.meta.resource_version = 1;
        created.meta.deletion_timestamp = None;
        created.meta.created_at = Some(Utc::now());
        created.status = Default::default();
        self.overlays.insert(key, created.clone());
        Ok(created)
    }

    /// Create the overlay, or replace the spec of an existing one.
    pub fn apply_overlay(&mut self, overlay: Overlay) -> Result<Overlay, StoreError> {
        let key = overlay.key();
        if self.overlays.contains_key(&key) {
            self.set_overlay_attributes(&key, overlay.spec.attributes)
        } else {
            self.create_overlay(overlay)
        }
    }

    pub fn set_overlay_attributes(
        &mut self,
        key: &ObjectKey,
        attributes: Attributes,
    ) -> Result<Overlay, StoreError> {
        let stored = self
            .overlays
            .get_mut(key)
            .ok_or_else(|| StoreError::not_found(ObjectKind::Overlay, key))?;
        let mut candidate = stored.clone();
        candidate.spec.attributes = attributes;
        validate_overlay(&candidate)?;

        stored.spec = candidate.spec;
        stored.meta.resource_version += 1;
        Ok(stored.clone())
    }

    /// Request deletion of an overlay.
    ///
    /// With finalizers present the overlay only gets a deletion timestamp
    /// and `Some` is returned; otherwise it is erased and `None` returned.
    pub fn delete_overlay(&mut self, key: &ObjectKey) -> Result<Option<Overlay>, StoreError> {
        let stored = self
            .overlays
            .get_mut(key)
            .ok_or_else(|| StoreError::not_found(ObjectKind::Overlay, key))?;

        if stored.meta.finalizers.is_empty() {
            self.overlays.remove(key);
            return Ok(None);
        }
        if stored.meta.deletion_timestamp.is_none() {
            stored.meta.deletion_timestamp = Some(Utc::now());
            stored.meta.resource_version += 1;
        }
        Ok(Some(stored.clone()))
    }

    pub fn create_target(&mut self, target: Target) -> Result<Target, StoreError> {
        if let Some(existing) = self.targets.get(&target.name) {
            return Err(StoreError::Conflict {
                kind: ObjectKind::Target,
                key: target.name.clone(),
                expected: 0,
                found: existing.resource_version,
            });
        }
        let mut created = target;
        created.uid = Uuid::new_v4().to_string();
        created.resource_version = 1;
        self.targets.insert(created.name.clone(), created.clone());
        Ok(created)
    }

    pub fn delete_target(&mut self, name: &str) -> Result<(), StoreError> {
        self.targets
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(ObjectKind::Target, name))
    }

    /// Write one target attribute as a foreign writer would.
    pub fn set_target_attribute(
        &mut self,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<Target, StoreError> {
        let stored = self
            .targets
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found(ObjectKind::Target, name))?;
        stored.attributes.insert(key.to_string(), value.to_string());
        stored.resource_version += 1;
        Ok(stored.clone())
    }

    pub fn remove_target_attribute(&mut self, name: &str, key: &str) -> Result<Target, StoreError> {
        let stored = self
            .targets
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found(ObjectKind::Target, name))?;
        if stored.attributes.remove(key).is_some() {
            stored.resource_version += 1;
        }
        Ok(stored.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> StoreState {
        let mut state = StoreState::new();
        state
            .create_target(Target::new("team-a", [("c", "keep")]))
            .unwrap();
        state
            .create_overlay(Overlay::new("team-a", "labels", [("a", "1")]))
            .unwrap();
        state
    }

    #[test]
    fn test_create_assigns_identity() {
        let state = seeded();
        let overlay = state.get_overlay(&ObjectKey::new("team-a", "labels")).unwrap();
        assert_eq!(overlay.meta.resource_version, 1);
        assert!(!overlay.meta.uid.is_empty());
        assert!(overlay.meta.created_at.is_some());
    }

    #[test]
    fn test_create_rejects_duplicate_and_invalid() {
        let mut state = seeded();
        let dup = state.create_overlay(Overlay::new("team-a", "labels", [("b", "2")]));
        assert!(dup.unwrap_err().is_conflict());

        let invalid = state.create_overlay(Overlay::new("team-a", "bad", [("-x", "1")]));
        assert!(matches!(invalid, Err(StoreError::Invalid { .. })));
    }

    #[test]
    fn test_update_overlay_preserves_status() {
        let mut state = seeded();
        let key = ObjectKey::new("team-a", "labels");

        let mut with_status = state.get_overlay(&key).unwrap();
        with_status.status.owned_keys = vec!["a".to_string()];
        let stored = state.update_overlay_status(&with_status).unwrap();
        assert_eq!(stored.meta.resource_version, 2);

        let mut edit = stored.clone();
        edit.status.owned_keys.clear();
        edit.meta.add_finalizer("example.domain/finalizer");
        let stored = state.update_overlay(&edit).unwrap();
        assert_eq!(stored.status.owned_keys, vec!["a".to_string()]);
        assert!(stored.meta.has_finalizer("example.domain/finalizer"));
        assert_eq!(stored.meta.resource_version, 3);
    }

    #[test]
    fn test_stale_write_conflicts() {
        let mut state = seeded();
        let target = state.get_target("team-a").unwrap();
        state.set_target_attribute("team-a", "x", "foreign").unwrap();

        let err = state.update_target(&target).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let mut state = StoreState::new();
        let err = state.update_target(&Target::new("ghost", [("a", "1")])).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_delete_without_finalizer_erases() {
        let mut state = seeded();
        let key = ObjectKey::new("team-a", "labels");
        assert_eq!(state.delete_overlay(&key).unwrap(), None);
        assert!(state.get_overlay(&key).unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_with_finalizer_waits_for_release() {
        let mut state = seeded();
        let key = ObjectKey::new("team-a", "labels");
        let mut overlay = state.get_overlay(&key).unwrap();
        overlay.meta.add_finalizer("example.domain/finalizer");
        state.update_overlay(&overlay).unwrap();

        let pending = state.delete_overlay(&key).unwrap().unwrap();
        assert!(pending.is_deletion_requested());

        let mut release = pending.clone();
        release.meta.remove_finalizer("example.domain/finalizer");
        let last = state.update_overlay(&release).unwrap();
        assert!(last.meta.finalizers.is_empty());
        assert!(state.get_overlay(&key).unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_overlays_by_scope() {
        let mut state = seeded();
        state.create_target(Target::new("team-b", Vec::<(String, String)>::new())).unwrap();
        state
            .create_overlay(Overlay::new("team-b", "labels", [("a", "1")]))
            .unwrap();
        state
            .create_overlay(Overlay::new("team-a", "more", [("b", "1")]))
            .unwrap();

        assert_eq!(state.list_overlays(None).len(), 3);
        let scoped = state.list_overlays(Some("team-a"));
        assert_eq!(scoped.len(), 2);
        assert!(scoped.iter().all(|o| o.meta.scope == "team-a"));
    }

    #[test]
    fn test_remove_absent_attribute_does_not_bump() {
        let mut state = seeded();
        let before = state.get_target("team-a").unwrap().resource_version;
        let after = state.remove_target_attribute("team-a", "nope").unwrap();
        assert_eq!(after.resource_version, before);
    }
}
