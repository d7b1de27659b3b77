//! In-memory store
//!
//! Holds a [`StoreState`] behind a mutex, counts every trait call per
//! [`StoreOp`], and consults a [`FailureInjector`] before each call.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use annotator_model::{Attributes, ObjectKey, Overlay, StoreError, Target};

use super::failure::{FailureConfig, FailureInjector};
use super::state::StoreState;
use super::{Store, StoreOp};

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    failures: Mutex<FailureInjector>,
    calls: Mutex<BTreeMap<StoreOp, u64>>,
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Unavailable("store mutex poisoned".to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state.lock().map_err(poisoned)
    }

    /// Record the call and apply any injected failure.
    fn enter(&self, op: StoreOp) -> Result<(), StoreError> {
        if let Some(err) = self.failures.lock().map_err(poisoned)?.check(op) {
            return Err(err);
        }
        *self.calls.lock().map_err(poisoned)?.entry(op).or_insert(0) += 1;
        Ok(())
    }

    // === Test and embedder configuration ===

    pub fn inject_failure(&self, op: StoreOp, config: FailureConfig) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.inject(op, config);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.clear();
        }
    }

    /// Successful calls made through the [`Store`] trait for one operation.
    pub fn call_count(&self, op: StoreOp) -> u64 {
        self.calls
            .lock()
            .map(|calls| calls.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Successful writes made through the [`Store`] trait.
    pub fn write_count(&self) -> u64 {
        self.calls
            .lock()
            .map(|calls| {
                calls
                    .iter()
                    .filter(|(op, _)| op.is_write())
                    .map(|(_, n)| n)
                    .sum()
            })
            .unwrap_or(0)
    }

    pub fn reset_counts(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    // === External writers ===

    pub fn create_overlay(&self, overlay: Overlay) -> Result<Overlay, StoreError> {
        self.lock()?.create_overlay(overlay)
    }

    pub fn create_target(&self, target: Target) -> Result<Target, StoreError> {
        self.lock()?.create_target(target)
    }

    pub fn delete_overlay(&self, key: &ObjectKey) -> Result<Option<Overlay>, StoreError> {
        self.lock()?.delete_overlay(key)
    }

    pub fn delete_target(&self, name: &str) -> Result<(), StoreError> {
        self.lock()?.delete_target(name)
    }

    pub fn set_overlay_attributes(
        &self,
        key: &ObjectKey,
        attributes: Attributes,
    ) -> Result<Overlay, StoreError> {
        self.lock()?.set_overlay_attributes(key, attributes)
    }

    pub fn set_target_attribute(
        &self,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<Target, StoreError> {
        self.lock()?.set_target_attribute(name, key, value)
    }

    pub fn remove_target_attribute(&self, name: &str, key: &str) -> Result<Target, StoreError> {
        self.lock()?.remove_target_attribute(name, key)
    }
}

impl Store for MemoryStore {
    fn get_overlay(&self, key: &ObjectKey) -> Result<Overlay, StoreError> {
        self.enter(StoreOp::GetOverlay)?;
        self.lock()?.get_overlay(key)
    }

    fn get_target(&self, name: &str) -> Result<Target, StoreError> {
        self.enter(StoreOp::GetTarget)?;
        self.lock()?.get_target(name)
    }

    fn update_overlay(&self, overlay: &Overlay) -> Result<Overlay, StoreError> {
        self.enter(StoreOp::UpdateOverlay)?;
        self.lock()?.update_overlay(overlay)
    }

    fn update_overlay_status(&self, overlay: &Overlay) -> Result<Overlay, StoreError> {
        self.enter(StoreOp::UpdateOverlayStatus)?;
        self.lock()?.update_overlay_status(overlay)
    }

    fn update_target(&self, target: &Target) -> Result<Target, StoreError> {
        self.enter(StoreOp::UpdateTarget)?;
        self.lock()?.update_target(target)
    }

    fn list_overlays(&self, scope: Option<&str>) -> Result<Vec<Overlay>, StoreError> {
        self.enter(StoreOp::ListOverlays)?;
        Ok(self.lock()?.list_overlays(scope))
    }

    fn list_targets(&self) -> Result<Vec<Target>, StoreError> {
        Ok(self.lock()?.list_targets())
    }
}
