//! Object store collaborator
//!
//! The reconciler reads and writes overlays and targets only through the
//! [`Store`] trait. Two implementations are provided:
//!
//! - [`MemoryStore`]: in-process tables with a write ledger and failure
//!   injection, used by tests and embedders
//! - [`FileStore`]: a JSON snapshot on disk, used by the CLI
//!
//! Both share [`StoreState`], which implements resource-version checks,
//! status-subresource semantics and deletion finalization.

mod failure;
mod file;
mod memory;
mod state;

pub use failure::{FailureConfig, FailureInjector};
pub use file::{FileStore, StoreSnapshot, SCHEMA_ID, SCHEMA_VERSION};
pub use memory::MemoryStore;
pub use state::StoreState;

use annotator_model::{ObjectKey, Overlay, StoreError, Target};
use std::sync::Arc;

/// Store operations the reconciler consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreOp {
    GetOverlay,
    GetTarget,
    UpdateOverlay,
    UpdateOverlayStatus,
    UpdateTarget,
    ListOverlays,
}

impl StoreOp {
    /// Whether the operation mutates stored objects.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            StoreOp::UpdateOverlay | StoreOp::UpdateOverlayStatus | StoreOp::UpdateTarget
        )
    }
}

/// Get/update/list primitives over overlays and targets.
///
/// Updates are optimistic: the written object's `resource_version` must
/// match the stored one, otherwise the store answers `Conflict`. Each
/// successful write returns the stored object with its new version.
pub trait Store {
    fn get_overlay(&self, key: &ObjectKey) -> Result<Overlay, StoreError>;

    fn get_target(&self, name: &str) -> Result<Target, StoreError>;

    /// Write overlay metadata and spec. The stored status is left untouched.
    ///
    /// Returns the overlay as stored. If the write removed the last
    /// finalizer of an overlay whose deletion was requested, the overlay is
    /// erased and the returned value is its final state.
    fn update_overlay(&self, overlay: &Overlay) -> Result<Overlay, StoreError>;

    /// Write only the overlay status.
    fn update_overlay_status(&self, overlay: &Overlay) -> Result<Overlay, StoreError>;

    fn update_target(&self, target: &Target) -> Result<Target, StoreError>;

    /// List overlays, optionally restricted to one scope.
    fn list_overlays(&self, scope: Option<&str>) -> Result<Vec<Overlay>, StoreError>;

    /// List all targets. Used by change detection only.
    fn list_targets(&self) -> Result<Vec<Target>, StoreError>;
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn get_overlay(&self, key: &ObjectKey) -> Result<Overlay, StoreError> {
        (**self).get_overlay(key)
    }

    fn get_target(&self, name: &str) -> Result<Target, StoreError> {
        (**self).get_target(name)
    }

    fn update_overlay(&self, overlay: &Overlay) -> Result<Overlay, StoreError> {
        (**self).update_overlay(overlay)
    }

    fn update_overlay_status(&self, overlay: &Overlay) -> Result<Overlay, StoreError> {
        (**self).update_overlay_status(overlay)
    }

    fn update_target(&self, target: &Target) -> Result<Target, StoreError> {
        (**self).update_target(target)
    }

    fn list_overlays(&self, scope: Option<&str>) -> Result<Vec<Overlay>, StoreError> {
        (**self).list_overlays(scope)
    }

    fn list_targets(&self) -> Result<Vec<Target>, StoreError> {
        (**self).list_targets()
    }
}
