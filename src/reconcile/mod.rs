//! Overlay reconciler
//!
//! One call to [`Reconciler::reconcile`] is one cycle for one overlay:
//!
//! 1. Load the overlay (gone: done) and its target (gone: error)
//! 2. Not being deleted, no finalizer: install the finalizer and stop
//! 3. Not being deleted: classify, merge onto the target, record ownership
//! 4. Being deleted: remove owned keys, release the finalizer
//!
//! A cycle performs at most one target write and one overlay write and never
//! loops or retries. Convergence comes from being invoked again.

mod classify;
mod cleanup;
mod merge;
mod ownership;

pub use classify::{claimable_keys, classify, Classification};
pub use cleanup::{cleanup, release_finalizer, CleanupOutcome};
pub use merge::{merge, sync_target, AttributeDiff};
pub use ownership::sync_owned_keys;

use annotator_model::{Attributes, ObjectKey, Overlay, StoreError};
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::store::Store;

/// Default finalizer guarding overlay deletion.
pub const DEFAULT_FINALIZER: &str = "example.domain/finalizer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Finalizer this reconciler installs and releases.
    pub finalizer: String,

    /// Release the finalizer of a deleted overlay whose target no longer
    /// exists, instead of failing the cycle.
    pub release_on_missing_target: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            finalizer: DEFAULT_FINALIZER.to_string(),
            release_on_missing_target: false,
        }
    }
}

/// What a completed cycle did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The overlay no longer exists.
    OverlayGone,
    /// The finalizer was installed; syncing starts next cycle.
    FinalizerInstalled,
    Synced {
        target_written: bool,
        status_written: bool,
        owned: Vec<String>,
        conflicted: Vec<String>,
    },
    CleanedUp {
        removed: Vec<String>,
        target_written: bool,
    },
    /// Deletion requested but no finalizer of ours was present.
    NothingToClean,
    /// Deletion requested, target gone, finalizer released.
    ReleasedWithoutTarget,
}

impl ReconcileOutcome {
    /// Whether the cycle wrote anything.
    pub fn wrote(&self) -> bool {
        match self {
            Self::OverlayGone | Self::NothingToClean => false,
            Self::FinalizerInstalled | Self::ReleasedWithoutTarget => true,
            Self::Synced {
                target_written,
                status_written,
                ..
            } => *target_written || *status_written,
            Self::CleanedUp { .. } => true,
        }
    }
}

/// Errors that end a cycle. All of them are worth retrying later.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("target {target} of overlay {overlay} not found")]
    TargetNotFound { overlay: ObjectKey, target: String },

    #[error("write conflict: {0}")]
    WriteConflict(StoreError),

    #[error("object disappeared during write: {0}")]
    ObjectGone(StoreError),

    #[error(transparent)]
    Store(StoreError),
}

impl ReconcileError {
    pub fn is_retryable(&self) -> bool {
        true
    }

    /// Short machine-readable label for logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TargetNotFound { .. } => "target_not_found",
            Self::WriteConflict(_) => "write_conflict",
            Self::ObjectGone(_) => "object_gone",
            Self::Store(_) => "store_unavailable",
        }
    }
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => Self::WriteConflict(err),
            StoreError::NotFound { .. } => Self::ObjectGone(err),
            other => Self::Store(other),
        }
    }
}

/// Dry-run view of the sync path for one overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub overlay: String,
    pub target: String,
    pub deletion_requested: bool,
    pub finalizer_present: bool,
    pub classification: Classification,
    pub owned_before: Vec<String>,
    pub next_attributes: Attributes,
    pub diff: AttributeDiff,
}

impl SyncPlan {
    /// Whether the ownership record would change.
    pub fn status_changes(&self) -> bool {
        self.owned_before != self.classification.claimable
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_human(&self) -> String {
        let mut lines = vec![format!("Overlay {} -> target {}", self.overlay, self.target)];
        if self.deletion_requested {
            lines.push("  Deletion requested: next cycle runs cleanup".to_string());
        } else if !self.finalizer_present {
            lines.push("  Finalizer missing: next cycle installs it, no sync yet".to_string());
        }
        lines.push(format!(
            "  Claimable:  {}",
            join_or_dash(&self.classification.claimable)
        ));
        lines.push(format!(
            "  Conflicted: {}",
            join_or_dash(&self.classification.conflicted)
        ));
        lines.push(format!("  Added:      {}", join_or_dash(&self.diff.added)));
        lines.push(format!("  Changed:    {}", join_or_dash(&self.diff.changed)));
        lines.push(format!("  Removed:    {}", join_or_dash(&self.diff.removed)));
        lines.push(format!(
            "  Ownership:  {}",
            if self.status_changes() {
                "would change"
            } else {
                "unchanged"
            }
        ));
        lines.join("\n")
    }
}

fn join_or_dash(keys: &[String]) -> String {
    if keys.is_empty() {
        "-".to_string()
    } else {
        keys.join(", ")
    }
}

/// Predicate selecting the overlays that apply to the target named `scope`.
pub fn overlays_for_target(scope: &str) -> impl Fn(&Overlay) -> bool + '_ {
    move |overlay| overlay.target_name() == scope
}

pub struct Reconciler<S> {
    store: S,
    config: ReconcilerConfig,
}

impl<S: Store> Reconciler<S> {
    pub fn new(store: S, config: ReconcilerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Run one cycle for the overlay identified by `key`.
    pub fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome, ReconcileError> {
        let span = info_span!("reconcile", overlay = %key);
        let _enter = span.enter();

        let result = self.reconcile_inner(key);
        match &result {
            Ok(outcome) => debug!(outcome = ?outcome, "Cycle complete"),
            Err(err) => warn!(error = %err, kind = err.kind(), "Cycle failed"),
        }
        result
    }

    fn reconcile_inner(&self, key: &ObjectKey) -> Result<ReconcileOutcome, ReconcileError> {
        let overlay = match self.store.get_overlay(key) {
            Ok(overlay) => overlay,
            Err(err) if err.is_not_found() => {
                debug!("Overlay not found, nothing to reconcile");
                return Ok(ReconcileOutcome::OverlayGone);
            }
            Err(err) => return Err(ReconcileError::Store(err)),
        };

        let target = match self.store.get_target(overlay.target_name()) {
            Ok(target) => target,
            Err(err) if err.is_not_found() => {
                if overlay.is_deletion_requested() && self.config.release_on_missing_target {
                    return self.release_without_target(&overlay);
                }
                return Err(ReconcileError::TargetNotFound {
                    overlay: key.clone(),
                    target: overlay.target_name().to_string(),
                });
            }
            Err(err) => return Err(ReconcileError::Store(err)),
        };

        let finalizer = self.config.finalizer.as_str();

        if overlay.is_deletion_requested() {
            info!("Overlay deletion requested, cleaning up");
            return Ok(match cleanup(&self.store, &overlay, &target, finalizer)? {
                CleanupOutcome::NothingToClean => ReconcileOutcome::NothingToClean,
                CleanupOutcome::Released {
                    removed,
                    target_written,
                } => ReconcileOutcome::CleanedUp {
                    removed,
                    target_written,
                },
            });
        }

        if !overlay.meta.has_finalizer(finalizer) {
            let mut guarded = overlay.clone();
            guarded.meta.add_finalizer(finalizer);
            self.store.update_overlay(&guarded)?;
            info!(finalizer, "Installed finalizer");
            return Ok(ReconcileOutcome::FinalizerInstalled);
        }

        let previously_owned = &overlay.status.owned_keys;
        let classification = classify(&overlay.spec.attributes, &target.attributes, previously_owned);
        if classification.has_conflicts() {
            warn!(
                target_name = %target.name,
                conflicted = ?classification.conflicted,
                "Skipping attributes held by another writer"
            );
        }

        let next = merge(
            &target.attributes,
            &classification.claimable,
            &overlay.spec.attributes,
            previously_owned,
        );
        let target_written = sync_target(&self.store, &target, next)?.is_some();
        if target_written {
            info!(target_name = %target.name, "Target attributes in sync with overlay");
        }

        let status_written =
            sync_owned_keys(&self.store, &overlay, &classification.claimable)?.is_some();

        Ok(ReconcileOutcome::Synced {
            target_written,
            status_written,
            owned: classification.claimable,
            conflicted: classification.conflicted,
        })
    }

    fn release_without_target(
        &self,
        overlay: &Overlay,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if !overlay.meta.has_finalizer(&self.config.finalizer) {
            return Ok(ReconcileOutcome::NothingToClean);
        }
        warn!(
            target_name = %overlay.target_name(),
            "Target gone, releasing finalizer without cleanup"
        );
        release_finalizer(&self.store, overlay, &self.config.finalizer)?;
        Ok(ReconcileOutcome::ReleasedWithoutTarget)
    }

    /// Compute what the sync path would do, without writing.
    pub fn plan(&self, key: &ObjectKey) -> Result<SyncPlan, ReconcileError> {
        let overlay = self.store.get_overlay(key).map_err(ReconcileError::Store)?;
        let target = match self.store.get_target(overlay.target_name()) {
            Ok(target) => target,
            Err(err) if err.is_not_found() => {
                return Err(ReconcileError::TargetNotFound {
                    overlay: key.clone(),
                    target: overlay.target_name().to_string(),
                })
            }
            Err(err) => return Err(ReconcileError::Store(err)),
        };

        let previously_owned = &overlay.status.owned_keys;
        let classification = classify(&overlay.spec.attributes, &target.attributes, previously_owned);
        let next_attributes = merge(
            &target.attributes,
            &classification.claimable,
            &overlay.spec.attributes,
            previously_owned,
        );
        let diff = AttributeDiff::between(&target.attributes, &next_attributes);

        Ok(SyncPlan {
            overlay: key.to_string(),
            target: target.name.clone(),
            deletion_requested: overlay.is_deletion_requested(),
            finalizer_present: overlay.meta.has_finalizer(&self.config.finalizer),
            classification,
            owned_before: previously_owned.clone(),
            next_attributes,
            diff,
        })
    }
}
