//! Annotator - overlay reconciliation for shared targets
//!
//! Overlays declare attributes to apply onto a shared target. The reconciler
//! applies the keys no other writer holds, records which keys it owns, and
//! removes exactly those keys again when the overlay is deleted.

pub mod config;
pub mod controller;
pub mod reconcile;
pub mod shutdown;
pub mod store;

pub use annotator_model::{
    validate_attribute_key, Attributes, KeyError, ObjectKey, ObjectKind, ObjectMeta, Overlay,
    OverlaySpec, OverlayStatus, StoreError, Target,
};
pub use config::{ConfigError, EffectiveConfig, Settings};
pub use controller::{Controller, ControllerConfig, Trigger};
pub use reconcile::{ReconcileError, ReconcileOutcome, Reconciler, ReconcilerConfig, SyncPlan};
pub use shutdown::Shutdown;
pub use store::{FileStore, MemoryStore, Store};
