//! Annotator Object Model
//!
//! Defines the overlay and target objects exchanged between the reconciler
//! and the object store, plus the store error taxonomy.

pub mod error;
pub mod key;
pub mod meta;
pub mod overlay;
pub mod target;
pub mod validate;

pub use error::{ObjectKind, StoreError};
pub use key::{KeyParseError, ObjectKey};
pub use meta::ObjectMeta;
pub use overlay::{Overlay, OverlaySpec, OverlayStatus};
pub use target::Target;
pub use validate::{validate_attribute_key, KeyError};

/// Attribute mapping carried by overlays and targets.
///
/// Ordered so that every walk over a mapping is deterministic.
pub type Attributes = std::collections::BTreeMap<String, String>;
