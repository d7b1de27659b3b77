//! Store error taxonomy.
//!
//! Every store operation can fail with one of these. The reconciler needs to
//! tell `NotFound` and `Conflict` apart from everything else.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of object a store operation addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Overlay,
    Target,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overlay => write!(f, "overlay"),
            Self::Target => write!(f, "target"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: ObjectKind, key: String },

    #[error("{kind} {key} was modified concurrently (expected version {expected}, found {found})")]
    Conflict {
        kind: ObjectKind,
        key: String,
        expected: u64,
        found: u64,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("{key} rejected: {}", .reasons.join("; "))]
    Invalid { key: String, reasons: Vec<String> },
}

impl StoreError {
    pub fn not_found(kind: ObjectKind, key: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
