//! Object metadata shared by stored overlays.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key::ObjectKey;

/// Metadata the store maintains for an overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,

    /// Scope the overlay lives in; also the name of its target.
    pub scope: String,

    #[serde(default)]
    pub uid: String,

    /// Optimistic-concurrency token, bumped by the store on every write.
    #[serde(default)]
    pub resource_version: u64,

    /// Markers that block final deletion while present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,

    /// Set by the store when deletion is requested but finalizers remain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: scope.into(),
            uid: String::new(),
            resource_version: 0,
            finalizers: Vec::new(),
            deletion_timestamp: None,
            created_at: None,
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.scope, &self.name)
    }

    pub fn is_deletion_requested(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Add a finalizer; returns false if it was already present.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_string());
        true
    }

    /// Remove a finalizer; returns false if it was not present.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        self.finalizers.len() != before
    }
}
