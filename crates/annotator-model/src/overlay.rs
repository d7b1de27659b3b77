//! Overlay object
//!
//! An overlay declares attributes to apply onto the target named by its
//! scope. Its status records the keys it currently owns on that target,
//! which is the only memory carried from one reconcile cycle to the next.

use serde::{Deserialize, Serialize};

use crate::key::ObjectKey;
use crate::meta::ObjectMeta;
use crate::validate::{validate_attribute_key, KeyError};
use crate::Attributes;

/// Desired state authored by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlaySpec {
    #[serde(default)]
    pub attributes: Attributes,
}

impl OverlaySpec {
    /// Validate every attribute key, collecting all failures.
    pub fn validate(&self) -> Result<(), Vec<KeyError>> {
        let errors: Vec<KeyError> = self
            .attributes
            .keys()
            .filter_map(|k| validate_attribute_key(k).err())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Observed state written by the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayStatus {
    /// Keys this overlay owns on its target, in desired-key order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owned_keys: Vec<String>,
}

impl OverlayStatus {
    pub fn owns(&self, key: &str) -> bool {
        self.owned_keys.iter().any(|k| k == key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlay {
    pub meta: ObjectMeta,

    #[serde(default)]
    pub spec: OverlaySpec,

    #[serde(default)]
    pub status: OverlayStatus,
}

impl Overlay {
    /// Build an overlay with the given desired attributes and empty status.
    pub fn new<I, K, V>(scope: impl Into<String>, name: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            meta: ObjectMeta::new(scope, name),
            spec: OverlaySpec {
                attributes: attributes
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            },
            status: OverlayStatus::default(),
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.meta.key()
    }

    /// Name of the target this overlay applies to.
    pub fn target_name(&self) -> &str {
        &self.meta.scope
    }

    pub fn is_deletion_requested(&self) -> bool {
        self.meta.is_deletion_requested()
    }
}
