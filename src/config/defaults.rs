//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

use crate::reconcile::DEFAULT_FINALIZER;

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Finalizer guarding overlay deletion (default: "example.domain/finalizer")
    pub finalizer: String,

    /// Release the finalizer when the target of a deleted overlay is gone (default: false)
    pub release_on_missing_target: bool,

    /// tracing filter directive (default: "info")
    pub log_filter: String,

    /// Concurrent reconcile workers (default: 2)
    pub workers: u64,

    /// Store poll interval in milliseconds (default: 1000)
    pub poll_interval_ms: u64,

    /// First retry delay in milliseconds (default: 5)
    pub backoff_base_ms: u64,

    /// Retry delay cap in milliseconds (default: 300000 = 5 minutes)
    pub backoff_max_ms: u64,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            finalizer: DEFAULT_FINALIZER.to_string(),
            release_on_missing_target: false,
            log_filter: "info".to_string(),
            workers: 2,
            poll_interval_ms: 1000,
            backoff_base_ms: 5,
            backoff_max_ms: 300_000,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "finalizer": self.finalizer,
            "release_on_missing_target": self.release_on_missing_target,
            "log_filter": self.log_filter,
            "controller": {
                "workers": self.workers,
                "poll_interval_ms": self.poll_interval_ms,
                "backoff": {
                    "base_ms": self.backoff_base_ms,
                    "max_ms": self.backoff_max_ms
                }
            }
        })
    }
}
