//! Failure injection for the in-memory store.
//!
//! Lets tests make any store operation fail with a chosen error, either
//! permanently or for a fixed number of calls.

use std::collections::HashMap;

use annotator_model::StoreError;

use super::StoreOp;

/// Failure configuration for an operation
#[derive(Debug, Clone)]
pub struct FailureConfig {
    /// Error to return
    pub error: StoreError,
    /// Number of times to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    pub fn error(error: StoreError) -> Self {
        Self {
            error,
            fail_count: None,
        }
    }

    /// Simulate the store being unreachable.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::error(StoreError::Unavailable(message.into()))
    }

    /// Set the number of times to fail before succeeding
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }
}

#[derive(Debug, Default)]
pub struct FailureInjector {
    configs: HashMap<StoreOp, FailureConfig>,
    call_counts: HashMap<StoreOp, u32>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&mut self, op: StoreOp, config: FailureConfig) {
        self.configs.insert(op, config);
        self.call_counts.insert(op, 0);
    }

    pub fn clear(&mut self) {
        self.configs.clear();
        self.call_counts.clear();
    }

    /// Returns the error the operation should fail with, if any.
    pub fn check(&mut self, op: StoreOp) -> Option<StoreError> {
        let config = self.configs.get(&op)?;
        let count = self.call_counts.entry(op).or_insert(0);
        *count += 1;

        match config.fail_count {
            Some(limit) if *count > limit => None,
            _ => Some(config.error.clone()),
        }
    }
}
