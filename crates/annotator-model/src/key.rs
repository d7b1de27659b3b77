//! Overlay identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of an overlay: the scope it lives in plus its name.
///
/// The scope doubles as the name of the target the overlay applies to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub scope: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.name)
    }
}

/// Errors parsing a `scope/name` string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyParseError {
    #[error("expected <scope>/<name>, got {0:?}")]
    MissingSeparator(String),

    #[error("empty {part} in object key {input:?}")]
    EmptyPart { part: &'static str, input: String },
}

impl FromStr for ObjectKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scope, name) = s
            .split_once('/')
            .ok_or_else(|| KeyParseError::MissingSeparator(s.to_string()))?;
        if scope.is_empty() {
            return Err(KeyParseError::EmptyPart {
                part: "scope",
                input: s.to_string(),
            });
        }
        if name.is_empty() || name.contains('/') {
            return Err(KeyParseError::EmptyPart {
                part: "name",
                input: s.to_string(),
            });
        }
        Ok(Self::new(scope, name))
    }
}
