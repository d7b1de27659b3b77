//! Target resource
//!
//! A shared, top-level object addressed by name only. Any writer may change
//! its attributes at any time.

use serde::{Deserialize, Serialize};

use crate::Attributes;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub name: String,

    #[serde(default)]
    pub uid: String,

    #[serde(default)]
    pub resource_version: u64,

    #[serde(default)]
    pub attributes: Attributes,
}

impl Target {
    pub fn new<I, K, V>(name: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            uid: String::new(),
            resource_version: 0,
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}
