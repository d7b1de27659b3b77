//! Attribute key validation
//!
//! Keys follow the qualified-name rules of the platform annotations they
//! model: `[prefix/]name`, where the prefix is a DNS subdomain and the name
//! is at most 63 characters of `[A-Za-z0-9._-]`, alphanumeric at both ends.
//!
//! Validation runs at admission time only. The reconciler never rejects a
//! stored overlay because of its keys.

use regex_lite::Regex;
use std::sync::OnceLock;

/// Maximum length of the name part of a key.
pub const MAX_NAME_LEN: usize = 63;

/// Maximum length of the prefix part of a key.
pub const MAX_PREFIX_LEN: usize = 253;

fn name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$").expect("static name pattern")
    })
}

fn prefix_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
            .expect("static prefix pattern")
    })
}

/// Why an attribute key was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("attribute key must not be empty")]
    Empty,

    #[error("attribute key {key:?}: name part must be 1-{max} characters", max = MAX_NAME_LEN)]
    NameLength { key: String },

    #[error("attribute key {key:?}: name part must be alphanumeric, '-', '_' or '.', and start and end alphanumeric")]
    NameSyntax { key: String },

    #[error("attribute key {key:?}: prefix must be a DNS subdomain of at most {max} characters", max = MAX_PREFIX_LEN)]
    Prefix { key: String },
}

/// Validate a single attribute key.
pub fn validate_attribute_key(key: &str) -> Result<(), KeyError> {
    if key.is_empty() {
        return Err(KeyError::Empty);
    }

    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    if let Some(prefix) = prefix {
        if prefix.is_empty() || prefix.len() > MAX_PREFIX_LEN || !prefix_pattern().is_match(prefix)
        {
            return Err(KeyError::Prefix {
                key: key.to_string(),
            });
        }
    }

    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(KeyError::NameLength {
            key: key.to_string(),
        });
    }
    if !name_pattern().is_match(name) {
        return Err(KeyError::NameSyntax {
            key: key.to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_and_prefixed_keys() {
        for key in [
            "owner",
            "team.name",
            "cost_center-2",
            "example.io/owner",
            "a.b-c.io/X.y_z",
        ] {
            assert!(validate_attribute_key(key).is_ok(), "{key} should be valid");
        }
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(validate_attribute_key(""), Err(KeyError::Empty));
    }

    #[test]
    fn test_rejects_bad_name() {
        assert!(matches!(
            validate_attribute_key("-leading"),
            Err(KeyError::NameSyntax { .. })
        ));
        assert!(matches!(
            validate_attribute_key("has space"),
            Err(KeyError::NameSyntax { .. })
        ));
        assert!(matches!(
            validate_attribute_key("example.io/"),
            Err(KeyError::NameLength { .. })
        ));
        let long = "a".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            validate_attribute_key(&long),
            Err(KeyError::NameLength { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_prefix() {
        assert!(matches!(
            validate_attribute_key("Example.IO/owner"),
            Err(KeyError::Prefix { .. })
        ));
        assert!(matches!(
            validate_attribute_key("/owner"),
            Err(KeyError::Prefix { .. })
        ));
        assert!(matches!(
            validate_attribute_key("a/b/c"),
            Err(KeyError::NameSyntax { .. })
        ));
    }
}
