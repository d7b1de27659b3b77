//! Conflict classification
//!
//! A desired key is conflicted when the target already carries it with a
//! different value and this overlay did not own it after the previous cycle:
//! somebody else wrote it. Every other desired key is claimable, including
//! owned keys still present on the target (this overlay's own earlier
//! writes) and unowned keys already showing the desired value. The latter
//! covers a cycle whose target write landed but whose status write did not.
//!
//! Conflicts are not errors. Conflicted keys are left out of this cycle's
//! claim and tested again on every later cycle.

use annotator_model::Attributes;
use serde::Serialize;

/// Partition of the desired keys for one cycle.
///
/// Both lists follow the iteration order of the desired mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub claimable: Vec<String>,
    pub conflicted: Vec<String>,
}

impl Classification {
    pub fn is_claimable(&self, key: &str) -> bool {
        self.claimable.iter().any(|k| k == key)
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicted.is_empty()
    }
}

pub fn classify(
    desired: &Attributes,
    observed: &Attributes,
    previously_owned: &[String],
) -> Classification {
    let mut classification = Classification::default();
    for (key, value) in desired {
        let foreign = observed.get(key).is_some_and(|seen| seen != value)
            && !previously_owned.iter().any(|owned| owned == key);
        if foreign {
            classification.conflicted.push(key.clone());
        } else {
            classification.claimable.push(key.clone());
        }
    }
    classification
}

/// Claimable keys only.
pub fn claimable_keys(
    desired: &Attributes,
    observed: &Attributes,
    previously_owned: &[String],
) -> Vec<String> {
    classify(desired, observed, previously_owned).claimable
}
