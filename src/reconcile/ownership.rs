//! Ownership tracking
//!
//! The overlay status holds the keys it owns on the target. This is the only
//! memory carried between cycles, so each successful cycle replaces it with
//! exactly the claimable set computed in that cycle.

use annotator_model::{Overlay, StoreError};
use tracing::debug;

use crate::store::Store;

/// Persist `claimable` as the owned key list unless it is already recorded.
///
/// Returns the stored overlay when a write happened.
pub fn sync_owned_keys<S: Store + ?Sized>(
    store: &S,
    overlay: &Overlay,
    claimable: &[String],
) -> Result<Option<Overlay>, StoreError> {
    if overlay.status.owned_keys.as_slice() == claimable {
        return Ok(None);
    }

    debug!(
        overlay = %overlay.key(),
        previous = ?overlay.status.owned_keys,
        owned = ?claimable,
        "Recording owned keys"
    );
    let mut updated = overlay.clone();
    updated.status.owned_keys = claimable.to_vec();
    store.update_overlay_status(&updated).map(Some)
}
