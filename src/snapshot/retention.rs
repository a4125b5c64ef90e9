//! Auto-save retention policy.
//!
//! Only snapshots following the auto-save naming convention are ever pruned;
//! manually named snapshots are kept regardless of count.

use crate::models::snapshot::Snapshot;

/// Identifiers of auto-save snapshots beyond the `keep` most recent.
///
/// `snapshots` is in insertion order; among equal timestamps the later
/// insertion counts as more recent.
#[must_use]
pub fn expired_auto_saves(snapshots: &[Snapshot], keep: usize) -> Vec<String> {
    let mut auto_saves: Vec<(usize, &Snapshot)> = snapshots
        .iter()
        .enumerate()
        .filter(|(_, snapshot)| snapshot.is_auto_save())
        .collect();

    auto_saves.sort_by(|(ia, a), (ib, b)| b.timestamp.cmp(&a.timestamp).then(ib.cmp(ia)));

    auto_saves
        .into_iter()
        .skip(keep)
        .map(|(_, snapshot)| snapshot.id.clone())
        .collect()
}
