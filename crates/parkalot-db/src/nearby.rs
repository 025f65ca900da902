//! Merge an externally ranked distance list with stored lots.

use std::collections::HashSet;

use parkalot_core::{DistanceEntry, MergedResult};

use crate::store::LocationStore;

/// Result of [`merge_distances`].
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// Every entry with a stored lot, in input order.
    Merged(Vec<MergedResult>),
    /// The store could not be read. Callers serve this as an empty list.
    Degraded { reason: String },
}

impl MergeOutcome {
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self, MergeOutcome::Degraded { .. })
    }

    /// Results to serve; empty when degraded.
    #[must_use]
    pub fn into_results(self) -> Vec<MergedResult> {
        match self {
            MergeOutcome::Merged(results) => results,
            MergeOutcome::Degraded { .. } => Vec::new(),
        }
    }
}

/// Attach each distance entry to its stored lot.
///
/// Output follows the order of `entries`. An id may appear more than once
/// (several routes to the same lot) and yields one result per entry. Entries
/// whose lot is not stored are dropped. An empty input never touches the
/// store.
pub async fn merge_distances(store: &dyn LocationStore, entries: &[DistanceEntry]) -> MergeOutcome {
    if entries.is_empty() {
        return MergeOutcome::Merged(Vec::new());
    }

    let mut seen: HashSet<&str> = HashSet::with_capacity(entries.len());
    let ids: Vec<String> = entries
        .iter()
        .filter(|entry| seen.insert(entry.location_id.as_str()))
        .map(|entry| entry.location_id.clone())
        .collect();

    let lots = match store.find_by_ids(&ids).await {
        Ok(lots) => lots,
        Err(e) => {
            tracing::error!(error = %e, requested = ids.len(), "nearby: store lookup failed; degrading to empty result");
            return MergeOutcome::Degraded {
                reason: e.to_string(),
            };
        }
    };

    let merged: Vec<MergedResult> = entries
        .iter()
        .filter_map(|entry| {
            lots.get(&entry.location_id).map(|lot| MergedResult {
                lot: lot.clone(),
                distance: entry.distance.clone(),
            })
        })
        .collect();

    let dropped = entries.len() - merged.len();
    if dropped > 0 {
        tracing::debug!(dropped, "nearby: distance entries without a stored lot");
    }

    MergeOutcome::Merged(merged)
}
