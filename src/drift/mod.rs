// Category drift detection
// Compares the primary-category distribution of two normalized snapshots.
// Drift is reported and logged, never fatal.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::normalize::{CanonicalRecord, records, records_blob};
use crate::storage::BlobStore;
use crate::Result;

pub const DEFAULT_THRESHOLD: f64 = 0.2;
const UNKNOWN_CATEGORY: &str = "<unknown>";

#[derive(Debug, Clone, PartialEq)]
pub struct DriftReport {
    pub threshold: f64,
    /// Absolute share difference per category, over the union of categories
    /// seen in either snapshot.
    pub scores: BTreeMap<String, f64>,
    /// Categories whose difference exceeds the threshold.
    pub flagged: Vec<String>,
}

/// Compare two record sets' primary-category distributions.
#[inline]
pub fn check_drift(
    reference: &[CanonicalRecord],
    new: &[CanonicalRecord],
    threshold: f64,
) -> DriftReport {
    let reference_shares = category_shares(reference);
    let new_shares = category_shares(new);

    let mut categories: Vec<&String> = reference_shares.keys().chain(new_shares.keys()).collect();
    categories.sort();
    categories.dedup();

    let mut scores = BTreeMap::new();
    let mut flagged = Vec::new();
    for category in categories {
        let reference_value = reference_shares.get(category).copied().unwrap_or(0.0);
        let new_value = new_shares.get(category).copied().unwrap_or(0.0);
        let diff = (reference_value - new_value).abs();
        scores.insert(category.clone(), diff);
        if diff > threshold {
            warn!(
                "Detected drift in category '{category}': reference={reference_value:.3} \
                 new={new_value:.3} diff={diff:.3}"
            );
            flagged.push(category.clone());
        }
    }

    if flagged.is_empty() {
        info!("No significant drift detected (threshold {threshold:.2})");
    }
    DriftReport {
        threshold,
        scores,
        flagged,
    }
}

/// Load two normalized snapshots from the store and compare them.
#[inline]
pub fn check_snapshots<B: BlobStore>(
    store: &B,
    reference_snapshot: &str,
    new_snapshot: &str,
    threshold: f64,
) -> Result<DriftReport> {
    info!(
        "Checking primary-category drift: reference={reference_snapshot} new={new_snapshot}"
    );
    let reference = records::from_parquet_bytes(&store.get_bytes(&records_blob(reference_snapshot))?)?;
    let new = records::from_parquet_bytes(&store.get_bytes(&records_blob(new_snapshot))?)?;
    Ok(check_drift(&reference, &new, threshold))
}

/// Normalized frequency of primary category over the rows.
fn category_shares(rows: &[CanonicalRecord]) -> BTreeMap<String, f64> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for row in rows {
        let category = if row.primary_category.is_empty() {
            UNKNOWN_CATEGORY.to_string()
        } else {
            row.primary_category.clone()
        };
        *counts.entry(category).or_insert(0) += 1;
    }
    let total = rows.len() as f64;
    counts
        .into_iter()
        .map(|(category, count)| (category, count as f64 / total))
        .collect()
}
