// Normalizer
// Reduces one harvest snapshot's raw pages into the canonical columnar
// table: parse every entry, keep the highest version per base identifier,
// validate, and write a single parquet artifact.

#[cfg(test)]
mod tests;

pub mod records;

use std::collections::HashMap;

use chrono::DateTime;
use tracing::{debug, info, warn};

use crate::feed::{self, FeedEntry};
use crate::harvest::{HarvestManifest, manifest_blob};
use crate::storage::BlobStore;
use crate::{HubError, Result};

pub use records::CanonicalRecord;

/// Blob name of the normalized table for a snapshot.
#[inline]
pub fn records_blob(snapshot: &str) -> String {
    format!("normalized/{snapshot}/records.parquet")
}

/// Normalize all pages of a harvest snapshot into a canonical parquet table.
///
/// Returns the blob name of the written artifact. Validation failures abort
/// before any bytes are written; there is no partial output.
#[inline]
pub fn normalize<B: BlobStore>(
    store: &B,
    snapshot: &str,
    output_blob: Option<&str>,
) -> Result<String> {
    let manifest: HarvestManifest = store.get_json(&manifest_blob(snapshot))?;
    info!(
        "Normalizing snapshot={} pages={} raw_entries={}",
        manifest.snapshot, manifest.pages, manifest.count
    );

    // Lexicographic page order keeps tie-break behavior deterministic.
    let mut page_names = store.list(&format!("{}/", manifest.prefix))?;
    page_names.retain(|name| name.ends_with(".xml"));
    page_names.sort();

    let mut deduped: HashMap<String, FeedEntry> = HashMap::new();
    for page_name in &page_names {
        let raw_xml = store.get_text(page_name)?;
        let entries = match feed::parse_feed(&raw_xml) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Skipping unparseable page {page_name}: {e}");
                continue;
            }
        };
        for entry in entries {
            merge_entry(&mut deduped, entry);
        }
    }
    debug!("Collected {} unique base identifiers", deduped.len());

    let mut rows: Vec<CanonicalRecord> = deduped
        .into_values()
        .map(|entry| to_record(entry, &manifest.snapshot))
        .collect();
    rows.sort_by(|a, b| a.base_id.cmp(&b.base_id));

    validate(&rows)?;

    let data = records::to_parquet_bytes(&rows)?;
    let output = output_blob
        .map(ToString::to_string)
        .unwrap_or_else(|| records_blob(snapshot));
    store.put_bytes(&output, &data)?;
    info!("Wrote {} canonical records to {output}", rows.len());
    Ok(output)
}

/// Keep the max-version entry per base identifier; equal versions are
/// last-seen-wins.
fn merge_entry(deduped: &mut HashMap<String, FeedEntry>, entry: FeedEntry) {
    match deduped.get(&entry.base_id) {
        Some(existing) if entry.version < existing.version => {
            debug!(
                "Dropping {} v{} in favor of existing v{}",
                entry.base_id, entry.version, existing.version
            );
        }
        _ => {
            deduped.insert(entry.base_id.clone(), entry);
        }
    }
}

fn to_record(entry: FeedEntry, ingest_snapshot: &str) -> CanonicalRecord {
    let link_abs = entry
        .links
        .get("abs")
        .cloned()
        .unwrap_or_else(|| format!("https://arxiv.org/abs/{}", entry.base_id));
    let link_pdf = entry
        .links
        .get("pdf")
        .cloned()
        .unwrap_or_else(|| format!("https://arxiv.org/pdf/{}.pdf", entry.base_id));

    CanonicalRecord {
        arxiv_id: entry.arxiv_id,
        base_id: entry.base_id,
        version: i64::from(entry.version),
        title: entry.title,
        abstract_text: entry.abstract_text,
        authors: entry.authors,
        primary_category: entry.primary_category,
        categories: entry.categories,
        published_at: entry.published_at,
        updated_at: entry.updated_at,
        link_abs,
        link_pdf,
        ingest_snapshot: ingest_snapshot.to_string(),
    }
}

/// Schema enforcement over the assembled table. A violation is fatal for the
/// whole run; no output is written.
fn validate(rows: &[CanonicalRecord]) -> Result<()> {
    for row in rows {
        if row.base_id.is_empty() {
            return Err(HubError::Consistency(format!(
                "record '{}' has an empty base identifier",
                row.arxiv_id
            )));
        }
        if row.abstract_text.is_empty() {
            return Err(HubError::Consistency(format!(
                "record '{}' has an empty abstract",
                row.base_id
            )));
        }
        if DateTime::parse_from_rfc3339(&row.published_at).is_err() {
            return Err(HubError::Consistency(format!(
                "record '{}' has unparseable published_at '{}'",
                row.base_id, row.published_at
            )));
        }
    }
    Ok(())
}
