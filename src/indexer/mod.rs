// Snapshot indexer
// Embeds a normalized snapshot batch by batch and upserts it into the
// vector index, probing a random sample after every upsert. The probe is
// the pipeline's only consistency check: upsert acknowledgment does not
// guarantee read-after-write visibility.


use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::embedding::{EmbeddingCache, EmbeddingModel};
use crate::index::{IndexItem, ItemMetadata, VectorIndex};
use crate::normalize::{CanonicalRecord, records, records_blob};
use crate::storage::BlobStore;
use crate::{HubError, Result};

pub const BATCH_SIZE: usize = 256;
pub const PROBE_COUNT: usize = 100;

pub struct SnapshotIndexer<'a, M: EmbeddingModel> {
    embedder: &'a EmbeddingCache<M>,
    index: &'a dyn VectorIndex,
    batch_size: usize,
    probe_count: usize,
}

impl<'a, M: EmbeddingModel> SnapshotIndexer<'a, M> {
    #[inline]
    pub fn new(embedder: &'a EmbeddingCache<M>, index: &'a dyn VectorIndex) -> Self {
        Self {
            embedder,
            index,
            batch_size: BATCH_SIZE,
            probe_count: PROBE_COUNT,
        }
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[inline]
    pub fn with_probe_count(mut self, probe_count: usize) -> Self {
        self.probe_count = probe_count;
        self
    }

    /// Index one normalized snapshot. An empty snapshot is a no-op; a probe
    /// shortfall aborts the run.
    #[inline]
    pub fn index_snapshot<B: BlobStore>(
        &self,
        store: &B,
        snapshot: &str,
        blob_override: Option<&str>,
    ) -> Result<()> {
        let blob_name = blob_override
            .map(ToString::to_string)
            .unwrap_or_else(|| records_blob(snapshot));
        let data = store.get_bytes(&blob_name)?;
        let rows = records::from_parquet_bytes(&data)?;
        if rows.is_empty() {
            info!("Snapshot {snapshot} has no records, nothing to index");
            return Ok(());
        }
        info!("Indexing {} records from {blob_name}", rows.len());

        for (batch_number, batch) in rows.chunks(self.batch_size).enumerate() {
            self.index_batch(batch)?;
            debug!(
                "Batch {batch_number} complete ({} records)",
                batch.len()
            );
        }
        info!("Snapshot {snapshot} indexed");
        Ok(())
    }

    fn index_batch(&self, batch: &[CanonicalRecord]) -> Result<()> {
        let abstracts: Vec<String> = batch
            .iter()
            .map(|record| record.abstract_text.clone())
            .collect();
        let vectors = self.embedder.embed_batch(&abstracts)?;

        let items: Vec<IndexItem> = batch
            .iter()
            .zip(vectors)
            .map(|(record, vector)| IndexItem {
                id: record.base_id.clone(),
                vector,
                metadata: to_metadata(record),
            })
            .collect();
        self.index.upsert(&items)?;
        self.probe(&items)
    }

    /// Re-read a random sample of the just-written ids. Fewer ids coming
    /// back than were probed is a fatal consistency failure.
    fn probe(&self, items: &[IndexItem]) -> Result<()> {
        let sample_size = self.probe_count.min(items.len());
        if sample_size == 0 {
            return Ok(());
        }
        let mut ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
        ids.shuffle(&mut rand::thread_rng());
        ids.truncate(sample_size);

        let found = self.index.fetch(&ids)?;
        if found.len() < ids.len() {
            let missing = ids.len() - found.len();
            return Err(HubError::Consistency(format!(
                "probe mismatch: {missing} of {} probed ids missing from index",
                ids.len()
            )));
        }
        debug!("Probe verified {} ids", ids.len());
        Ok(())
    }
}

fn to_metadata(record: &CanonicalRecord) -> ItemMetadata {
    ItemMetadata {
        title: record.title.clone(),
        abstract_text: record.abstract_text.clone(),
        authors: record.authors.clone(),
        primary_category: record.primary_category.clone(),
        categories: record.categories.clone(),
        published_at: record.published_at.clone(),
        updated_at: record.updated_at.clone(),
        link_abs: record.link_abs.clone(),
        link_pdf: record.link_pdf.clone(),
        ingest_snapshot: record.ingest_snapshot.clone(),
    }
}
