// Vector index seam
// Narrow interface over the remote vector index so the indexer and the
// online service never depend on a specific backend's wire types.

#[cfg(test)]
mod tests;

pub mod memory;
pub mod remote;

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use memory::MemoryVectorIndex;
pub use remote::RemoteVectorIndex;

/// Denormalized copy of the canonical record fields needed at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub primary_category: String,
    pub categories: Vec<String>,
    pub published_at: String,
    pub updated_at: String,
    pub link_abs: String,
    pub link_pdf: String,
    pub ingest_snapshot: String,
}

/// One datapoint in the index, keyed by base identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexItem {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: ItemMetadata,
}

/// One nearest-neighbor hit. `distance` is the backend's raw distance;
/// consumers map it to a similarity score at the edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborResult {
    pub id: String,
    pub distance: f32,
    pub metadata: Option<ItemMetadata>,
}

/// Operations this system needs from a vector index deployment.
///
/// The indexer is the sole writer; the online service only searches. Items
/// are created or overwritten by upsert and never deleted here.
pub trait VectorIndex: Send + Sync {
    fn upsert(&self, items: &[IndexItem]) -> Result<()>;
    fn search(&self, vector: &[f32], k: usize) -> Result<Vec<NeighborResult>>;
    /// Read back datapoints by id. Used by post-upsert probes; absent ids
    /// are simply missing from the result map.
    fn fetch(&self, ids: &[String]) -> Result<HashMap<String, IndexItem>>;
}
