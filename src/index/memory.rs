// In-memory vector index
// Brute-force cosine implementation of the index seam, used by tests and
// for running the full stack locally without a deployed index.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use anyhow::Result;

use super::{IndexItem, NeighborResult, VectorIndex};

#[derive(Debug, Default)]
pub struct MemoryVectorIndex {
    items: Mutex<HashMap<String, IndexItem>>,
}

impl MemoryVectorIndex {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lock_items().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_items(&self) -> std::sync::MutexGuard<'_, HashMap<String, IndexItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VectorIndex for MemoryVectorIndex {
    #[inline]
    fn upsert(&self, items: &[IndexItem]) -> Result<()> {
        let mut stored = self.lock_items();
        for item in items {
            stored.insert(item.id.clone(), item.clone());
        }
        Ok(())
    }

    #[inline]
    fn search(&self, vector: &[f32], k: usize) -> Result<Vec<NeighborResult>> {
        let stored = self.lock_items();
        let mut neighbors: Vec<NeighborResult> = stored
            .values()
            .map(|item| NeighborResult {
                id: item.id.clone(),
                distance: cosine_distance(vector, &item.vector),
                metadata: Some(item.metadata.clone()),
            })
            .collect();
        neighbors.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        neighbors.truncate(k);
        Ok(neighbors)
    }

    #[inline]
    fn fetch(&self, ids: &[String]) -> Result<HashMap<String, IndexItem>> {
        let stored = self.lock_items();
        Ok(ids
            .iter()
            .filter_map(|id| stored.get(id).map(|item| (id.clone(), item.clone())))
            .collect())
    }
}

/// Cosine distance in [0, 2]; 0 means identical direction.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}
