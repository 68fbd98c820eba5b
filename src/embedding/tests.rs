use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Deterministic model that counts underlying calls.
struct CountingModel {
    calls: AtomicUsize,
    inputs_seen: Mutex<Vec<Vec<String>>>,
}

impl CountingModel {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            inputs_seen: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingModel for &CountingModel {
    fn model_version(&self) -> &str {
        "counting-model-v1"
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs_seen
            .lock()
            .expect("lock")
            .push(texts.to_vec());
        Ok(texts
            .iter()
            .map(|text| vec![text.len() as f32, 1.0])
            .collect())
    }
}

#[test]
fn embed_text_is_cached_and_bit_identical() {
    let model = CountingModel::new();
    let cache = EmbeddingCache::new(&model);

    let first = cache.embed_text("stable text").expect("embed");
    let second = cache.embed_text("stable text").expect("embed");

    assert_eq!(first, second);
    assert_eq!(model.call_count(), 1);
}

#[test]
fn embed_batch_only_sends_misses() {
    let model = CountingModel::new();
    let cache = EmbeddingCache::new(&model);

    cache.embed_text("alpha").expect("embed");
    let batch = vec![
        "alpha".to_string(),
        "beta".to_string(),
        "gamma".to_string(),
    ];
    let vectors = cache.embed_batch(&batch).expect("embed batch");

    assert_eq!(vectors.len(), 3);
    assert_eq!(model.call_count(), 2);
    let inputs = model.inputs_seen.lock().expect("lock");
    assert_eq!(inputs[1], vec!["beta".to_string(), "gamma".to_string()]);
}

#[test]
fn embed_batch_preserves_input_order() {
    let model = CountingModel::new();
    let cache = EmbeddingCache::new(&model);

    // Warm the cache out of order.
    cache.embed_text("bb").expect("embed");

    let batch = vec!["a".to_string(), "bb".to_string(), "ccc".to_string()];
    let vectors = cache.embed_batch(&batch).expect("embed batch");

    assert_eq!(vectors[0], vec![1.0, 1.0]);
    assert_eq!(vectors[1], vec![2.0, 1.0]);
    assert_eq!(vectors[2], vec![3.0, 1.0]);
}

#[test]
fn empty_batch_makes_no_model_call() {
    let model = CountingModel::new();
    let cache = EmbeddingCache::new(&model);

    let vectors = cache.embed_batch(&[]).expect("embed batch");
    assert!(vectors.is_empty());
    assert_eq!(model.call_count(), 0);
}

#[test]
fn model_version_passes_through() {
    let model = CountingModel::new();
    let cache = EmbeddingCache::new(&model);
    assert_eq!(cache.model_version(), "counting-model-v1");
}
