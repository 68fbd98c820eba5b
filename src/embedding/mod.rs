// Text embedding
// Remote embedding model client plus a content-hash cache that guarantees at
// most one model call per distinct text within a client's lifetime.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend that turns texts into vectors, one vector per input, in order.
pub trait EmbeddingModel {
    /// Label identifying the deployed model, used for provenance logging.
    fn model_version(&self) -> &str;
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Blocking client for a batch embedding endpoint.
#[derive(Debug, Clone)]
pub struct RemoteEmbedder {
    agent: ureq::Agent,
    embed_url: Url,
    model: String,
}

impl RemoteEmbedder {
    #[inline]
    pub fn new(endpoint: &str, model: &str) -> Result<Self> {
        let base_url = Url::parse(endpoint)
            .with_context(|| format!("invalid embedding endpoint '{endpoint}'"))?;
        let embed_url = base_url
            .join("/api/embed")
            .context("failed to build embed URL")?;
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build()
            .into();
        Ok(Self {
            agent,
            embed_url,
            model: model.to_string(),
        })
    }
}

impl EmbeddingModel for RemoteEmbedder {
    #[inline]
    fn model_version(&self) -> &str {
        &self.model
    }

    #[inline]
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Embedding batch of {} texts", texts.len());

        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let response: EmbedResponse = self
            .agent
            .post(self.embed_url.as_str())
            .send_json(&request)
            .context("embedding request failed")?
            .body_mut()
            .read_json()
            .context("failed to parse embedding response")?;

        if response.embeddings.len() != texts.len() {
            return Err(anyhow!(
                "embedding backend returned {} vectors for {} inputs",
                response.embeddings.len(),
                texts.len()
            ));
        }
        Ok(response.embeddings)
    }
}

/// Content-hash cache around an embedding model.
///
/// The cache is keyed by SHA-256 of the input text, scoped to this instance,
/// and never evicted. `embed_batch` calls the model once for all cache
/// misses and merges the fresh vectors back into input order, so identical
/// texts cost exactly one model call per cache lifetime.
pub struct EmbeddingCache<M> {
    model: M,
    cache: Mutex<HashMap<String, Vec<f32>>>,
}

impl<M: EmbeddingModel> EmbeddingCache<M> {
    #[inline]
    pub fn new(model: M) -> Self {
        Self {
            model,
            cache: Mutex::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn model_version(&self) -> &str {
        self.model.model_version()
    }

    #[inline]
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(std::slice::from_ref(&text.to_string()))?;
        vectors
            .pop()
            .ok_or_else(|| anyhow!("embedding backend returned no vector"))
    }

    /// Embed a batch, consulting the cache first. Order-preserving: the
    /// result has one vector per input, in input order.
    #[inline]
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut miss_texts: Vec<String> = Vec::new();
        let mut miss_positions: Vec<usize> = Vec::new();

        {
            let cache = self.lock_cache();
            for (position, text) in texts.iter().enumerate() {
                if let Some(vector) = cache.get(&hash_text(text)) {
                    results[position] = Some(vector.clone());
                } else {
                    miss_texts.push(text.clone());
                    miss_positions.push(position);
                }
            }
        }

        if !miss_texts.is_empty() {
            debug!(
                "Embedding cache: {} hits, {} misses",
                texts.len() - miss_texts.len(),
                miss_texts.len()
            );
            let fresh = self.model.embed(&miss_texts)?;
            if fresh.len() != miss_texts.len() {
                return Err(anyhow!(
                    "embedding model returned {} vectors for {} inputs",
                    fresh.len(),
                    miss_texts.len()
                ));
            }
            let mut cache = self.lock_cache();
            for ((position, text), vector) in miss_positions.iter().zip(&miss_texts).zip(fresh) {
                cache.insert(hash_text(text), vector.clone());
                results[*position] = Some(vector);
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<f32>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn hash_text(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    format!("{digest:x}")
}
