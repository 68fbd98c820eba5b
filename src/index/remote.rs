// Remote vector index client
// JSON-over-HTTP client for a deployed index, addressed by collection and
// deployed-index identifiers.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{IndexItem, NeighborResult, VectorIndex};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    datapoints: &'a [IndexItem],
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    k: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    neighbors: Vec<NeighborResult>,
}

#[derive(Debug, Serialize)]
struct FetchRequest<'a> {
    ids: &'a [String],
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    datapoints: Vec<IndexItem>,
}

/// Client for one deployed index variant.
#[derive(Debug, Clone)]
pub struct RemoteVectorIndex {
    agent: ureq::Agent,
    base_url: Url,
}

impl RemoteVectorIndex {
    /// `endpoint` is the service base URL; the collection and deployed index
    /// identifiers select one deployment on it.
    #[inline]
    pub fn new(endpoint: &str, collection_id: &str, deployed_index_id: &str) -> Result<Self> {
        let endpoint_url =
            Url::parse(endpoint).with_context(|| format!("invalid index endpoint '{endpoint}'"))?;
        let base_url = endpoint_url
            .join(&format!(
                "/v1/collections/{collection_id}/indexes/{deployed_index_id}/"
            ))
            .context("failed to build index base URL")?;
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build()
            .into();
        Ok(Self { agent, base_url })
    }

    fn operation_url(&self, operation: &str) -> Result<Url> {
        self.base_url
            .join(operation)
            .with_context(|| format!("failed to build '{operation}' URL"))
    }
}

impl VectorIndex for RemoteVectorIndex {
    #[inline]
    fn upsert(&self, items: &[IndexItem]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        debug!("Upserting {} datapoints", items.len());
        let url = self.operation_url("upsert")?;
        self.agent
            .post(url.as_str())
            .send_json(&UpsertRequest { datapoints: items })
            .context("upsert request failed")?;
        Ok(())
    }

    #[inline]
    fn search(&self, vector: &[f32], k: usize) -> Result<Vec<NeighborResult>> {
        let url = self.operation_url("search")?;
        let response: SearchResponse = self
            .agent
            .post(url.as_str())
            .send_json(&SearchRequest { vector, k })
            .context("search request failed")?
            .body_mut()
            .read_json()
            .context("failed to parse search response")?;
        Ok(response.neighbors)
    }

    #[inline]
    fn fetch(&self, ids: &[String]) -> Result<HashMap<String, IndexItem>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let url = self.operation_url("fetch")?;
        let response: FetchResponse = self
            .agent
            .post(url.as_str())
            .send_json(&FetchRequest { ids })
            .context("fetch request failed")?
            .body_mut()
            .read_json()
            .context("failed to parse fetch response")?;
        Ok(response
            .datapoints
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect())
    }
}
