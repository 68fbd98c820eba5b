// Online query service
// axum HTTP surface for similar-paper lookups: resolve an arXiv URL through
// the feed, embed the abstract, search the routed index variant, and emit
// one provenance event per response.


use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::anyhow;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::config::Settings;
use crate::embedding::{EmbeddingCache, RemoteEmbedder};
use crate::feed::{FeedClient, FeedEntry};
use crate::index::{ItemMetadata, NeighborResult, RemoteVectorIndex, VectorIndex};
use crate::{HubError, Result};

pub const DEFAULT_K: usize = 5;
const SNIPPET_LENGTH: usize = 400;
/// Percentage of traffic routed to the secondary variant when one exists.
const SECONDARY_TRAFFIC_PERCENT: u64 = 10;
const TRACE_HEADER: &str = "x-cloud-trace-context";
const FORWARDED_HEADER: &str = "x-forwarded-for";

/// One deployed index variant available for routing.
#[derive(Clone)]
pub struct Variant {
    pub label: String,
    pub model_version: String,
    pub index: Arc<dyn VectorIndex>,
}

/// Shared service state. Cheap to clone; every field is reference-counted.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub feed: Arc<FeedClient>,
    pub embedder: Arc<EmbeddingCache<RemoteEmbedder>>,
    pub variants: Arc<Vec<Variant>>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub url: String,
    #[serde(default)]
    pub k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct QuerySummary {
    pub arxiv_id: String,
    pub title: String,
    pub abstract_snippet: String,
    pub link_abs: String,
    pub primary_category: String,
}

#[derive(Debug, Serialize)]
pub struct NeighborPayload {
    pub id: String,
    /// Similarity in `[0, 1]`, derived from the backend's cosine distance.
    pub score: f32,
    pub metadata: Option<ItemMetadata>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query_url: String,
    pub k: usize,
    pub query: QuerySummary,
    pub neighbors: Vec<NeighborPayload>,
    pub as_of: DateTime<Utc>,
}

/// Request-scoped failure. Failures are mapped to a status here and never
/// escape the handler, so one bad request cannot affect another.
#[derive(Debug)]
enum ServiceError {
    BadRequest(String),
    NotFound(String),
    NoIndex,
    Internal(anyhow::Error),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::NoIndex => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "vector index not configured".to_string(),
            ),
            Self::Internal(error) => {
                tracing::error!("Search request failed: {error:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<HubError> for ServiceError {
    fn from(error: HubError) -> Self {
        match error {
            HubError::NotFound(message) => Self::NotFound(message),
            HubError::Malformed(message) => Self::BadRequest(message),
            other => Self::Internal(anyhow::Error::new(other)),
        }
    }
}

/// Build the shared state from settings: feed client, embedding cache, and
/// the variant registry (primary always, secondary when configured).
#[inline]
pub fn build_state(settings: Settings) -> Result<AppState> {
    let feed = Arc::new(FeedClient::new()?);
    let embedder = Arc::new(EmbeddingCache::new(RemoteEmbedder::new(
        &settings.embedding_endpoint,
        &settings.embedding_model,
    )?));

    let mut variants = vec![Variant {
        label: "A".to_string(),
        model_version: settings.embedding_model.clone(),
        index: Arc::new(RemoteVectorIndex::new(
            &settings.index_endpoint,
            &settings.vector_collection_id,
            &settings.deployed_index_id,
        )?),
    }];
    if let (Some(endpoint), Some(deployed_index_id)) = (
        &settings.secondary_index_endpoint,
        &settings.secondary_deployed_index_id,
    ) {
        variants.push(Variant {
            label: "B".to_string(),
            model_version: settings
                .secondary_model_version
                .clone()
                .unwrap_or_else(|| settings.embedding_model.clone()),
            index: Arc::new(RemoteVectorIndex::new(
                endpoint,
                &settings.vector_collection_id,
                deployed_index_id,
            )?),
        });
    }

    Ok(AppState {
        settings: Arc::new(settings),
        feed,
        embedder,
        variants: Arc::new(variants),
    })
}

#[inline]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/search", post(search_handler))
        .with_state(state)
}

/// Bind and serve until shutdown. Connection info is attached so routing can
/// fall back to the peer address when no forwarding header is present.
#[inline]
pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .map_err(|e| HubError::Config(format!("invalid bind address '{bind}': {e}")))?;
    info!("Listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

async fn search_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<SearchRequest>,
) -> std::result::Result<Json<SearchResponse>, ServiceError> {
    let arxiv_id = crate::feed::parse_url(&request.url)
        .ok_or_else(|| ServiceError::BadRequest("unsupported arXiv URL format".to_string()))?;
    if state.variants.is_empty() {
        return Err(ServiceError::NoIndex);
    }

    let k = request.k.unwrap_or(DEFAULT_K).max(1);
    let ip = client_ip(&headers, peer);
    let variant_position = choose_variant(state.variants.len(), &ip);
    let variant = state
        .variants
        .get(variant_position)
        .ok_or(ServiceError::NoIndex)?;

    let feed = Arc::clone(&state.feed);
    let embedder = Arc::clone(&state.embedder);
    let index = Arc::clone(&variant.index);
    let lookup_id = arxiv_id.clone();
    let (entry, neighbors) = tokio::task::spawn_blocking(
        move || -> std::result::Result<(FeedEntry, Vec<NeighborResult>), ServiceError> {
            let entry = feed.get_by_id(&lookup_id)?;
            let vector = embedder
                .embed_text(&entry.abstract_text)
                .map_err(ServiceError::Internal)?;
            let neighbors = index.search(&vector, k).map_err(ServiceError::Internal)?;
            Ok((entry, neighbors))
        },
    )
    .await
    .map_err(|e| ServiceError::Internal(anyhow!("search task panicked: {e}")))??;

    let response = build_response(&request.url, k, &entry, neighbors);
    log_provenance(&state, &headers, &request.url, k, variant, &response);
    Ok(Json(response))
}

fn build_response(
    query_url: &str,
    k: usize,
    entry: &FeedEntry,
    neighbors: Vec<NeighborResult>,
) -> SearchResponse {
    let link_abs = entry
        .links
        .get("abs")
        .cloned()
        .unwrap_or_else(|| format!("https://arxiv.org/abs/{}", entry.arxiv_id));

    SearchResponse {
        query_url: query_url.to_string(),
        k,
        query: QuerySummary {
            arxiv_id: entry.arxiv_id.clone(),
            title: entry.title.clone(),
            abstract_snippet: snippet(&entry.abstract_text),
            link_abs,
            primary_category: entry.primary_category.clone(),
        },
        neighbors: neighbors
            .into_iter()
            .map(|neighbor| NeighborPayload {
                id: neighbor.id,
                score: similarity(neighbor.distance),
                metadata: neighbor.metadata,
            })
            .collect(),
        as_of: Utc::now(),
    }
}

/// One structured event per served recommendation, carrying enough build and
/// routing provenance to reconstruct any answer after the fact.
fn log_provenance(
    state: &AppState,
    headers: &HeaderMap,
    query_url: &str,
    k: usize,
    variant: &Variant,
    response: &SearchResponse,
) {
    let recommendations: Vec<&str> = response
        .neighbors
        .iter()
        .map(|neighbor| neighbor.id.as_str())
        .collect();
    let ingest_snapshot = response
        .neighbors
        .first()
        .and_then(|neighbor| neighbor.metadata.as_ref())
        .map_or("unknown", |metadata| metadata.ingest_snapshot.as_str());

    info!(
        request_id = %Uuid::new_v4(),
        query_url = %query_url,
        k,
        recommendations = %recommendations.join(","),
        trace_id = %trace_id(headers),
        variant = %variant.label,
        model_version = %variant.model_version,
        ingest_snapshot = %ingest_snapshot,
        git_revision = %state.settings.git_revision,
        image_digest = %state.settings.image_digest,
        "RECO_RESPONSE"
    );
}

/// First forwarded address when present, otherwise the socket peer.
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get(FORWARDED_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| peer.ip().to_string(), ToString::to_string)
}

fn trace_id(headers: &HeaderMap) -> String {
    headers
        .get(TRACE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| "-".to_string(), ToString::to_string)
}

/// Deterministic variant choice for one client address.
///
/// The hash is stable across processes and restarts, so a given client
/// always lands on the same variant while the registry is unchanged.
fn choose_variant(variant_count: usize, ip: &str) -> usize {
    if variant_count > 1 && route_bucket(ip) < SECONDARY_TRAFFIC_PERCENT {
        1
    } else {
        0
    }
}

/// Bucket in `0..100` from the first 8 bytes of SHA-256 of the address.
fn route_bucket(ip: &str) -> u64 {
    let digest = Sha256::digest(ip.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix) % 100
}

/// Leading characters of the abstract, bounded for response payloads.
fn snippet(text: &str) -> String {
    text.trim().chars().take(SNIPPET_LENGTH).collect()
}

fn similarity(distance: f32) -> f32 {
    (1.0 - distance).clamp(0.0, 1.0)
}
