// Runtime configuration
// Loaded once from the environment at process start and passed by reference;
// no component reads environment variables on its own.


use std::env;

use crate::{HubError, Result};

pub const DEFAULT_EMBEDDING_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text:latest";

const REQUIRED_VARS: &[&str] = &[
    "PROJECT_ID",
    "REGION",
    "DATA_BUCKET",
    "VECTOR_COLLECTION_ID",
    "INDEX_ENDPOINT",
    "DEPLOYED_INDEX_ID",
];

/// Runtime settings for the pipelines and the online service.
///
/// Every required variable is validated eagerly by [`Settings::from_env`];
/// a missing variable is a fatal startup error that names everything absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub project_id: String,
    pub region: String,
    /// Blob root for pipeline artifacts. The bundled backend maps this onto
    /// a local directory; remote object stores implement the same trait.
    pub data_bucket: String,
    pub vector_collection_id: String,
    /// Base URL of the primary deployed vector index.
    pub index_endpoint: String,
    pub deployed_index_id: String,
    /// Secondary (B) variant, enabled only when both values are present.
    pub secondary_index_endpoint: Option<String>,
    pub secondary_deployed_index_id: Option<String>,
    pub secondary_model_version: Option<String>,
    pub embedding_endpoint: String,
    pub embedding_model: String,
    /// Optional regional override for the embedding backend.
    pub embedding_location: Option<String>,
    /// Build provenance, emitted verbatim in every recommendation log record.
    pub git_revision: String,
    pub image_digest: String,
}

impl Settings {
    #[inline]
    pub fn from_env() -> Result<Self> {
        let mut missing = Vec::new();
        let mut required = |name: &str| -> String {
            match env::var(name) {
                Ok(value) if !value.is_empty() => value,
                _ => {
                    missing.push(name.to_string());
                    String::new()
                }
            }
        };

        let project_id = required("PROJECT_ID");
        let region = required("REGION");
        let data_bucket = required("DATA_BUCKET");
        let vector_collection_id = required("VECTOR_COLLECTION_ID");
        let index_endpoint = required("INDEX_ENDPOINT");
        let deployed_index_id = required("DEPLOYED_INDEX_ID");

        if !missing.is_empty() {
            return Err(HubError::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let settings = Self {
            project_id,
            region,
            data_bucket,
            vector_collection_id,
            index_endpoint,
            deployed_index_id,
            secondary_index_endpoint: optional("SECONDARY_INDEX_ENDPOINT"),
            secondary_deployed_index_id: optional("SECONDARY_DEPLOYED_INDEX_ID"),
            secondary_model_version: optional("SECONDARY_MODEL_VERSION"),
            embedding_endpoint: optional("EMBEDDING_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_ENDPOINT.to_string()),
            embedding_model: optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_location: optional("EMBEDDING_LOCATION"),
            git_revision: optional("GIT_REVISION").unwrap_or_else(|| "unknown".to_string()),
            image_digest: optional("IMAGE_DIGEST").unwrap_or_else(|| "unknown".to_string()),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// A secondary variant requires both the endpoint and the deployed index
    /// id; exactly one of the two present is a configuration error rather
    /// than a silently disabled variant.
    fn validate(&self) -> Result<()> {
        match (
            &self.secondary_index_endpoint,
            &self.secondary_deployed_index_id,
        ) {
            (Some(_), None) => Err(HubError::Config(
                "SECONDARY_INDEX_ENDPOINT is set but SECONDARY_DEPLOYED_INDEX_ID is not".into(),
            )),
            (None, Some(_)) => Err(HubError::Config(
                "SECONDARY_DEPLOYED_INDEX_ID is set but SECONDARY_INDEX_ENDPOINT is not".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Whether a secondary index variant is configured for A/B routing.
    #[inline]
    pub fn has_secondary_variant(&self) -> bool {
        self.secondary_index_endpoint.is_some() && self.secondary_deployed_index_id.is_some()
    }

    /// Location used for embedding calls, falling back to the region.
    #[inline]
    pub fn embedding_location(&self) -> &str {
        self.embedding_location.as_deref().unwrap_or(&self.region)
    }

    #[inline]
    pub fn required_vars() -> &'static [&'static str] {
        REQUIRED_VARS
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}
