use std::path::Path;

use aula_config::{
    DEFAULT_EMBEDDING_ENDPOINT, DEFAULT_EMBEDDING_MODEL, EmbeddingProviderKind, EmbeddingsConfig,
    ensure_workspace_config,
};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

mod cache;
mod embedding;
mod index;

pub use cache::{CacheSnapshot, EmbeddingCache};
pub use embedding::http::HttpEmbeddingProvider;
pub use embedding::mock::{MOCK_EMBEDDING_DIM, MockEmbeddingProvider};
pub use index::{SemanticIndex, cosine_similarity};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EmbeddingProviderOverrides {
    pub enabled: Option<bool>,
    pub provider: Option<EmbeddingProviderKind>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
}

pub struct LoadedEmbeddingProvider {
    pub provider: Box<dyn EmbeddingProvider>,
    pub provider_name: String,
    pub model_name: String,
}

impl std::fmt::Debug for LoadedEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedEmbeddingProvider")
            .field("provider_name", &self.provider_name)
            .field("model_name", &self.model_name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum InferError {
    #[error("config load failed: {0}")]
    Config(#[from] aula_config::ConfigError),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("response decoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid embedding response: {0}")]
    InvalidEmbeddingResponse(String),
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding index has {ids} ids but {rows} rows")]
    RowMismatch { ids: usize, rows: usize },
    #[error("{0}")]
    ModelUnavailable(String),
    #[error("failed to lock shared resource: {0}")]
    LockPoisoned(String),
}

/// Opaque text encoder. Vectors must be deterministic for identical input
/// within one cache generation.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, InferError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, InferError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_text(text).await?);
        }
        Ok(vectors)
    }
}

pub fn load_embedding_provider_from_config(
    workspace_root: impl AsRef<Path>,
    overrides: EmbeddingProviderOverrides,
) -> Result<Option<LoadedEmbeddingProvider>, InferError> {
    let config = ensure_workspace_config(workspace_root)?;
    Ok(load_embedding_provider(&config.embeddings, overrides))
}

pub fn load_embedding_provider(
    config: &EmbeddingsConfig,
    overrides: EmbeddingProviderOverrides,
) -> Option<LoadedEmbeddingProvider> {
    let selected_enabled = overrides.enabled.unwrap_or(config.enabled);
    if !selected_enabled {
        return None;
    }

    let selected_provider = overrides.provider.unwrap_or(config.provider);
    let selected_model = first_non_empty(overrides.model, config.model.clone());
    let selected_endpoint = first_non_empty(overrides.endpoint, config.endpoint.clone());

    let loaded = match selected_provider {
        EmbeddingProviderKind::Mock => LoadedEmbeddingProvider {
            provider: Box::new(MockEmbeddingProvider),
            provider_name: EmbeddingProviderKind::Mock.as_str().to_owned(),
            model_name: format!("mock-{MOCK_EMBEDDING_DIM}d"),
        },
        EmbeddingProviderKind::Http => {
            let provider = HttpEmbeddingProvider::new(
                selected_endpoint.unwrap_or_else(|| DEFAULT_EMBEDDING_ENDPOINT.to_owned()),
                selected_model.unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_owned()),
            );
            LoadedEmbeddingProvider {
                model_name: provider.model().to_owned(),
                provider: Box::new(provider),
                provider_name: EmbeddingProviderKind::Http.as_str().to_owned(),
            }
        }
    };

    Some(loaded)
}

pub(crate) fn extract_embedding_vector(response: &Value) -> Result<Vec<f32>, InferError> {
    if let Some(vector) = value_to_embedding_vector(response) {
        return Ok(vector);
    }

    let candidate_paths = [
        "/embedding",
        "/data/0/embedding",
        "/embeddings/0/embedding",
        "/embeddings/0",
        "/vector",
    ];

    for path in candidate_paths {
        if let Some(value) = response.pointer(path)
            && let Some(vector) = value_to_embedding_vector(value)
        {
            return Ok(vector);
        }
    }

    Err(InferError::InvalidEmbeddingResponse(
        "missing embedding vector in response body".to_owned(),
    ))
}

fn value_to_embedding_vector(value: &Value) -> Option<Vec<f32>> {
    let values = value.as_array()?;
    if values.is_empty() {
        return None;
    }

    let mut embedding = Vec::with_capacity(values.len());
    for item in values {
        let number = item.as_f64()?;
        if !number.is_finite() {
            return None;
        }
        embedding.push(number as f32);
    }

    normalize_embedding(embedding)
}

pub(crate) fn normalize_embedding(mut embedding: Vec<f32>) -> Option<Vec<f32>> {
    let norm_sq = embedding
        .iter()
        .map(|value| value * value)
        .fold(0.0f32, |acc, value| acc + value);
    if norm_sq <= f32::EPSILON {
        return None;
    }

    let norm = norm_sq.sqrt();
    for value in &mut embedding {
        *value /= norm;
    }

    Some(embedding)
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn first_non_empty(left: Option<String>, right: Option<String>) -> Option<String> {
    normalize_optional(left).or_else(|| normalize_optional(right))
}
