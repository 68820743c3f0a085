use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{EmbeddingProvider, InferError, extract_embedding_vector};

/// Posts `{model, prompt}` to an embeddings endpoint (Ollama-style by default).
#[derive(Debug, Clone)]
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl HttpEmbeddingProvider {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>, InferError> {
        let body = json!({
            "model": self.model,
            "prompt": text
        });

        let response_value: Value = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_connect() || err.is_timeout() {
                    InferError::ModelUnavailable(format!(
                        "embedding endpoint {} unreachable: {err}",
                        self.endpoint
                    ))
                } else {
                    InferError::Request(err)
                }
            })?
            .error_for_status()?
            .json()
            .await?;

        extract_embedding_vector(&response_value)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, InferError> {
        self.request_embedding(text).await
    }
}
