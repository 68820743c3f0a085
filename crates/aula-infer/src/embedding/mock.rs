use async_trait::async_trait;

use crate::{EmbeddingProvider, InferError, normalize_embedding};

pub const MOCK_EMBEDDING_DIM: usize = 64;

/// Hashed bag-of-words encoder. Texts sharing normalized tokens land close
/// together; texts with no shared tokens are near-orthogonal.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, InferError> {
        Ok(mock_embedding_for_text(text))
    }
}

fn mock_embedding_for_text(text: &str) -> Vec<f32> {
    let mut embedding = vec![0.0f32; MOCK_EMBEDDING_DIM];
    let normalized = aula_text::normalize(text);
    let mut saw_token = false;

    for token in normalized.split_whitespace() {
        saw_token = true;
        let hash = fnv1a_64(token.as_bytes());
        let index = (hash as usize) % MOCK_EMBEDDING_DIM;
        let sign = if ((hash >> 8) & 1) == 0 { 1.0 } else { -1.0 };
        embedding[index] += sign;
    }

    if !saw_token {
        return embedding;
    }

    normalize_embedding(embedding).unwrap_or_else(|| vec![0.0f32; MOCK_EMBEDDING_DIM])
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf29ce484222325u64;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
