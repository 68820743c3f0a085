use std::sync::{Arc, RwLock};

use aula_core::{Catalog, EntityKind, catalog_fingerprint};

use crate::{InferError, LoadedEmbeddingProvider, SemanticIndex};

/// One immutable generation of the catalog and its encoded vectors.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub catalog: Arc<Catalog>,
    pub courses: Option<Arc<SemanticIndex>>,
    pub topics: Option<Arc<SemanticIndex>>,
    pub resources: Option<Arc<SemanticIndex>>,
    pub provider_name: Option<String>,
    pub model_name: Option<String>,
    pub fingerprint: String,
    pub generation: u64,
    pub ready: bool,
    pub encode_error: Option<String>,
}

impl CacheSnapshot {
    pub fn index(&self, entity: EntityKind) -> Option<&SemanticIndex> {
        let index = match entity {
            EntityKind::Course => self.courses.as_ref(),
            EntityKind::Topic => self.topics.as_ref(),
            EntityKind::Resource => self.resources.as_ref(),
        };
        index.map(Arc::as_ref)
    }

    fn reusable_for(&self, fingerprint: &str, provider: &LoadedEmbeddingProvider) -> bool {
        self.ready
            && self.fingerprint == fingerprint
            && self.provider_name.as_deref() == Some(provider.provider_name.as_str())
            && self.model_name.as_deref() == Some(provider.model_name.as_str())
    }
}

struct EncodedIndexes {
    courses: Arc<SemanticIndex>,
    topics: Arc<SemanticIndex>,
    resources: Arc<SemanticIndex>,
}

/// Process-wide catalog and vector cache. Readers clone the current `Arc`;
/// `refresh` encodes without holding the lock and only swaps the pointer
/// under the write guard.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    current: RwLock<Arc<CacheSnapshot>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Result<Arc<CacheSnapshot>, InferError> {
        let guard = self
            .current
            .read()
            .map_err(|_| InferError::LockPoisoned("embedding cache".to_owned()))?;
        Ok(Arc::clone(&guard))
    }

    pub async fn refresh(
        &self,
        catalog: Catalog,
        provider: Option<&LoadedEmbeddingProvider>,
    ) -> Result<Arc<CacheSnapshot>, InferError> {
        let fingerprint = catalog_fingerprint(&catalog);
        let previous = self.snapshot()?;

        let mut next = CacheSnapshot {
            catalog: Arc::new(catalog),
            fingerprint,
            ..CacheSnapshot::default()
        };

        if let Some(provider) = provider {
            next.provider_name = Some(provider.provider_name.clone());
            next.model_name = Some(provider.model_name.clone());

            if previous.reusable_for(&next.fingerprint, provider) {
                tracing::debug!(
                    fingerprint = %next.fingerprint,
                    "catalog unchanged, reusing encoded vectors"
                );
                next.courses = previous.courses.clone();
                next.topics = previous.topics.clone();
                next.resources = previous.resources.clone();
                next.ready = true;
            } else {
                match encode_catalog(&next.catalog, provider).await {
                    Ok(encoded) => {
                        next.courses = Some(encoded.courses);
                        next.topics = Some(encoded.topics);
                        next.resources = Some(encoded.resources);
                        next.ready = true;
                    }
                    Err(err) => {
                        tracing::warn!(
                            provider = %provider.provider_name,
                            model = %provider.model_name,
                            error = %err,
                            "catalog encoding failed, serving lexical scores only"
                        );
                        next.encode_error = Some(err.to_string());
                    }
                }
            }
        }

        let snapshot = {
            let mut guard = self
                .current
                .write()
                .map_err(|_| InferError::LockPoisoned("embedding cache".to_owned()))?;
            next.generation = guard.generation + 1;
            let snapshot = Arc::new(next);
            *guard = Arc::clone(&snapshot);
            snapshot
        };

        tracing::info!(
            generation = snapshot.generation,
            courses = snapshot.catalog.courses.len(),
            topics = snapshot.catalog.topics.len(),
            resources = snapshot.catalog.resources.len(),
            ready = snapshot.ready,
            "embedding cache refreshed"
        );

        Ok(snapshot)
    }
}

async fn encode_catalog(
    catalog: &Catalog,
    provider: &LoadedEmbeddingProvider,
) -> Result<EncodedIndexes, InferError> {
    Ok(EncodedIndexes {
        courses: Arc::new(encode_entity(catalog, EntityKind::Course, provider).await?),
        topics: Arc::new(encode_entity(catalog, EntityKind::Topic, provider).await?),
        resources: Arc::new(encode_entity(catalog, EntityKind::Resource, provider).await?),
    })
}

async fn encode_entity(
    catalog: &Catalog,
    entity: EntityKind,
    provider: &LoadedEmbeddingProvider,
) -> Result<SemanticIndex, InferError> {
    let names = catalog
        .candidate_names(entity)
        .into_iter()
        .map(str::to_owned)
        .collect::<Vec<_>>();
    let rows = if names.is_empty() {
        Vec::new()
    } else {
        provider.provider.embed_batch(&names).await?
    };
    SemanticIndex::new(catalog.candidate_ids(entity), rows)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use aula_core::{CatalogItem, Topic};

    use super::*;
    use crate::{EmbeddingProvider, MockEmbeddingProvider};

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed_text(&self, text: &str) -> Result<Vec<f32>, InferError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            MockEmbeddingProvider.embed_text(text).await
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        async fn embed_text(&self, _text: &str) -> Result<Vec<f32>, InferError> {
            Err(InferError::ModelUnavailable("model offline".to_owned()))
        }
    }

    fn loaded(provider: Box<dyn EmbeddingProvider>) -> LoadedEmbeddingProvider {
        LoadedEmbeddingProvider {
            provider,
            provider_name: "test".to_owned(),
            model_name: "test-model".to_owned(),
        }
    }

    fn sample_catalog() -> Catalog {
        Catalog::new(
            vec![
                CatalogItem::new(1, "Redes de Computadoras"),
                CatalogItem::new(2, "Cálculo I"),
            ],
            vec![Topic::new(10, "Redes")],
        )
    }

    #[tokio::test]
    async fn refresh_swaps_in_a_new_generation() {
        let cache = EmbeddingCache::new();
        let before = cache.snapshot().expect("snapshot");
        assert_eq!(before.generation, 0);
        assert!(!before.ready);

        let provider = loaded(Box::new(MockEmbeddingProvider));
        let after = cache
            .refresh(sample_catalog(), Some(&provider))
            .await
            .expect("refresh");

        assert_eq!(after.generation, 1);
        assert!(after.ready);
        assert_eq!(after.index(EntityKind::Course).map(SemanticIndex::len), Some(2));
        assert_eq!(after.index(EntityKind::Topic).map(SemanticIndex::len), Some(1));
        assert_eq!(after.index(EntityKind::Resource).map(SemanticIndex::len), Some(0));

        assert_eq!(before.generation, 0);
        assert_eq!(cache.snapshot().expect("snapshot").generation, 1);
    }

    #[tokio::test]
    async fn unchanged_catalog_reuses_vectors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = loaded(Box::new(CountingProvider {
            calls: Arc::clone(&calls),
        }));
        let cache = EmbeddingCache::new();

        cache
            .refresh(sample_catalog(), Some(&provider))
            .await
            .expect("first refresh");
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let second = cache
            .refresh(sample_catalog(), Some(&provider))
            .await
            .expect("second refresh");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(second.generation, 2);
        assert!(second.ready);

        let mut changed = sample_catalog();
        changed.courses.push(CatalogItem::new(3, "Física"));
        cache
            .refresh(changed, Some(&provider))
            .await
            .expect("third refresh");
        assert_eq!(calls.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn encode_failure_leaves_snapshot_not_ready() {
        let cache = EmbeddingCache::new();
        let provider = loaded(Box::new(FailingProvider));

        let snapshot = cache
            .refresh(sample_catalog(), Some(&provider))
            .await
            .expect("refresh degrades instead of failing");

        assert!(!snapshot.ready);
        assert!(snapshot.index(EntityKind::Course).is_none());
        assert_eq!(snapshot.catalog.courses.len(), 2);
        assert!(
            snapshot
                .encode_error
                .as_deref()
                .is_some_and(|reason| reason.contains("model offline"))
        );
    }

    #[tokio::test]
    async fn refresh_without_provider_keeps_catalog_only() {
        let cache = EmbeddingCache::new();
        let snapshot = cache.refresh(sample_catalog(), None).await.expect("refresh");

        assert!(!snapshot.ready);
        assert!(snapshot.provider_name.is_none());
        assert_eq!(snapshot.catalog.topics.len(), 1);
    }
}
