use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use aula_config::AulaConfig;
use aula_core::{
    AggregatedQuery, Catalog, CatalogId, CatalogProvider, EntityKind,
    FALLBACK_EMBEDDINGS_DISABLED, FALLBACK_INDEX_NOT_READY, FALLBACK_MODEL_UNAVAILABLE,
    PredictionResult, RawSearchRecord, Recommendations, SearchHistoryProvider, TrendCount,
};
use aula_infer::{CacheSnapshot, EmbeddingCache, LoadedEmbeddingProvider};
use chrono::{DateTime, Utc};

use crate::trends::{aggregate, aggregate_counts, parse_search_history, within_window};
use crate::{
    ContextHint, PopularityScorer, RankError, RelatedCourseRecommender,
    RelatedResourceRecommender, RelatedTopicRecommender, SemanticView,
};

const POPULARITY_ENTITIES: [EntityKind; 3] =
    [EntityKind::Course, EntityKind::Topic, EntityKind::Resource];

/// Entry point for callers. Scoring reads the catalog of the current cache
/// snapshot, so `refresh` must run before predictions see any data.
#[derive(Debug)]
pub struct RankingService {
    config: AulaConfig,
    cache: Arc<EmbeddingCache>,
    provider: Option<LoadedEmbeddingProvider>,
}

impl RankingService {
    pub fn new(config: AulaConfig, provider: Option<LoadedEmbeddingProvider>) -> Self {
        Self::with_cache(config, provider, Arc::new(EmbeddingCache::new()))
    }

    pub fn with_cache(
        config: AulaConfig,
        provider: Option<LoadedEmbeddingProvider>,
        cache: Arc<EmbeddingCache>,
    ) -> Self {
        Self {
            config,
            cache,
            provider,
        }
    }

    pub fn config(&self) -> &AulaConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    pub async fn refresh(&self, catalog: Catalog) -> Result<Arc<CacheSnapshot>, RankError> {
        Ok(self.cache.refresh(catalog, self.provider.as_ref()).await?)
    }

    pub async fn refresh_from(
        &self,
        source: &dyn CatalogProvider,
    ) -> Result<Arc<CacheSnapshot>, RankError> {
        let catalog = source.load_catalog()?;
        self.refresh(catalog).await
    }

    pub async fn predict_popular(
        &self,
        entity: EntityKind,
        trends: &[AggregatedQuery],
    ) -> Result<PredictionResult, RankError> {
        let snapshot = self.cache.snapshot()?;
        let queries = trends.iter().map(AggregatedQuery::query).collect::<Vec<_>>();
        let (vectors, fallback_reason) = self.resolve_vectors(&snapshot, entity, &queries).await?;
        let view = semantic_view(&snapshot, entity, vectors.as_ref());

        let scorer = PopularityScorer::from_config(entity, &self.config);
        let mut result = scorer.predict(&snapshot.catalog, trends, view.as_ref())?;
        result.fallback_reason = fallback_reason;
        Ok(result)
    }

    pub async fn predict_popular_course(
        &self,
        trends: &[AggregatedQuery],
    ) -> Result<PredictionResult, RankError> {
        self.predict_popular(EntityKind::Course, trends).await
    }

    pub async fn predict_popular_topic(
        &self,
        trends: &[AggregatedQuery],
    ) -> Result<PredictionResult, RankError> {
        self.predict_popular(EntityKind::Topic, trends).await
    }

    pub async fn predict_popular_resource(
        &self,
        trends: &[AggregatedQuery],
    ) -> Result<PredictionResult, RankError> {
        self.predict_popular(EntityKind::Resource, trends).await
    }

    /// Parses, windows and aggregates raw history with the entity's decay rate.
    pub async fn predict_popular_from_history(
        &self,
        entity: EntityKind,
        records: &[RawSearchRecord],
        now: DateTime<Utc>,
    ) -> Result<PredictionResult, RankError> {
        let parsed = parse_search_history(records);
        let events = within_window(parsed.events, self.config.trends.window_days, now);
        let lambda = self.config.popularity_tuning(entity).decay_lambda;
        let trends = aggregate(&events, lambda, now);
        self.predict_popular(entity, &trends).await
    }

    pub async fn predict_popular_from_counts(
        &self,
        entity: EntityKind,
        counts: &[TrendCount],
    ) -> Result<PredictionResult, RankError> {
        let trends = aggregate_counts(counts, self.config.trends.count_only_weight);
        self.predict_popular(entity, &trends).await
    }

    /// Course, topic and resource predictions from one history load.
    pub async fn predict_all(
        &self,
        source: &dyn SearchHistoryProvider,
        now: DateTime<Utc>,
    ) -> Result<Vec<PredictionResult>, RankError> {
        let records = source.load_history(self.config.trends.window_days)?;
        let mut results = Vec::with_capacity(POPULARITY_ENTITIES.len());
        for entity in POPULARITY_ENTITIES {
            results.push(
                self.predict_popular_from_history(entity, &records, now)
                    .await?,
            );
        }
        Ok(results)
    }

    pub async fn recommend_related_courses(
        &self,
        query: &str,
        direct_ids: &[CatalogId],
        hint: &ContextHint,
    ) -> Result<Recommendations, RankError> {
        let snapshot = self.cache.snapshot()?;
        let (vectors, fallback_reason) = self
            .resolve_vectors(&snapshot, EntityKind::Course, &[query])
            .await?;
        let view = semantic_view(&snapshot, EntityKind::Course, vectors.as_ref());

        let mut result = RelatedCourseRecommender::new(&self.config.related_courses).recommend(
            query,
            direct_ids,
            &snapshot.catalog,
            view.as_ref(),
            hint,
        )?;
        result.fallback_reason = fallback_reason;
        Ok(result)
    }

    pub async fn recommend_related_topics(
        &self,
        query: &str,
        direct_ids: &[CatalogId],
    ) -> Result<Recommendations, RankError> {
        let snapshot = self.cache.snapshot()?;
        let (vectors, fallback_reason) = self
            .resolve_vectors(&snapshot, EntityKind::Topic, &[query])
            .await?;
        let view = semantic_view(&snapshot, EntityKind::Topic, vectors.as_ref());

        let recommender = RelatedTopicRecommender::new(
            &self.config.related_topics,
            &self.config.related_courses,
        );
        let mut result =
            recommender.recommend(query, direct_ids, &snapshot.catalog, view.as_ref())?;
        result.fallback_reason = fallback_reason;
        Ok(result)
    }

    /// Courses and resources in one list, each item tagged with its kind.
    pub async fn recommend_related_resources(
        &self,
        query: &str,
        direct_ids: &[CatalogId],
    ) -> Result<Recommendations, RankError> {
        let snapshot = self.cache.snapshot()?;
        let (vectors, fallback_reason) = self
            .resolve_vectors(&snapshot, EntityKind::Resource, &[query])
            .await?;
        let courses = semantic_view(&snapshot, EntityKind::Course, vectors.as_ref());
        let resources = semantic_view(&snapshot, EntityKind::Resource, vectors.as_ref());

        let mut result = RelatedResourceRecommender::new(&self.config.related_resources)
            .recommend(
                query,
                direct_ids,
                &snapshot.catalog,
                courses.as_ref(),
                resources.as_ref(),
            )?;
        result.fallback_reason = fallback_reason;
        Ok(result)
    }

    /// Query vectors, or the fallback code explaining why scoring is lexical.
    async fn resolve_vectors(
        &self,
        snapshot: &CacheSnapshot,
        entity: EntityKind,
        queries: &[&str],
    ) -> Result<(Option<HashMap<String, Vec<f32>>>, Option<String>), RankError> {
        match self.encode_queries(snapshot, entity, queries).await {
            Ok(vectors) => Ok((Some(vectors), None)),
            Err(RankError::ModelUnavailable(reason)) => Ok((None, Some(reason))),
            Err(err) => Err(err),
        }
    }

    async fn encode_queries(
        &self,
        snapshot: &CacheSnapshot,
        entity: EntityKind,
        queries: &[&str],
    ) -> Result<HashMap<String, Vec<f32>>, RankError> {
        let Some(loaded) = self.provider.as_ref() else {
            return Err(RankError::ModelUnavailable(
                FALLBACK_EMBEDDINGS_DISABLED.to_owned(),
            ));
        };
        if !snapshot.ready || snapshot.index(entity).is_none() {
            let reason = if snapshot.encode_error.is_some() {
                FALLBACK_MODEL_UNAVAILABLE
            } else {
                FALLBACK_INDEX_NOT_READY
            };
            return Err(RankError::ModelUnavailable(reason.to_owned()));
        }

        let unique = queries
            .iter()
            .filter(|query| !query.trim().is_empty())
            .map(|query| (*query).to_owned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        if unique.is_empty() {
            return Ok(HashMap::new());
        }

        let vectors = loaded.provider.embed_batch(&unique).await.map_err(|err| {
            tracing::warn!(
                provider = %loaded.provider_name,
                model = %loaded.model_name,
                error = %err,
                "query encoding failed, falling back to lexical scoring"
            );
            RankError::ModelUnavailable(FALLBACK_MODEL_UNAVAILABLE.to_owned())
        })?;
        if vectors.len() != unique.len() {
            tracing::warn!(
                expected = unique.len(),
                actual = vectors.len(),
                "embedding batch returned the wrong number of vectors"
            );
            return Err(RankError::ModelUnavailable(
                FALLBACK_MODEL_UNAVAILABLE.to_owned(),
            ));
        }

        Ok(unique.into_iter().zip(vectors).collect())
    }
}

fn semantic_view<'a>(
    snapshot: &'a CacheSnapshot,
    entity: EntityKind,
    vectors: Option<&'a HashMap<String, Vec<f32>>>,
) -> Option<SemanticView<'a>> {
    let vectors = vectors?;
    snapshot
        .index(entity)
        .map(|index| SemanticView::new(index, vectors))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use aula_core::{CatalogItem, ScoringMode, StaticCatalog, StaticSearchHistory, Topic};
    use aula_infer::{EmbeddingProvider, InferError, MockEmbeddingProvider};
    use chrono::{Duration, TimeZone};

    use super::*;

    struct OfflineAfterRefresh;

    #[async_trait]
    impl EmbeddingProvider for OfflineAfterRefresh {
        async fn embed_text(&self, text: &str) -> Result<Vec<f32>, InferError> {
            if text.starts_with("query:") {
                return Err(InferError::ModelUnavailable("offline".to_owned()));
            }
            MockEmbeddingProvider.embed_text(text).await
        }
    }

    fn loaded(provider: Box<dyn EmbeddingProvider>) -> LoadedEmbeddingProvider {
        LoadedEmbeddingProvider {
            provider,
            provider_name: "mock".to_owned(),
            model_name: "mock-64d".to_owned(),
        }
    }

    fn catalog() -> Catalog {
        Catalog::new(
            vec![
                CatalogItem::new(1, "Álgebra Lineal").with_topics(&["Matrices"]),
                CatalogItem::new(2, "Redes de Computadoras").with_topics(&["Redes"]),
                CatalogItem::new(3, "Seguridad en Redes").with_topics(&["Redes"]),
            ],
            vec![Topic::new(10, "Matrices"), Topic::new(11, "Redes")],
        )
        .with_resources(vec![CatalogItem::new(50, "Manual de Álgebra")])
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    #[tokio::test]
    async fn predictions_before_refresh_are_insufficient_data() {
        let service = RankingService::new(AulaConfig::default(), None);
        let trends = vec![AggregatedQuery::with_weight("algebra lineal", 70, 70.0)];

        let result = service
            .predict_popular_course(&trends)
            .await
            .expect("predict");
        assert!(result.is_null());
        assert_eq!(
            result.fallback_reason.as_deref(),
            Some(FALLBACK_EMBEDDINGS_DISABLED)
        );
    }

    #[tokio::test]
    async fn hybrid_prediction_with_mock_embeddings() {
        let service = RankingService::new(
            AulaConfig::default(),
            Some(loaded(Box::new(MockEmbeddingProvider))),
        );
        service.refresh(catalog()).await.expect("refresh");
        let trends = vec![AggregatedQuery::with_weight("algebra lineal", 70, 70.0)];

        let result = service
            .predict_popular_course(&trends)
            .await
            .expect("predict");
        assert_eq!(result.predicted_name.as_deref(), Some("Álgebra Lineal"));
        assert_eq!(result.mode_used, ScoringMode::Hybrid);
        assert_eq!(result.fallback_reason, None);
        assert!(result.confidence > 0.5);

        let resource = service
            .predict_popular_resource(&[AggregatedQuery::with_weight("manual de algebra", 3, 3.0)])
            .await
            .expect("predict resource");
        assert_eq!(resource.predicted_id, Some(50));
    }

    #[tokio::test]
    async fn query_encoding_failure_reports_model_unavailable() {
        let service = RankingService::new(
            AulaConfig::default(),
            Some(loaded(Box::new(OfflineAfterRefresh))),
        );
        service.refresh(catalog()).await.expect("refresh");

        let result = service
            .recommend_related_courses("query: redes", &[], &ContextHint::default())
            .await
            .expect("recommend");
        assert_eq!(result.mode_used, ScoringMode::Lexical);
        assert_eq!(
            result.fallback_reason.as_deref(),
            Some(FALLBACK_MODEL_UNAVAILABLE)
        );
        assert_eq!(result.ids(), vec![2, 3]);
    }

    #[tokio::test]
    async fn history_pipeline_windows_and_decays() {
        let service = RankingService::new(AulaConfig::default(), None);
        service
            .refresh_from(&StaticCatalog::new(catalog()))
            .await
            .expect("refresh");

        let record = |query: &str, days_ago: i64| RawSearchRecord {
            query: Some(query.to_owned()),
            timestamp: Some((now() - Duration::days(days_ago)).to_rfc3339()),
            results_count: None,
        };
        let mut records = (0..6).map(|_| record("redes", 1)).collect::<Vec<_>>();
        records.extend((0..40).map(|_| record("algebra lineal", 90)));
        records.push(RawSearchRecord::default());

        let results = service
            .predict_all(&StaticSearchHistory::new(records), now())
            .await
            .expect("predict all");

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].entity, EntityKind::Course);
        assert_eq!(results[0].predicted_id, Some(2));
        assert_eq!(results[0].search_count, 6);
        assert_eq!(results[1].predicted_name.as_deref(), Some("Redes"));
        assert!(results[2].is_null());
    }

    #[tokio::test]
    async fn count_only_trends_use_configured_weight() {
        let service = RankingService::new(AulaConfig::default(), None);
        service.refresh(catalog()).await.expect("refresh");

        let counts = vec![TrendCount {
            query: "seguridad en redes".to_owned(),
            count: 30,
        }];
        let result = service
            .predict_popular_from_counts(EntityKind::Course, &counts)
            .await
            .expect("predict");

        assert_eq!(result.predicted_id, Some(3));
        assert_eq!(result.search_count, 30);
    }

    #[tokio::test]
    async fn related_resources_mix_courses_and_resources() {
        let service = RankingService::new(
            AulaConfig::default(),
            Some(loaded(Box::new(MockEmbeddingProvider))),
        );
        service.refresh(catalog()).await.expect("refresh");

        let hybrid = service
            .recommend_related_resources("manual de algebra", &[2])
            .await
            .expect("recommend");
        assert_eq!(hybrid.mode_used, ScoringMode::Hybrid);
        assert_eq!(hybrid.fallback_reason, None);
        assert!(hybrid.items.len() <= 6);
        assert!(!hybrid.ids().contains(&2));
        assert!(
            hybrid
                .items
                .iter()
                .any(|item| item.kind == EntityKind::Resource && item.id == Some(50))
        );

        let lexical = RankingService::new(AulaConfig::default(), None);
        lexical.refresh(catalog()).await.expect("refresh");
        let result = lexical
            .recommend_related_resources("algebra", &[])
            .await
            .expect("recommend");
        assert_eq!(
            result.fallback_reason.as_deref(),
            Some(FALLBACK_EMBEDDINGS_DISABLED)
        );
        assert_eq!(result.ids(), vec![1, 50]);
        assert_eq!(result.items[0].kind, EntityKind::Course);
        assert_eq!(result.items[1].kind, EntityKind::Resource);
    }

    #[tokio::test]
    async fn related_topics_fall_back_when_index_not_ready() {
        let service = RankingService::new(
            AulaConfig::default(),
            Some(loaded(Box::new(MockEmbeddingProvider))),
        );

        let result = service
            .recommend_related_topics("redes", &[])
            .await
            .expect("recommend");
        assert_eq!(
            result.fallback_reason.as_deref(),
            Some(FALLBACK_INDEX_NOT_READY)
        );
        assert!(result.items.is_empty());
    }
}
