use std::collections::HashSet;

use aula_config::RelatedResourcesConfig;
use aula_core::{
    Catalog, CatalogId, CatalogItem, EntityKind, Recommendations, ScoredItem, ScoringMode,
};
use aula_text::{normalize, tokenize};

use crate::confidence::ratio_confidence;
use crate::related_courses::top_n;
use crate::{RankError, SemanticView};

/// One mixed list of courses and resources related to a live query. Every
/// item carries its kind so callers can render the two apart.
#[derive(Debug, Clone, Copy)]
pub struct RelatedResourceRecommender<'a> {
    config: &'a RelatedResourcesConfig,
}

impl<'a> RelatedResourceRecommender<'a> {
    pub fn new(config: &'a RelatedResourcesConfig) -> Self {
        Self { config }
    }

    /// `courses` and `resources` are the semantic views over each set. When
    /// neither yields query similarities both sets are scored lexically.
    pub fn recommend(
        &self,
        query: &str,
        direct_ids: &[CatalogId],
        catalog: &Catalog,
        courses: Option<&SemanticView<'_>>,
        resources: Option<&SemanticView<'_>>,
    ) -> Result<Recommendations, RankError> {
        if let Some(view) = courses {
            view.ensure_aligned(EntityKind::Course, &catalog.candidate_ids(EntityKind::Course))?;
        }
        if let Some(view) = resources {
            view.ensure_aligned(
                EntityKind::Resource,
                &catalog.candidate_ids(EntityKind::Resource),
            )?;
        }

        let course_scores = courses.and_then(|view| view.similarities(query));
        let resource_scores = resources.and_then(|view| view.similarities(query));
        let mode_used = if course_scores.is_some() || resource_scores.is_some() {
            ScoringMode::Hybrid
        } else {
            ScoringMode::Lexical
        };

        let normalized_query = normalize(query);
        if normalized_query.is_empty() {
            return Ok(Recommendations::empty(mode_used));
        }

        let excluded = direct_ids.iter().copied().collect::<HashSet<_>>();
        let sets = [
            (EntityKind::Course, &catalog.courses, course_scores),
            (EntityKind::Resource, &catalog.resources, resource_scores),
        ];

        let mut items = Vec::new();
        for (kind, set, similarities) in sets {
            let pool = match (mode_used, similarities) {
                (ScoringMode::Hybrid, Some(similarities)) => {
                    self.semantic_ranked(kind, set, &excluded, &similarities)
                }
                (ScoringMode::Hybrid, None) => Vec::new(),
                (ScoringMode::Lexical, _) => {
                    self.lexical_ranked(kind, set, &excluded, query, &normalized_query)
                }
            };
            items.extend(top_n(pool, self.config.per_kind_pool));
        }

        Ok(Recommendations {
            mode_used,
            fallback_reason: None,
            items: top_n(items, self.config.limit),
        })
    }

    fn semantic_ranked(
        &self,
        kind: EntityKind,
        set: &[CatalogItem],
        excluded: &HashSet<CatalogId>,
        similarities: &[f64],
    ) -> Vec<ScoredItem> {
        let config = self.config;
        set.iter()
            .zip(similarities.iter().copied())
            .filter(|(item, _)| !excluded.contains(&item.id))
            .filter_map(|(item, similarity)| {
                let raw = similarity.clamp(0.0, 1.0);
                let score = raw * config.semantic_scale;
                (score > config.keep_above).then(|| {
                    self.scored(kind, item, score, vec![format!("semantic:{raw:.2}")])
                })
            })
            .collect()
    }

    fn lexical_ranked(
        &self,
        kind: EntityKind,
        set: &[CatalogItem],
        excluded: &HashSet<CatalogId>,
        query: &str,
        normalized_query: &str,
    ) -> Vec<ScoredItem> {
        let config = self.config;
        let query_tokens = tokenize(query);
        let query_is_literal = normalized_query.chars().count() > config.min_substring_len;

        set.iter()
            .filter(|item| !excluded.contains(&item.id))
            .filter_map(|item| {
                let mut text_tokens = tokenize(&item.name);
                for topic in &item.topics {
                    text_tokens.union_with(&tokenize(topic));
                }
                let shared = query_tokens.shared(&text_tokens);

                let mut score = config.lexical_overlap_points * shared.len() as f64;
                let mut evidence = shared
                    .into_iter()
                    .map(|token| format!("name:{token}"))
                    .collect::<Vec<_>>();
                if query_is_literal && normalize(&item.name).contains(normalized_query) {
                    score += config.substring_bonus;
                    evidence.push("substring:name".to_owned());
                }

                (score > config.keep_above).then(|| self.scored(kind, item, score, evidence))
            })
            .collect()
    }

    fn scored(
        &self,
        kind: EntityKind,
        item: &CatalogItem,
        score: f64,
        supporting_evidence: Vec<String>,
    ) -> ScoredItem {
        ScoredItem {
            id: Some(item.id),
            kind,
            name: item.name.clone(),
            score,
            confidence: ratio_confidence(
                score,
                self.config.confidence_scale,
                self.config.confidence_cap,
            ),
            supporting_evidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use aula_infer::SemanticIndex;

    use super::*;

    fn catalog() -> Catalog {
        Catalog::new(
            vec![
                CatalogItem::new(101, "Redes de Computadoras").with_topics(&["Protocolos"]),
                CatalogItem::new(102, "Seguridad en Redes"),
                CatalogItem::new(103, "Contabilidad General"),
            ],
            Vec::new(),
        )
        .with_resources(vec![
            CatalogItem::new(900, "Manual de Redes"),
            CatalogItem::new(901, "Guía de Protocolos de Red"),
            CatalogItem::new(902, "Atlas de Anatomía"),
        ])
    }

    #[test]
    fn semantic_mode_mixes_kinds_and_skips_direct_results() {
        let config = RelatedResourcesConfig::default();
        let courses = SemanticIndex::new(
            vec![101, 102, 103],
            vec![vec![1.0, 0.0], vec![0.8, 0.6], vec![0.0, 1.0]],
        )
        .expect("course index");
        let resources = SemanticIndex::new(
            vec![900, 901, 902],
            vec![vec![0.9, 0.43589], vec![0.6, 0.8], vec![-1.0, 0.0]],
        )
        .expect("resource index");
        let vectors = HashMap::from([("redes".to_owned(), vec![1.0, 0.0])]);
        let course_view = SemanticView::new(&courses, &vectors);
        let resource_view = SemanticView::new(&resources, &vectors);

        let result = RelatedResourceRecommender::new(&config)
            .recommend(
                "redes",
                &[101],
                &catalog(),
                Some(&course_view),
                Some(&resource_view),
            )
            .expect("recommend");

        assert_eq!(result.mode_used, ScoringMode::Hybrid);
        assert_eq!(result.ids(), vec![900, 102, 901]);
        let kinds = result.items.iter().map(|item| item.kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![EntityKind::Resource, EntityKind::Course, EntityKind::Resource]
        );
        assert!((result.items[0].score - 90.0).abs() < 1e-2);
        assert_eq!(result.items[0].confidence, 0.9);
        assert_eq!(result.items[1].supporting_evidence, vec!["semantic:0.80".to_owned()]);
    }

    #[test]
    fn limit_and_per_kind_pool_bound_the_list() {
        let config = RelatedResourcesConfig {
            limit: 2,
            per_kind_pool: 1,
            ..RelatedResourcesConfig::default()
        };
        let courses =
            SemanticIndex::new(vec![101, 102, 103], vec![vec![1.0]; 3]).expect("course index");
        let resources =
            SemanticIndex::new(vec![900, 901, 902], vec![vec![1.0]; 3]).expect("resource index");
        let vectors = HashMap::from([("redes".to_owned(), vec![1.0])]);
        let course_view = SemanticView::new(&courses, &vectors);
        let resource_view = SemanticView::new(&resources, &vectors);

        let result = RelatedResourceRecommender::new(&config)
            .recommend(
                "redes",
                &[],
                &catalog(),
                Some(&course_view),
                Some(&resource_view),
            )
            .expect("recommend");

        assert_eq!(result.ids(), vec![101, 900]);
    }

    #[test]
    fn lexical_fallback_scores_shared_stems_and_substrings() {
        let config = RelatedResourcesConfig::default();
        let result = RelatedResourceRecommender::new(&config)
            .recommend("redes", &[102], &catalog(), None, None)
            .expect("recommend");

        assert_eq!(result.mode_used, ScoringMode::Lexical);
        // 900 and 101: one shared stem (20) + name substring (30); 901: "red" stem only.
        assert_eq!(result.ids(), vec![101, 900, 901]);
        assert_eq!(result.items[0].kind, EntityKind::Course);
        assert_eq!(result.items[1].kind, EntityKind::Resource);
        assert_eq!(result.items[0].score, 50.0);
        assert_eq!(result.items[2].score, 20.0);
        assert_eq!(result.items[0].confidence, 0.5);
    }

    #[test]
    fn blank_query_yields_nothing() {
        let config = RelatedResourcesConfig::default();
        let result = RelatedResourceRecommender::new(&config)
            .recommend("  ¿? ", &[], &catalog(), None, None)
            .expect("recommend");
        assert!(result.items.is_empty());
    }

    #[test]
    fn misaligned_resource_index_is_fatal() {
        let config = RelatedResourcesConfig::default();
        let resources = SemanticIndex::new(vec![901, 900, 902], vec![vec![1.0]; 3])
            .expect("resource index");
        let vectors = HashMap::new();
        let view = SemanticView::new(&resources, &vectors);

        let err = RelatedResourceRecommender::new(&config)
            .recommend("redes", &[], &catalog(), None, Some(&view))
            .expect_err("reordered index");
        assert!(matches!(
            err,
            RankError::IndexOrderMismatch {
                entity: EntityKind::Resource,
                row: 0,
                ..
            }
        ));
    }
}
