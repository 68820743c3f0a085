use std::collections::HashSet;

use aula_config::{RelatedCoursesConfig, RelatedTopicsConfig};
use aula_core::{
    Catalog, CatalogId, CatalogItem, EntityKind, Recommendations, ScoredItem, ScoringMode,
};
use aula_text::{normalize, tokenize};

use crate::confidence::{ratio_confidence, round_confidence};
use crate::related_courses::{is_generic_career, top_n};
use crate::{RankError, SemanticView};

/// Topics related to a live query. Direct results supply context topics
/// first; catalog scoring fills any remaining slots.
#[derive(Debug, Clone, Copy)]
pub struct RelatedTopicRecommender<'a> {
    config: &'a RelatedTopicsConfig,
    generic_careers: &'a [String],
}

impl<'a> RelatedTopicRecommender<'a> {
    pub fn new(config: &'a RelatedTopicsConfig, courses: &'a RelatedCoursesConfig) -> Self {
        Self {
            config,
            generic_careers: &courses.generic_careers,
        }
    }

    pub fn recommend(
        &self,
        query: &str,
        direct_ids: &[CatalogId],
        catalog: &Catalog,
        semantic: Option<&SemanticView<'_>>,
    ) -> Result<Recommendations, RankError> {
        if let Some(view) = semantic {
            view.ensure_aligned(EntityKind::Topic, &catalog.candidate_ids(EntityKind::Topic))?;
        }
        let similarities = semantic.and_then(|view| view.similarities(query));
        let mode_used = if similarities.is_some() {
            ScoringMode::Hybrid
        } else {
            ScoringMode::Lexical
        };

        let normalized_query = normalize(query);
        let mut items = self.contextual(&normalized_query, direct_ids, catalog);
        if items.len() >= self.config.contextual_short_circuit {
            return Ok(Recommendations {
                mode_used,
                fallback_reason: None,
                items,
            });
        }

        let mut seen = items
            .iter()
            .map(|item| normalize(&item.name))
            .collect::<HashSet<_>>();
        for item in self.scored(query, &normalized_query, catalog, similarities.as_deref()) {
            if items.len() >= self.config.limit {
                break;
            }
            if seen.insert(normalize(&item.name)) {
                items.push(item);
            }
        }

        items.retain(|item| normalize(&item.name) != normalized_query);

        Ok(Recommendations {
            mode_used,
            fallback_reason: None,
            items,
        })
    }

    fn contextual(
        &self,
        normalized_query: &str,
        direct_ids: &[CatalogId],
        catalog: &Catalog,
    ) -> Vec<ScoredItem> {
        let confidence =
            round_confidence(self.config.contextual_confidence, self.config.confidence_cap);
        let mut seen = HashSet::new();
        let mut items = Vec::new();

        for id in direct_ids {
            let Some(course) = catalog.course(*id) else {
                continue;
            };
            for topic in &course.topics {
                let normalized = normalize(topic);
                if normalized.is_empty() || normalized == normalized_query {
                    continue;
                }
                if items.len() >= self.config.limit {
                    return items;
                }
                if !seen.insert(normalized.clone()) {
                    continue;
                }
                items.push(ScoredItem {
                    id: topic_id(catalog, &normalized),
                    kind: EntityKind::Topic,
                    name: topic.clone(),
                    score: confidence * 100.0,
                    confidence,
                    supporting_evidence: vec![format!("topic:{}", course.name)],
                });
            }
        }

        items
    }

    fn scored(
        &self,
        query: &str,
        normalized_query: &str,
        catalog: &Catalog,
        similarities: Option<&[f64]>,
    ) -> Vec<ScoredItem> {
        let config = self.config;
        let query_tokens = tokenize(query);
        let career_courses = self.courses_for_careers_in_query(normalized_query, catalog);

        let scored = catalog
            .topics
            .iter()
            .enumerate()
            .filter_map(|(row, topic)| {
                let normalized = normalize(&topic.name);
                if normalized.is_empty() || normalized == normalized_query {
                    return None;
                }

                let mut score = 0.0;
                let mut evidence = Vec::new();

                if let Some(similarities) = similarities {
                    let raw = similarities
                        .get(row)
                        .copied()
                        .unwrap_or_default()
                        .clamp(0.0, 1.0);
                    score += raw * config.semantic_scale;
                    evidence.push(format!("semantic:{raw:.2}"));
                }

                for (course, career) in &career_courses {
                    if course.topics.iter().any(|name| normalize(name) == normalized) {
                        score += config.career_boost;
                        evidence.push(format!("career:{career}"));
                    }
                }

                if self.is_literal_match(normalized_query, &normalized) {
                    score += config.substring_bonus;
                    evidence.push("substring:topic".to_owned());
                }

                if similarities.is_none() {
                    let shared = query_tokens.shared(&tokenize(&topic.name));
                    score += config.lexical_overlap_points * shared.len() as f64;
                    evidence.extend(shared.into_iter().map(|token| format!("name:{token}")));
                }

                (score > config.keep_above).then(|| ScoredItem {
                    id: Some(topic.id),
                    kind: EntityKind::Topic,
                    name: topic.name.clone(),
                    score,
                    confidence: ratio_confidence(
                        score,
                        config.confidence_scale,
                        config.confidence_cap,
                    ),
                    supporting_evidence: evidence,
                })
            })
            .collect::<Vec<_>>();

        top_n(scored, config.limit)
    }

    /// Courses with a specific career whose name appears in the query.
    fn courses_for_careers_in_query<'c>(
        &self,
        normalized_query: &str,
        catalog: &'c Catalog,
    ) -> Vec<(&'c CatalogItem, &'c str)> {
        if normalized_query.is_empty() {
            return Vec::new();
        }

        let mut pairs = Vec::new();
        for course in &catalog.courses {
            let mentioned = course.careers.iter().find(|career| {
                let normalized = normalize(&career.name);
                !normalized.is_empty()
                    && !is_generic_career(self.generic_careers, &career.name)
                    && normalized_query.contains(&normalized)
            });
            if let Some(career) = mentioned {
                pairs.push((course, career.name.as_str()));
            }
        }
        pairs
    }

    fn is_literal_match(&self, normalized_query: &str, normalized_topic: &str) -> bool {
        let min = self.config.min_substring_len;
        (normalized_query.chars().count() > min && normalized_topic.contains(normalized_query))
            || (normalized_topic.chars().count() > min
                && normalized_query.contains(normalized_topic))
    }
}

fn topic_id(catalog: &Catalog, normalized: &str) -> Option<CatalogId> {
    catalog
        .topics
        .iter()
        .find(|topic| normalize(&topic.name) == normalized)
        .map(|topic| topic.id)
}
