use std::collections::{BTreeSet, HashSet};

use aula_config::RelatedCoursesConfig;
use aula_core::{
    Catalog, CatalogId, CatalogItem, EntityKind, Recommendations, ScoredItem, ScoringMode,
};
use aula_text::{TokenSet, normalize, tokenize};
use serde::{Deserialize, Serialize};

use crate::confidence::ratio_confidence;
use crate::{RankError, SemanticView};

/// Caller-supplied areas and careers the user is browsing in, merged with
/// the context derived from direct results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextHint {
    #[serde(default)]
    pub areas: Vec<String>,
    #[serde(default)]
    pub careers: Vec<String>,
}

impl ContextHint {
    pub fn is_empty(&self) -> bool {
        self.areas.is_empty() && self.careers.is_empty()
    }
}

#[derive(Debug, Default)]
struct SourceContext {
    topics: BTreeSet<String>,
    careers: BTreeSet<String>,
    areas: BTreeSet<String>,
    name_tokens: TokenSet,
}

/// Courses related to a live query, excluding the ones already shown.
#[derive(Debug, Clone, Copy)]
pub struct RelatedCourseRecommender<'a> {
    config: &'a RelatedCoursesConfig,
}

impl<'a> RelatedCourseRecommender<'a> {
    pub fn new(config: &'a RelatedCoursesConfig) -> Self {
        Self { config }
    }

    pub fn recommend(
        &self,
        query: &str,
        direct_ids: &[CatalogId],
        catalog: &Catalog,
        semantic: Option<&SemanticView<'_>>,
        hint: &ContextHint,
    ) -> Result<Recommendations, RankError> {
        if let Some(view) = semantic {
            view.ensure_aligned(EntityKind::Course, &catalog.candidate_ids(EntityKind::Course))?;
        }
        let similarities = semantic.and_then(|view| view.similarities(query));
        let mode_used = if similarities.is_some() {
            ScoringMode::Hybrid
        } else {
            ScoringMode::Lexical
        };

        let excluded = direct_ids.iter().copied().collect::<HashSet<_>>();
        if excluded.len() > self.config.max_direct_results {
            tracing::debug!(
                direct_results = excluded.len(),
                bound = self.config.max_direct_results,
                "direct results too diffuse for related courses"
            );
            return Ok(Recommendations::empty(mode_used));
        }

        let context = self.source_context(direct_ids, catalog, hint);
        let mut items = Vec::new();

        if !excluded.is_empty() {
            items = self.context_ranked(catalog, &excluded, &context);
        }

        if let Some(similarities) = similarities.as_deref() {
            let semantic_items =
                self.semantic_ranked(query, catalog, &excluded, &context, similarities);
            let mut seen = items.iter().filter_map(|item| item.id).collect::<HashSet<_>>();
            for item in semantic_items {
                if items.len() >= self.config.limit {
                    break;
                }
                if item.id.is_some_and(|id| seen.insert(id)) {
                    items.push(item);
                }
            }
        }

        if items.is_empty() && excluded.is_empty() && similarities.is_none() {
            items = self.lexical_ranked(query, catalog);
        }

        Ok(Recommendations {
            mode_used,
            fallback_reason: None,
            items,
        })
    }

    fn source_context(
        &self,
        direct_ids: &[CatalogId],
        catalog: &Catalog,
        hint: &ContextHint,
    ) -> SourceContext {
        let mut context = SourceContext::default();
        for id in direct_ids {
            let Some(item) = catalog.course(*id) else {
                continue;
            };
            context
                .topics
                .extend(item.topics.iter().map(|topic| normalize(topic)));
            for career in &item.careers {
                if let Some(area) = career.area.as_deref() {
                    context.areas.insert(normalize(area));
                }
                if !self.is_generic_career(&career.name) {
                    context.careers.insert(normalize(&career.name));
                }
            }
            context.name_tokens.union_with(&tokenize(&item.name));
        }

        context
            .areas
            .extend(hint.areas.iter().map(|area| normalize(area)));
        context.careers.extend(
            hint.careers
                .iter()
                .filter(|career| !self.is_generic_career(career))
                .map(|career| normalize(career)),
        );
        context.topics.remove("");
        context.areas.remove("");
        context.careers.remove("");
        context
    }

    fn context_ranked(
        &self,
        catalog: &Catalog,
        excluded: &HashSet<CatalogId>,
        context: &SourceContext,
    ) -> Vec<ScoredItem> {
        let config = self.config;
        let scored = catalog
            .courses
            .iter()
            .filter(|course| !excluded.contains(&course.id))
            .filter_map(|course| {
                let mut evidence = Vec::new();

                let topic_matches = course
                    .topics
                    .iter()
                    .filter(|topic| context.topics.contains(&normalize(topic)))
                    .inspect(|topic| evidence.push(format!("topic:{topic}")))
                    .count();
                let career_matches = self
                    .specific_careers(course)
                    .filter(|career| context.careers.contains(&normalize(career)))
                    .inspect(|career| evidence.push(format!("career:{career}")))
                    .count();
                let shared_name = tokenize(&course.name).shared(&context.name_tokens);
                let name_matches = shared_name.len();
                evidence.extend(shared_name.into_iter().map(|token| format!("name:{token}")));

                let mut score = config.topic_weight * topic_matches as f64
                    + config.career_weight * career_matches as f64
                    + config.name_weight * name_matches as f64;
                if topic_matches > 0 && career_matches > 0 {
                    score *= config.topic_career_coherence;
                }
                if career_matches > 0 && name_matches > 0 {
                    score *= config.career_name_coherence;
                }

                (score > 0.0).then(|| ScoredItem {
                    id: Some(course.id),
                    kind: EntityKind::Course,
                    name: course.name.clone(),
                    score,
                    confidence: ratio_confidence(
                        score,
                        config.context_confidence_scale,
                        config.confidence_cap,
                    ),
                    supporting_evidence: evidence,
                })
            })
            .collect::<Vec<_>>();

        top_n(scored, config.limit)
    }

    fn semantic_ranked(
        &self,
        query: &str,
        catalog: &Catalog,
        excluded: &HashSet<CatalogId>,
        context: &SourceContext,
        similarities: &[f64],
    ) -> Vec<ScoredItem> {
        let config = self.config;
        let normalized_query = normalize(query);
        let query_is_literal = normalized_query.chars().count() > config.min_substring_len;

        let scored = catalog
            .courses
            .iter()
            .zip(similarities.iter().copied())
            .filter(|(course, _)| !excluded.contains(&course.id))
            .filter_map(|(course, similarity)| {
                let raw = similarity.clamp(0.0, 1.0);
                let mut score = raw * config.semantic_scale + raw * config.semantic_bonus_scale;
                let mut evidence = vec![format!("semantic:{raw:.2}")];

                let in_name =
                    query_is_literal && normalize(&course.name).contains(&normalized_query);
                if score < config.semantic_floor {
                    if !in_name {
                        return None;
                    }
                    score = config.substring_rescue_score;
                }

                let matched_area = course
                    .careers
                    .iter()
                    .filter_map(|career| career.area.as_deref())
                    .find(|area| context.areas.contains(&normalize(area)));
                if let Some(area) = matched_area {
                    score += config.area_boost;
                    evidence.push(format!("area:{area}"));
                } else if !context.areas.is_empty()
                    && course.careers.iter().any(|career| career.area.is_some())
                    && score < config.unrelated_area_ceiling
                {
                    score -= config.unrelated_area_penalty;
                }

                if let Some(career) = self
                    .specific_careers(course)
                    .find(|career| context.careers.contains(&normalize(career)))
                {
                    score += config.career_boost;
                    evidence.push(format!("career:{career}"));
                }

                if in_name {
                    score += config.name_substring_boost;
                    evidence.push("substring:name".to_owned());
                }
                if query_is_literal
                    && course
                        .topics
                        .iter()
                        .any(|topic| normalize(topic).contains(&normalized_query))
                {
                    score += config.topic_substring_boost;
                    evidence.push("substring:topic".to_owned());
                }

                (score > config.keep_above).then(|| ScoredItem {
                    id: Some(course.id),
                    kind: EntityKind::Course,
                    name: course.name.clone(),
                    score,
                    confidence: ratio_confidence(
                        score,
                        config.semantic_confidence_scale,
                        config.confidence_cap,
                    ),
                    supporting_evidence: evidence,
                })
            })
            .collect::<Vec<_>>();

        top_n(scored, config.semantic_limit)
    }

    fn lexical_ranked(&self, query: &str, catalog: &Catalog) -> Vec<ScoredItem> {
        let config = self.config;
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let scored = catalog
            .courses
            .iter()
            .filter_map(|course| {
                let name_tokens = tokenize(&course.name);
                let mut text_tokens = name_tokens.clone();
                for topic in &course.topics {
                    text_tokens.union_with(&tokenize(topic));
                }

                let shared = query_tokens.shared(&text_tokens);
                if shared.is_empty() {
                    return None;
                }
                let mut score = shared.len() as f64;
                if query_tokens.intersection_count(&name_tokens) > 0 {
                    score += config.lexical_name_bonus;
                }

                Some(ScoredItem {
                    id: Some(course.id),
                    kind: EntityKind::Course,
                    name: course.name.clone(),
                    score,
                    confidence: ratio_confidence(
                        score,
                        config.lexical_confidence_scale,
                        config.confidence_cap,
                    ),
                    supporting_evidence: shared
                        .into_iter()
                        .map(|token| format!("name:{token}"))
                        .collect(),
                })
            })
            .collect::<Vec<_>>();

        top_n(scored, config.lexical_limit)
    }

    fn specific_careers<'c>(&self, course: &'c CatalogItem) -> impl Iterator<Item = &'c str> {
        course
            .careers
            .iter()
            .map(|career| career.name.as_str())
            .filter(move |name| !self.is_generic_career(name))
    }

    fn is_generic_career(&self, name: &str) -> bool {
        is_generic_career(&self.config.generic_careers, name)
    }
}

pub(crate) fn is_generic_career(generic_careers: &[String], name: &str) -> bool {
    let normalized = normalize(name);
    generic_careers
        .iter()
        .any(|generic| normalize(generic) == normalized)
}

/// Sorts by score descending, breaking ties by id, and keeps `limit` items.
pub(crate) fn top_n(mut items: Vec<ScoredItem>, limit: usize) -> Vec<ScoredItem> {
    items.sort_by(|left, right| {
        right
            .score
            .partial_cmp(&left.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| left.id.cmp(&right.id))
            .then_with(|| left.kind.cmp(&right.kind))
            .then_with(|| left.name.cmp(&right.name))
    });
    items.truncate(limit);
    items
}
