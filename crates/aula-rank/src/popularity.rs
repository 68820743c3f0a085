use aula_config::{AulaConfig, CalibrationStrategy, PopularityTuning};
use aula_core::{AggregatedQuery, Catalog, EntityKind, PredictionResult, ScoringMode};
use aula_text::{TokenSet, is_normalized_substring, jaccard, normalize, tokenize};

use crate::confidence::calibrate;
use crate::{RankError, SemanticView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum LexicalTier {
    None,
    Moderate,
    Strong,
    Exact,
}

#[derive(Debug, Clone, Copy)]
struct LexicalMatch {
    index: usize,
    tier: LexicalTier,
    jaccard: f64,
}

struct Candidate<'a> {
    name: &'a str,
    normalized: String,
    tokens: TokenSet,
}

/// Picks the single most popular catalog entry of one entity kind from
/// aggregated search trends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopularityScorer {
    entity: EntityKind,
    tuning: PopularityTuning,
    strategy: CalibrationStrategy,
}

impl PopularityScorer {
    pub fn new(entity: EntityKind, tuning: PopularityTuning, strategy: CalibrationStrategy) -> Self {
        Self {
            entity,
            tuning,
            strategy,
        }
    }

    pub fn from_config(entity: EntityKind, config: &AulaConfig) -> Self {
        Self::new(
            entity,
            config.popularity_tuning(entity),
            config.calibration.strategy,
        )
    }

    pub fn entity(&self) -> EntityKind {
        self.entity
    }

    pub fn tuning(&self) -> &PopularityTuning {
        &self.tuning
    }

    /// Never fails for missing data; only a misaligned index is an error.
    pub fn predict(
        &self,
        catalog: &Catalog,
        trends: &[AggregatedQuery],
        semantic: Option<&SemanticView<'_>>,
    ) -> Result<PredictionResult, RankError> {
        let mode = if semantic.is_some() {
            ScoringMode::Hybrid
        } else {
            ScoringMode::Lexical
        };

        match self.rank(catalog, trends, semantic) {
            Ok(result) => Ok(result),
            Err(RankError::NoData) => Ok(PredictionResult::insufficient_data(self.entity, mode)),
            Err(err) => Err(err),
        }
    }

    fn rank(
        &self,
        catalog: &Catalog,
        trends: &[AggregatedQuery],
        semantic: Option<&SemanticView<'_>>,
    ) -> Result<PredictionResult, RankError> {
        let names = catalog.candidate_names(self.entity);
        let ids = catalog.candidate_ids(self.entity);
        if names.is_empty() || trends.is_empty() {
            return Err(RankError::NoData);
        }
        if let Some(view) = semantic {
            view.ensure_aligned(self.entity, &ids)?;
        }

        let candidates = names
            .into_iter()
            .map(|name| Candidate {
                name,
                normalized: normalize(name),
                tokens: tokenize(name),
            })
            .collect::<Vec<_>>();

        let mut scores = vec![0.0f64; candidates.len()];
        let mut counts = vec![0u64; candidates.len()];

        for trend in trends {
            let weight = trend.decayed_weight();
            if weight <= 0.0 {
                continue;
            }
            let similarities = semantic.and_then(|view| view.similarities(trend.query()));
            let Some((index, impact)) =
                self.score_query(trend.query(), weight, &candidates, similarities.as_deref())
            else {
                continue;
            };

            if impact > 0.0 {
                scores[index] += impact;
                counts[index] += trend.raw_count();
            }
        }

        let Some(winner) = argmax(&scores) else {
            return Err(RankError::NoData);
        };
        let top_score = scores[winner];
        if top_score <= self.tuning.evidence_floor {
            tracing::debug!(
                entity = self.entity.as_str(),
                top_score,
                floor = self.tuning.evidence_floor,
                "top candidate below evidence floor"
            );
            return Err(RankError::NoData);
        }

        let confidence = calibrate(self.strategy, &scores, winner, &self.tuning);
        let search_count = counts[winner];

        Ok(PredictionResult {
            entity: self.entity,
            predicted_id: ids.get(winner).copied(),
            predicted_name: Some(candidates[winner].name.to_owned()),
            confidence,
            reason: format!(
                "based on {search_count} supporting searches (popularity score {top_score:.1})"
            ),
            search_count,
            mode_used: if semantic.is_some() {
                ScoringMode::Hybrid
            } else {
                ScoringMode::Lexical
            },
            fallback_reason: None,
        })
    }

    /// The candidate one aggregated query votes for, and its impact.
    fn score_query(
        &self,
        query: &str,
        weight: f64,
        candidates: &[Candidate<'_>],
        similarities: Option<&[f64]>,
    ) -> Option<(usize, f64)> {
        let query_tokens = tokenize(query);
        let normalized_query = normalize(query);
        let lexical = self.best_lexical(&normalized_query, &query_tokens, candidates);

        let semantic_best = similarities.and_then(|scores| {
            argmax(scores).map(|index| (index, scores[index]))
        });

        // Strong lexical evidence outranks a semantic neighbour that shares no vocabulary.
        if let Some(found) = lexical
            && found.tier >= LexicalTier::Strong
        {
            return Some((found.index, weight * self.tier_multiplier(found.tier)));
        }

        let Some((index, similarity)) = semantic_best else {
            let found = lexical.filter(|found| found.tier > LexicalTier::None)?;
            return Some((found.index, weight * self.tier_multiplier(found.tier)));
        };

        let candidate = &candidates[index];
        let overlap = jaccard(&query_tokens, &candidate.tokens);
        let tier = self.lexical_tier(&normalized_query, overlap, candidate);
        if tier > LexicalTier::None {
            return Some((index, weight * self.tier_multiplier(tier)));
        }

        let impact = if similarity > self.tuning.semantic_threshold {
            if overlap < self.tuning.veto_jaccard {
                if similarity > self.tuning.veto_override_similarity {
                    weight * similarity * self.tuning.veto_override_factor
                } else {
                    tracing::debug!(
                        query,
                        candidate = candidate.name,
                        similarity,
                        "semantic match vetoed for lack of lexical overlap"
                    );
                    0.0
                }
            } else {
                weight * similarity
            }
        } else {
            0.0
        };

        Some((index, impact))
    }

    fn best_lexical(
        &self,
        normalized_query: &str,
        query_tokens: &TokenSet,
        candidates: &[Candidate<'_>],
    ) -> Option<LexicalMatch> {
        let mut best: Option<LexicalMatch> = None;
        for (index, candidate) in candidates.iter().enumerate() {
            let overlap = jaccard(query_tokens, &candidate.tokens);
            let tier = self.lexical_tier(normalized_query, overlap, candidate);
            let current = LexicalMatch {
                index,
                tier,
                jaccard: overlap,
            };
            let better = match best {
                None => true,
                Some(best) => {
                    current.tier > best.tier
                        || (current.tier == best.tier && current.jaccard > best.jaccard)
                }
            };
            if better {
                best = Some(current);
            }
        }
        best
    }

    fn lexical_tier(
        &self,
        normalized_query: &str,
        overlap: f64,
        candidate: &Candidate<'_>,
    ) -> LexicalTier {
        if normalized_query.is_empty() {
            return LexicalTier::None;
        }
        let exact = normalized_query == candidate.normalized
            || is_normalized_substring(
                normalized_query,
                &candidate.normalized,
                self.tuning.min_substring_len,
            );
        if exact {
            LexicalTier::Exact
        } else if overlap >= self.tuning.strong_jaccard {
            LexicalTier::Strong
        } else if self
            .tuning
            .moderate_jaccard
            .is_some_and(|moderate| overlap >= moderate)
        {
            LexicalTier::Moderate
        } else {
            LexicalTier::None
        }
    }

    fn tier_multiplier(&self, tier: LexicalTier) -> f64 {
        match tier {
            LexicalTier::Exact => self.tuning.exact_match_multiplier,
            LexicalTier::Strong => self.tuning.strong_multiplier,
            LexicalTier::Moderate => self.tuning.moderate_multiplier,
            LexicalTier::None => 0.0,
        }
    }
}

/// Index of the largest finite score; ties keep the earliest index.
fn argmax(scores: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, score) in scores.iter().enumerate() {
        if !score.is_finite() {
            continue;
        }
        match best {
            Some(current) if scores[current] >= *score => {}
            _ => best = Some(index),
        }
    }
    best
}
