use aula_core::EntityKind;
use serde::{Deserialize, Serialize};

/// Resolved thresholds for one popularity scorer instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopularityTuning {
    pub decay_lambda: f64,
    pub exact_match_multiplier: f64,
    pub strong_jaccard: f64,
    pub strong_multiplier: f64,
    pub moderate_jaccard: Option<f64>,
    pub moderate_multiplier: f64,
    pub min_substring_len: usize,
    pub semantic_threshold: f64,
    pub veto_jaccard: f64,
    pub veto_override_similarity: f64,
    pub veto_override_factor: f64,
    pub evidence_floor: f64,
    pub volume_scale: f64,
    pub low_evidence_threshold: f64,
    pub low_evidence_damping: f64,
    pub confidence_cap: f64,
    pub softmax_cap: f64,
}

impl PopularityTuning {
    pub fn course() -> Self {
        Self {
            decay_lambda: 0.05,
            exact_match_multiplier: 5.0,
            strong_jaccard: 0.5,
            strong_multiplier: 5.0,
            moderate_jaccard: None,
            moderate_multiplier: 5.0,
            min_substring_len: 3,
            semantic_threshold: 0.50,
            veto_jaccard: 0.01,
            veto_override_similarity: 0.85,
            veto_override_factor: 0.5,
            evidence_floor: 1.0,
            volume_scale: 4.5,
            low_evidence_threshold: 5.0,
            low_evidence_damping: 0.5,
            confidence_cap: 0.95,
            softmax_cap: 0.95,
        }
    }

    pub fn topic() -> Self {
        Self {
            decay_lambda: 0.02,
            exact_match_multiplier: 10.0,
            moderate_jaccard: Some(0.3),
            semantic_threshold: 0.60,
            volume_scale: 4.0,
            confidence_cap: 0.90,
            softmax_cap: 0.90,
            ..Self::course()
        }
    }

    pub fn resource() -> Self {
        Self {
            moderate_jaccard: Some(0.3),
            evidence_floor: 0.5,
            volume_scale: 4.0,
            low_evidence_threshold: 3.0,
            ..Self::course()
        }
    }

    pub fn defaults_for(entity: EntityKind) -> Self {
        match entity {
            EntityKind::Course => Self::course(),
            EntityKind::Topic => Self::topic(),
            EntityKind::Resource => Self::resource(),
        }
    }
}

/// Partial `[popularity.<entity>]` table; unset keys keep the entity defaults.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PopularityOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decay_lambda: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact_match_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strong_jaccard: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strong_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moderate_jaccard: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moderate_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub veto_jaccard: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub veto_override_similarity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_floor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_evidence_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_cap: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub softmax_cap: Option<f64>,
}

impl PopularityOverrides {
    pub fn apply(&self, mut base: PopularityTuning) -> PopularityTuning {
        overlay(&mut base.decay_lambda, self.decay_lambda);
        overlay(&mut base.exact_match_multiplier, self.exact_match_multiplier);
        overlay(&mut base.strong_jaccard, self.strong_jaccard);
        overlay(&mut base.strong_multiplier, self.strong_multiplier);
        if self.moderate_jaccard.is_some() {
            base.moderate_jaccard = self.moderate_jaccard;
        }
        overlay(&mut base.moderate_multiplier, self.moderate_multiplier);
        overlay(&mut base.semantic_threshold, self.semantic_threshold);
        overlay(&mut base.veto_jaccard, self.veto_jaccard);
        overlay(
            &mut base.veto_override_similarity,
            self.veto_override_similarity,
        );
        overlay(&mut base.evidence_floor, self.evidence_floor);
        overlay(&mut base.volume_scale, self.volume_scale);
        overlay(&mut base.low_evidence_threshold, self.low_evidence_threshold);
        overlay(&mut base.confidence_cap, self.confidence_cap);
        overlay(&mut base.softmax_cap, self.softmax_cap);
        base
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PopularityConfig {
    #[serde(default)]
    pub course: PopularityOverrides,
    #[serde(default)]
    pub topic: PopularityOverrides,
    #[serde(default)]
    pub resource: PopularityOverrides,
}

impl PopularityConfig {
    pub fn tuning(&self, entity: EntityKind) -> PopularityTuning {
        let overrides = match entity {
            EntityKind::Course => &self.course,
            EntityKind::Topic => &self.topic,
            EntityKind::Resource => &self.resource,
        };
        overrides.apply(PopularityTuning::defaults_for(entity))
    }
}

fn overlay(target: &mut f64, value: Option<f64>) {
    if let Some(value) = value.filter(|value| value.is_finite()) {
        *target = value;
    }
}
