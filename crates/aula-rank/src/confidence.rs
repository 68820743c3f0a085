use aula_config::{CalibrationStrategy, PopularityTuning};

const HIGH_VOLUME: f64 = 0.8;

/// Rounds to two decimals and clamps into `[0, cap]`.
pub fn round_confidence(value: f64, cap: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let rounded = (value * 100.0).round() / 100.0;
    rounded.clamp(0.0, cap.max(0.0))
}

/// Volume/dominance blend over the best and runner-up scores.
pub fn blended_confidence(first: f64, second: f64, tuning: &PopularityTuning) -> f64 {
    if first <= 0.0 {
        return 0.0;
    }

    let dominance = ((first - second.max(0.0)) / first).clamp(0.0, 1.0);
    let volume = (first.ln_1p() / tuning.volume_scale).min(1.0);
    let mut confidence = if volume > HIGH_VOLUME {
        0.7 * volume + 0.3 * dominance
    } else {
        0.6 * volume + 0.4 * dominance
    };

    if first < tuning.low_evidence_threshold {
        confidence *= tuning.low_evidence_damping;
    }

    round_confidence(confidence, tuning.confidence_cap)
}

/// Softmax probability of `winner` among `scores`.
pub fn softmax_confidence(scores: &[f64], winner: usize, cap: f64) -> f64 {
    let Some(winner_score) = scores.get(winner).copied() else {
        return 0.0;
    };
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let total = scores
        .iter()
        .map(|score| (score - max).exp())
        .sum::<f64>();
    if total <= 0.0 {
        return 0.0;
    }

    round_confidence((winner_score - max).exp() / total, cap)
}

/// Confidence for the candidate at `winner` under the deployment's strategy.
pub fn calibrate(
    strategy: CalibrationStrategy,
    scores: &[f64],
    winner: usize,
    tuning: &PopularityTuning,
) -> f64 {
    match strategy {
        CalibrationStrategy::Blended => {
            let first = scores.get(winner).copied().unwrap_or_default();
            let second = scores
                .iter()
                .enumerate()
                .filter(|(index, _)| *index != winner)
                .map(|(_, score)| *score)
                .fold(0.0, f64::max);
            blended_confidence(first, second, tuning)
        }
        CalibrationStrategy::Softmax => {
            // Only candidates with evidence compete; zero rows would dilute the winner.
            let winner_score = scores.get(winner).copied().unwrap_or_default();
            if winner_score <= 0.0 {
                return 0.0;
            }
            let positive = scores
                .iter()
                .copied()
                .filter(|score| *score > 0.0)
                .collect::<Vec<_>>();
            let position = scores[..winner].iter().filter(|score| **score > 0.0).count();
            softmax_confidence(&positive, position, tuning.softmax_cap)
        }
    }
}

/// Linear `score / scale` confidence used by the related-item recommenders.
pub fn ratio_confidence(score: f64, scale: f64, cap: f64) -> f64 {
    if scale <= 0.0 {
        return 0.0;
    }
    round_confidence(score / scale, cap)
}
