use std::fs;
use std::path::{Path, PathBuf};

use aula_core::EntityKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod popularity;

pub use popularity::{PopularityConfig, PopularityOverrides, PopularityTuning};

pub const AULA_DIR_NAME: &str = ".aula";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_EMBEDDING_ENDPOINT: &str = "http://127.0.0.1:11434/api/embeddings";
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";
pub const MAX_CONFIDENCE_CAP: f64 = 0.99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    #[default]
    Mock,
    Http,
}

impl EmbeddingProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Http => "http",
        }
    }
}

impl std::str::FromStr for EmbeddingProviderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "mock" => Ok(Self::Mock),
            "http" => Ok(Self::Http),
            other => Err(format!(
                "invalid embedding provider '{other}', expected one of: mock, http"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStrategy {
    #[default]
    Blended,
    Softmax,
}

impl CalibrationStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blended => "blended",
            Self::Softmax => "softmax",
        }
    }
}

impl std::str::FromStr for CalibrationStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "blended" => Ok(Self::Blended),
            "softmax" => Ok(Self::Softmax),
            other => Err(format!(
                "invalid calibration strategy '{other}', expected one of: blended, softmax"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AulaConfig {
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub trends: TrendsConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub popularity: PopularityConfig,
    #[serde(default)]
    pub related_courses: RelatedCoursesConfig,
    #[serde(default)]
    pub related_topics: RelatedTopicsConfig,
    #[serde(default)]
    pub related_resources: RelatedResourcesConfig,
}

impl AulaConfig {
    pub fn popularity_tuning(&self, entity: EntityKind) -> PopularityTuning {
        self.popularity.tuning(entity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EmbeddingsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendsConfig {
    pub window_days: Option<u32>,
    pub count_only_weight: f64,
}

impl Default for TrendsConfig {
    fn default() -> Self {
        Self {
            window_days: Some(30),
            count_only_weight: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CalibrationConfig {
    #[serde(default)]
    pub strategy: CalibrationStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelatedCoursesConfig {
    pub max_direct_results: usize,
    pub limit: usize,
    pub lexical_limit: usize,
    pub semantic_limit: usize,
    pub topic_weight: f64,
    pub career_weight: f64,
    pub name_weight: f64,
    pub topic_career_coherence: f64,
    pub career_name_coherence: f64,
    pub semantic_scale: f64,
    pub semantic_bonus_scale: f64,
    pub semantic_floor: f64,
    pub substring_rescue_score: f64,
    pub min_substring_len: usize,
    pub keep_above: f64,
    pub area_boost: f64,
    pub career_boost: f64,
    pub unrelated_area_penalty: f64,
    pub unrelated_area_ceiling: f64,
    pub name_substring_boost: f64,
    pub topic_substring_boost: f64,
    pub lexical_name_bonus: f64,
    pub generic_careers: Vec<String>,
    pub context_confidence_scale: f64,
    pub lexical_confidence_scale: f64,
    pub semantic_confidence_scale: f64,
    pub confidence_cap: f64,
}

impl Default for RelatedCoursesConfig {
    fn default() -> Self {
        Self {
            max_direct_results: 3,
            limit: 4,
            lexical_limit: 2,
            semantic_limit: 4,
            topic_weight: 10.0,
            career_weight: 5.0,
            name_weight: 2.0,
            topic_career_coherence: 1.5,
            career_name_coherence: 1.2,
            semantic_scale: 100.0,
            semantic_bonus_scale: 30.0,
            semantic_floor: 25.0,
            substring_rescue_score: 60.0,
            min_substring_len: 3,
            keep_above: 40.0,
            area_boost: 20.0,
            career_boost: 10.0,
            unrelated_area_penalty: 5.0,
            unrelated_area_ceiling: 65.0,
            name_substring_boost: 20.0,
            topic_substring_boost: 25.0,
            lexical_name_bonus: 5.0,
            generic_careers: default_generic_careers(),
            context_confidence_scale: 30.0,
            lexical_confidence_scale: 10.0,
            semantic_confidence_scale: 100.0,
            confidence_cap: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelatedTopicsConfig {
    pub limit: usize,
    pub contextual_short_circuit: usize,
    pub semantic_scale: f64,
    pub career_boost: f64,
    pub substring_bonus: f64,
    pub min_substring_len: usize,
    pub keep_above: f64,
    pub lexical_overlap_points: f64,
    pub contextual_confidence: f64,
    pub confidence_scale: f64,
    pub confidence_cap: f64,
}

impl Default for RelatedTopicsConfig {
    fn default() -> Self {
        Self {
            limit: 4,
            contextual_short_circuit: 2,
            semantic_scale: 100.0,
            career_boost: 15.0,
            substring_bonus: 30.0,
            min_substring_len: 3,
            keep_above: 35.0,
            lexical_overlap_points: 20.0,
            contextual_confidence: 0.9,
            confidence_scale: 100.0,
            confidence_cap: 0.95,
        }
    }
}

/// Mixed course and resource list shown next to a live query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelatedResourcesConfig {
    pub limit: usize,
    /// Candidates kept from each of the course and resource sets before merging.
    pub per_kind_pool: usize,
    pub semantic_scale: f64,
    pub keep_above: f64,
    pub lexical_overlap_points: f64,
    pub substring_bonus: f64,
    pub min_substring_len: usize,
    pub confidence_scale: f64,
    pub confidence_cap: f64,
}

impl Default for RelatedResourcesConfig {
    fn default() -> Self {
        Self {
            limit: 6,
            per_kind_pool: 6,
            semantic_scale: 100.0,
            keep_above: 0.0,
            lexical_overlap_points: 20.0,
            substring_bonus: 30.0,
            min_substring_len: 3,
            confidence_scale: 100.0,
            confidence_cap: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub fn aula_dir(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(AULA_DIR_NAME)
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    aula_dir(workspace_root).join(CONFIG_FILE_NAME)
}

pub fn load_workspace_config(workspace_root: impl AsRef<Path>) -> Result<AulaConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(AulaConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: AulaConfig = toml::from_str(&raw)?;
    Ok(normalize_config(parsed))
}

pub fn ensure_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<AulaConfig, ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(aula_dir(workspace_root))?;

    let path = config_path(workspace_root);
    if path.exists() {
        return load_workspace_config(workspace_root);
    }

    let config = AulaConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

pub fn save_workspace_config(
    workspace_root: impl AsRef<Path>,
    config: &AulaConfig,
) -> Result<(), ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(aula_dir(workspace_root))?;
    let content = toml::to_string_pretty(config)?;
    fs::write(config_path(workspace_root), content)?;
    Ok(())
}

pub fn validate_config(config: &AulaConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    let course = config.popularity_tuning(EntityKind::Course);
    let topic = config.popularity_tuning(EntityKind::Topic);
    if topic.decay_lambda > course.decay_lambda {
        warnings.push(ConfigWarning {
            code: "topic_decay_faster_than_course",
            message: format!(
                "popularity.topic.decay_lambda ({}) exceeds popularity.course.decay_lambda ({}); topics normally decay slower",
                topic.decay_lambda, course.decay_lambda
            ),
        });
    }

    for entity in [EntityKind::Course, EntityKind::Topic, EntityKind::Resource] {
        let tuning = config.popularity_tuning(entity);
        if tuning.decay_lambda < 0.0 {
            warnings.push(ConfigWarning {
                code: "negative_decay_lambda",
                message: format!(
                    "popularity.{}.decay_lambda is negative; old searches would outweigh new ones",
                    entity.as_str()
                ),
            });
        }
        let moderate = tuning.moderate_jaccard.unwrap_or_default();
        if moderate > tuning.strong_jaccard {
            warnings.push(ConfigWarning {
                code: "moderate_jaccard_above_strong",
                message: format!(
                    "popularity.{}.moderate_jaccard ({moderate}) is above strong_jaccard ({}); the moderate tier never fires",
                    entity.as_str(),
                    tuning.strong_jaccard
                ),
            });
        }
    }

    if config.embeddings.enabled && config.embeddings.provider == EmbeddingProviderKind::Mock {
        warnings.push(ConfigWarning {
            code: "mock_embeddings_enabled",
            message: "embeddings are enabled with the mock provider; semantic scores are hash based"
                .to_owned(),
        });
    }

    if config.related_courses.max_direct_results == 0 {
        warnings.push(ConfigWarning {
            code: "context_mode_disabled",
            message: "related_courses.max_direct_results is 0; direct results always yield no related courses"
                .to_owned(),
        });
    }

    warnings
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn normalize_cap(value: f64) -> f64 {
    if !value.is_finite() {
        return MAX_CONFIDENCE_CAP;
    }
    value.clamp(0.0, MAX_CONFIDENCE_CAP)
}

fn normalize_cap_override(value: Option<f64>) -> Option<f64> {
    value.map(normalize_cap)
}

/// Negative rates are clamped to 0 (no decay); non-finite ones fall back to the default.
fn normalize_decay_override(value: Option<f64>) -> Option<f64> {
    value.filter(|lambda| lambda.is_finite()).map(|lambda| lambda.max(0.0))
}

fn default_generic_careers() -> Vec<String> {
    ["tronco comun", "ciclo basico", "estudios generales"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn normalize_config(mut config: AulaConfig) -> AulaConfig {
    config.embeddings.model = normalize_optional(config.embeddings.model.take());
    config.embeddings.endpoint = normalize_optional(config.embeddings.endpoint.take());

    if !config.trends.count_only_weight.is_finite() || config.trends.count_only_weight < 0.0 {
        config.trends.count_only_weight = TrendsConfig::default().count_only_weight;
    }

    for overrides in [
        &mut config.popularity.course,
        &mut config.popularity.topic,
        &mut config.popularity.resource,
    ] {
        overrides.decay_lambda = normalize_decay_override(overrides.decay_lambda);
        overrides.confidence_cap = normalize_cap_override(overrides.confidence_cap);
        overrides.softmax_cap = normalize_cap_override(overrides.softmax_cap);
    }

    config.related_courses.confidence_cap = normalize_cap(config.related_courses.confidence_cap);
    config.related_topics.confidence_cap = normalize_cap(config.related_topics.confidence_cap);
    config.related_topics.contextual_confidence =
        normalize_cap(config.related_topics.contextual_confidence);
    config.related_resources.confidence_cap =
        normalize_cap(config.related_resources.confidence_cap);

    config.related_courses.generic_careers = config
        .related_courses
        .generic_careers
        .into_iter()
        .map(|career| career.trim().to_lowercase())
        .filter(|career| !career.is_empty())
        .collect();

    config
}
