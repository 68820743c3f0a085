use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod provider;

pub use provider::{CatalogProvider, SearchHistoryProvider, StaticCatalog, StaticSearchHistory};

pub type CatalogId = i64;

pub const FALLBACK_EMBEDDINGS_DISABLED: &str = "embeddings_disabled";
pub const FALLBACK_INDEX_NOT_READY: &str = "index_not_ready";
pub const FALLBACK_MODEL_UNAVAILABLE: &str = "model_unavailable";

pub const INSUFFICIENT_DATA_REASON: &str = "insufficient data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Course,
    Topic,
    Resource,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Course => "course",
            Self::Topic => "topic",
            Self::Resource => "resource",
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "course" => Ok(Self::Course),
            "topic" => Ok(Self::Topic),
            "resource" => Ok(Self::Resource),
            other => Err(format!(
                "invalid entity kind '{other}', expected one of: course, topic, resource"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    Hybrid,
    Lexical,
}

impl ScoringMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hybrid => "hybrid",
            Self::Lexical => "lexical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Career {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
}

impl Career {
    pub fn new(name: impl Into<String>, area: Option<&str>) -> Self {
        Self {
            name: name.into(),
            area: area.map(str::to_owned),
        }
    }
}

/// A course or resource as delivered by the catalog provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: CatalogId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub careers: Vec<Career>,
}

impl CatalogItem {
    pub fn new(id: CatalogId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            topics: Vec::new(),
            careers: Vec::new(),
        }
    }

    pub fn with_topics(mut self, topics: &[&str]) -> Self {
        self.topics = topics.iter().map(|topic| (*topic).to_owned()).collect();
        self
    }

    pub fn with_career(mut self, name: &str, area: Option<&str>) -> Self {
        self.careers.push(Career::new(name, area));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub id: CatalogId,
    pub name: String,
}

impl Topic {
    pub fn new(id: CatalogId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Immutable catalog snapshot shared by every scorer for one request or job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub courses: Vec<CatalogItem>,
    #[serde(default)]
    pub topics: Vec<Topic>,
    #[serde(default)]
    pub resources: Vec<CatalogItem>,
}

impl Catalog {
    pub fn new(courses: Vec<CatalogItem>, topics: Vec<Topic>) -> Self {
        Self {
            courses,
            topics,
            resources: Vec::new(),
        }
    }

    pub fn with_resources(mut self, resources: Vec<CatalogItem>) -> Self {
        self.resources = resources;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty() && self.topics.is_empty() && self.resources.is_empty()
    }

    pub fn course(&self, id: CatalogId) -> Option<&CatalogItem> {
        self.courses.iter().find(|course| course.id == id)
    }

    /// Display names of the candidates of one entity kind, in catalog order.
    pub fn candidate_names(&self, entity: EntityKind) -> Vec<&str> {
        match entity {
            EntityKind::Course => self.courses.iter().map(|item| item.name.as_str()).collect(),
            EntityKind::Topic => self.topics.iter().map(|topic| topic.name.as_str()).collect(),
            EntityKind::Resource => self
                .resources
                .iter()
                .map(|item| item.name.as_str())
                .collect(),
        }
    }

    pub fn candidate_ids(&self, entity: EntityKind) -> Vec<CatalogId> {
        match entity {
            EntityKind::Course => self.courses.iter().map(|item| item.id).collect(),
            EntityKind::Topic => self.topics.iter().map(|topic| topic.id).collect(),
            EntityKind::Resource => self.resources.iter().map(|item| item.id).collect(),
        }
    }
}

/// One row of the search-history collaborator, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSearchRecord {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default, alias = "created_at")]
    pub timestamp: Option<String>,
    #[serde(default, alias = "results_count")]
    pub results_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawQueryEvent {
    pub query: String,
    pub timestamp: DateTime<Utc>,
}

/// Pre-counted trend row with no timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendCount {
    pub query: String,
    pub count: u64,
}

/// One group of identical literal queries. Built once per aggregation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedQuery {
    query: String,
    timestamps: Vec<DateTime<Utc>>,
    raw_count: u64,
    decayed_weight: f64,
}

impl AggregatedQuery {
    pub fn new(
        query: impl Into<String>,
        timestamps: Vec<DateTime<Utc>>,
        raw_count: u64,
        decayed_weight: f64,
    ) -> Self {
        Self {
            query: query.into(),
            timestamps,
            raw_count,
            decayed_weight: decayed_weight.max(0.0),
        }
    }

    /// Group with a known weight and no timestamp history.
    pub fn with_weight(query: impl Into<String>, raw_count: u64, decayed_weight: f64) -> Self {
        Self::new(query, Vec::new(), raw_count, decayed_weight)
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn raw_count(&self) -> u64 {
        self.raw_count
    }

    pub fn decayed_weight(&self) -> f64 {
        self.decayed_weight
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CatalogId>,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub name: String,
    pub score: f64,
    pub confidence: f64,
    pub supporting_evidence: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendations {
    pub mode_used: ScoringMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub items: Vec<ScoredItem>,
}

impl Recommendations {
    pub fn empty(mode_used: ScoringMode) -> Self {
        Self {
            mode_used,
            fallback_reason: None,
            items: Vec::new(),
        }
    }

    pub fn ids(&self) -> Vec<CatalogId> {
        self.items.iter().filter_map(|item| item.id).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub entity: EntityKind,
    pub predicted_id: Option<CatalogId>,
    pub predicted_name: Option<String>,
    pub confidence: f64,
    pub reason: String,
    pub search_count: u64,
    pub mode_used: ScoringMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl PredictionResult {
    /// The explicit "no evidence" terminal state.
    pub fn insufficient_data(entity: EntityKind, mode_used: ScoringMode) -> Self {
        Self {
            entity,
            predicted_id: None,
            predicted_name: None,
            confidence: 0.0,
            reason: INSUFFICIENT_DATA_REASON.to_owned(),
            search_count: 0,
            mode_used,
            fallback_reason: None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.predicted_name.is_none()
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid source data: {0}")]
    InvalidSource(String),
}

/// Content fingerprint of a catalog, stable across process restarts.
pub fn catalog_fingerprint(catalog: &Catalog) -> String {
    let mut hasher = blake3::Hasher::new();
    for (label, items) in [("course", &catalog.courses), ("resource", &catalog.resources)] {
        for item in items {
            hasher.update(label.as_bytes());
            hasher.update(b"\n");
            hasher.update(item.id.to_string().as_bytes());
            hasher.update(b"\n");
            hasher.update(item.name.as_bytes());
            for topic in &item.topics {
                hasher.update(b"\n#");
                hasher.update(topic.as_bytes());
            }
            for career in &item.careers {
                hasher.update(b"\n@");
                hasher.update(career.name.as_bytes());
                hasher.update(b"/");
                hasher.update(career.area.as_deref().unwrap_or_default().as_bytes());
            }
            hasher.update(b"\n");
        }
    }
    for topic in &catalog.topics {
        hasher.update(b"topic\n");
        hasher.update(topic.id.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(topic.name.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}
