use aula_core::EntityKind;
use thiserror::Error;

mod confidence;
mod popularity;
mod related_courses;
mod related_resources;
mod related_topics;
mod semantic;
mod service;
mod trends;

pub use confidence::{
    blended_confidence, calibrate, ratio_confidence, round_confidence, softmax_confidence,
};
pub use popularity::PopularityScorer;
pub use related_courses::{ContextHint, RelatedCourseRecommender};
pub use related_resources::RelatedResourceRecommender;
pub use related_topics::RelatedTopicRecommender;
pub use semantic::SemanticView;
pub use service::RankingService;
pub use trends::{
    ParsedHistory, aggregate, aggregate_counts, decay_weight, parse_search_history,
    parse_search_record, parse_timestamp, within_window,
};

#[derive(Debug, Error)]
pub enum RankError {
    #[error("no data to score")]
    NoData,
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("malformed record at index {index}: {reason}")]
    MalformedRecord { index: usize, reason: String },
    #[error(
        "{} catalog has {catalog_rows} rows but its embedding index has {index_rows}",
        .entity.as_str()
    )]
    IndexMismatch {
        entity: EntityKind,
        catalog_rows: usize,
        index_rows: usize,
    },
    #[error(
        "{} embedding index row {row} holds id {index_id} but the catalog has id {catalog_id}",
        .entity.as_str()
    )]
    IndexOrderMismatch {
        entity: EntityKind,
        row: usize,
        catalog_id: aula_core::CatalogId,
        index_id: aula_core::CatalogId,
    },
    #[error("embedding cache error: {0}")]
    Infer(#[from] aula_infer::InferError),
    #[error("collaborator error: {0}")]
    Source(#[from] aula_core::CoreError),
}
