use std::collections::HashMap;

use aula_core::{CatalogId, EntityKind};
use aula_infer::SemanticIndex;

use crate::RankError;

/// A catalog index paired with the pre-encoded vectors of the queries being
/// scored. Scorers only read from it.
#[derive(Debug, Clone, Copy)]
pub struct SemanticView<'a> {
    index: &'a SemanticIndex,
    query_vectors: &'a HashMap<String, Vec<f32>>,
}

impl<'a> SemanticView<'a> {
    pub fn new(index: &'a SemanticIndex, query_vectors: &'a HashMap<String, Vec<f32>>) -> Self {
        Self {
            index,
            query_vectors,
        }
    }

    /// Fails fast when the index was built for a different catalog generation:
    /// row `i` of the index must embed the catalog entry at position `i`.
    pub fn ensure_aligned(
        &self,
        entity: EntityKind,
        catalog_ids: &[CatalogId],
    ) -> Result<(), RankError> {
        if self.index.len() != catalog_ids.len() {
            return Err(RankError::IndexMismatch {
                entity,
                catalog_rows: catalog_ids.len(),
                index_rows: self.index.len(),
            });
        }
        let misplaced = catalog_ids
            .iter()
            .zip(self.index.ids())
            .enumerate()
            .find(|(_, (catalog_id, index_id))| catalog_id != index_id);
        if let Some((row, (catalog_id, index_id))) = misplaced {
            return Err(RankError::IndexOrderMismatch {
                entity,
                row,
                catalog_id: *catalog_id,
                index_id: *index_id,
            });
        }
        Ok(())
    }

    /// Cosine score of `query` against every row, or `None` when the query was
    /// not encoded.
    pub fn similarities(&self, query: &str) -> Option<Vec<f64>> {
        let vector = self.query_vectors.get(query)?;
        match self.index.similarities(vector) {
            Ok(scores) => Some(scores.into_iter().map(f64::from).collect()),
            Err(err) => {
                tracing::warn!(query, error = %err, "query vector rejected by index");
                None
            }
        }
    }
}
