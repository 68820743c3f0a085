use aula_core::CatalogId;

use crate::InferError;

/// Pre-encoded vectors for one candidate set, row-aligned with the catalog's
/// iteration order.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticIndex {
    ids: Vec<CatalogId>,
    rows: Vec<Vec<f32>>,
    dimension: usize,
}

impl SemanticIndex {
    pub fn new(ids: Vec<CatalogId>, rows: Vec<Vec<f32>>) -> Result<Self, InferError> {
        if ids.len() != rows.len() {
            return Err(InferError::RowMismatch {
                ids: ids.len(),
                rows: rows.len(),
            });
        }

        let dimension = rows.first().map(Vec::len).unwrap_or_default();
        if let Some(row) = rows.iter().find(|row| row.len() != dimension) {
            return Err(InferError::DimensionMismatch {
                expected: dimension,
                actual: row.len(),
            });
        }

        Ok(Self {
            ids,
            rows,
            dimension,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn ids(&self) -> &[CatalogId] {
        &self.ids
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// One cosine score per row. Degenerate rows score 0.
    pub fn similarities(&self, query: &[f32]) -> Result<Vec<f32>, InferError> {
        if !self.is_empty() && query.len() != self.dimension {
            return Err(InferError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        Ok(self
            .rows
            .iter()
            .map(|row| cosine_similarity(query, row).unwrap_or(0.0))
            .collect())
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> Option<f32> {
    if left.len() != right.len() || left.is_empty() {
        return None;
    }

    let mut dot = 0.0f32;
    let mut left_norm_sq = 0.0f32;
    let mut right_norm_sq = 0.0f32;

    for (left_value, right_value) in left.iter().zip(right.iter()) {
        dot += left_value * right_value;
        left_norm_sq += left_value * left_value;
        right_norm_sq += right_value * right_value;
    }

    if left_norm_sq <= f32::EPSILON || right_norm_sq <= f32::EPSILON {
        return None;
    }

    Some(dot / (left_norm_sq.sqrt() * right_norm_sq.sqrt()))
}
