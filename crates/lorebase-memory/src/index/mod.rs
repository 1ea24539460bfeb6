//! Exact nearest-neighbour index over chunk embeddings.

mod error;
mod persist;

pub use error::IndexError;

use crate::document::Chunk;

/// A chunk returned by [`VectorIndex::query`] with its cosine similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// In-memory entries plus the dimension fixed at creation.
///
/// Entries keep insertion order; it is the tie-breaker for equal scores.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
    norms: Vec<f32>,
}

impl VectorIndex {
    /// Build an index from parallel chunk and embedding lists.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::EmptyIndex`] when there is nothing to index,
    /// [`IndexError::LengthMismatch`] when the lists differ in length, and
    /// [`IndexError::DimensionMismatch`] when vectors disagree in dimension.
    pub fn create(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                embeddings: vectors.len(),
            });
        }
        let Some(first) = vectors.first() else {
            return Err(IndexError::EmptyIndex);
        };
        let dimension = first.len();
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }
        check_dimensions(dimension, &vectors)?;

        let norms = vectors.iter().map(|v| norm(v)).collect();
        Ok(Self {
            dimension,
            chunks,
            vectors,
            norms,
        })
    }

    /// Append entries. Nothing is added unless every vector matches the index dimension.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::LengthMismatch`] or [`IndexError::DimensionMismatch`].
    pub fn add_batch(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<(), IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                embeddings: vectors.len(),
            });
        }
        check_dimensions(self.dimension, &vectors)?;

        self.norms.extend(vectors.iter().map(|v| norm(v)));
        self.chunks.extend(chunks);
        self.vectors.extend(vectors);
        Ok(())
    }

    /// Return up to `k` entries ranked by descending cosine similarity.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::DimensionMismatch`] if `vector` has the wrong length.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        let query_norm = norm(vector);

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .zip(&self.norms)
            .enumerate()
            .map(|(i, (v, &n))| (i, cosine(vector, query_norm, v, n)))
            .collect();
        // stable: equal scores stay in insertion order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| SearchHit {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect())
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }
}

fn check_dimensions(expected: usize, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
    match vectors.iter().find(|v| v.len() != expected) {
        Some(bad) => Err(IndexError::DimensionMismatch {
            expected,
            got: bad.len(),
        }),
        None => Ok(()),
    }
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (norm_a * norm_b)
}
