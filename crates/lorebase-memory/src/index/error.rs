use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("cannot build an index from zero entries")]
    EmptyIndex,

    #[error("embedding vectors must have at least one dimension")]
    ZeroDimension,

    #[error("{chunks} chunks but {embeddings} embeddings")]
    LengthMismatch { chunks: usize, embeddings: usize },

    #[error("dimension mismatch: index has {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("no usable index at {path}: {reason}")]
    NotFound { path: String, reason: String },

    #[error("invalid index path: {0}")]
    InvalidPath(String),

    #[error("index I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IndexError {
    pub(crate) fn not_found(path: &Path, reason: impl Into<String>) -> Self {
        Self::NotFound {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }
}
