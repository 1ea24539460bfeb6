#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("cannot read source {path}: {error}")]
    SourceUnreadable {
        path: String,
        #[source]
        error: std::io::Error,
    },

    #[error("unsupported input type: {0}")]
    UnsupportedInputType(String),

    #[error("file too large: {path} is {size} bytes")]
    FileTooLarge { path: String, size: u64 },

    #[cfg(feature = "pdf")]
    #[error("PDF error in {path}: {message}")]
    Pdf { path: String, message: String },

    #[error("embedding provider error: {0}")]
    Embedding(#[from] lorebase_llm::LlmError),
}

impl DocumentError {
    pub(crate) fn unreadable(path: &std::path::Path, error: std::io::Error) -> Self {
        Self::SourceUnreadable {
            path: path.display().to_string(),
            error,
        }
    }
}
