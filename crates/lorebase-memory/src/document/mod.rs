pub mod error;
pub mod loader;
pub mod observer;
pub mod pipeline;
pub mod splitter;
pub mod types;

use std::fmt;
use std::str::FromStr;

pub use error::DocumentError;
#[cfg(feature = "pdf")]
pub use loader::PdfLoader;
pub use loader::{LoaderOptions, TextLoader, loader_for};
pub use observer::{AutoConfirm, IngestObserver};
pub use pipeline::{
    IngestError, IngestMode, IngestOptions, IngestReport, IngestionPipeline, SourceFailure,
    SourceState,
};
pub use splitter::{SplitStrategy, SplitterConfig, TextSplitter, reconstruct};
pub use types::{Chunk, Document, DocumentMetadata};

/// Default maximum file size: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

pub trait DocumentLoader: Send + Sync {
    fn load(
        &self,
        path: &std::path::Path,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<Document>, DocumentError>> + Send + '_>,
    >;

    fn supported_extensions(&self) -> &[&str];
}

/// Declared content type of every source in one ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Text,
    Markdown,
    Pdf,
}

impl InputType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Pdf => "pdf",
        }
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Text => "text/plain",
            Self::Markdown => "text/markdown",
            Self::Pdf => "application/pdf",
        }
    }

    /// Markdown gets structure-aware splitting; PDFs and plain text use the generic strategy.
    #[must_use]
    pub fn split_strategy(self) -> SplitStrategy {
        match self {
            Self::Markdown => SplitStrategy::Markdown,
            Self::Text | Self::Pdf => SplitStrategy::Recursive,
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputType {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "markdown" | "md" => Ok(Self::Markdown),
            "pdf" => Ok(Self::Pdf),
            other => Err(DocumentError::UnsupportedInputType(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_input_types() {
        assert_eq!("text".parse::<InputType>().unwrap(), InputType::Text);
        assert_eq!("Markdown".parse::<InputType>().unwrap(), InputType::Markdown);
        assert_eq!(" pdf ".parse::<InputType>().unwrap(), InputType::Pdf);
    }

    #[test]
    fn unknown_input_type_rejected() {
        let err = "docx".parse::<InputType>().unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedInputType(ref t) if t == "docx"));
    }

    #[test]
    fn strategy_follows_type() {
        assert_eq!(InputType::Markdown.split_strategy(), SplitStrategy::Markdown);
        assert_eq!(InputType::Pdf.split_strategy(), SplitStrategy::Recursive);
    }
}
