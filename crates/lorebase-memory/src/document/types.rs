use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source: String,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.metadata.source
    }
}

/// A contiguous slice of one document's text.
///
/// `offset` is the byte position of `content` inside the source document.
/// Consecutive chunks of a document may overlap but never leave gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: DocumentMetadata,
    pub chunk_index: usize,
    pub offset: usize,
}

impl Chunk {
    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.metadata.source
    }

    /// Byte position one past the end of this chunk in the source document.
    #[must_use]
    pub fn end(&self) -> usize {
        self.offset + self.content.len()
    }
}
