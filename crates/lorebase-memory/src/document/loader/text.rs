use std::collections::BTreeMap;
use std::path::Path;
use std::pin::Pin;

use super::super::{
    DEFAULT_MAX_FILE_SIZE, Document, DocumentError, DocumentLoader, DocumentMetadata,
};
use super::open_source;

pub struct TextLoader {
    pub max_file_size: u64,
    /// Declared content type; when unset it is inferred from the extension.
    pub content_type: Option<&'static str>,
}

impl Default for TextLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            content_type: None,
        }
    }
}

impl DocumentLoader for TextLoader {
    fn load(
        &self,
        path: &Path,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<Document>, DocumentError>> + Send + '_>>
    {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        let declared = self.content_type;
        Box::pin(async move {
            let canonical = open_source(&path, max_size).await?;

            let content_type = declared.unwrap_or_else(|| {
                match canonical.extension().and_then(|e| e.to_str()).unwrap_or("") {
                    "md" | "markdown" => "text/markdown",
                    _ => "text/plain",
                }
            });

            let content = tokio::fs::read_to_string(&canonical)
                .await
                .map_err(|e| DocumentError::unreadable(&path, e))?;

            Ok(vec![Document {
                content,
                metadata: DocumentMetadata {
                    source: canonical.display().to_string(),
                    content_type: content_type.to_owned(),
                    extra: BTreeMap::new(),
                },
            }])
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["txt", "md", "markdown"]
    }
}
