use std::collections::BTreeMap;
use std::path::Path;
use std::pin::Pin;

use super::super::{
    DEFAULT_MAX_FILE_SIZE, Document, DocumentError, DocumentLoader, DocumentMetadata,
};
use super::open_source;

pub struct PdfLoader {
    pub max_file_size: u64,
    pub split_pages: bool,
}

impl Default for PdfLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            split_pages: false,
        }
    }
}

impl DocumentLoader for PdfLoader {
    fn load(
        &self,
        path: &Path,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<Document>, DocumentError>> + Send + '_>>
    {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        let split_pages = self.split_pages;
        Box::pin(async move {
            let canonical = open_source(&path, max_size).await?;
            let source = canonical.display().to_string();

            let err_source = source.clone();
            let pages = tokio::task::spawn_blocking(move || {
                pdf_extract::extract_text_by_pages(&canonical).map_err(|e| DocumentError::Pdf {
                    path: err_source,
                    message: e.to_string(),
                })
            })
            .await
            .map_err(|e| DocumentError::unreadable(&path, std::io::Error::other(e)))??;

            Ok(page_documents(pages, &source, split_pages))
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }
}

/// One document per page, or a single document joining every page.
///
/// Every document records the page count as `pages`; per-page documents also
/// carry their 1-based `page`.
fn page_documents(pages: Vec<String>, source: &str, split_pages: bool) -> Vec<Document> {
    let total = pages.len().to_string();
    let metadata = |page: Option<usize>| {
        let mut extra = BTreeMap::new();
        extra.insert("pages".to_owned(), total.clone());
        if let Some(page) = page {
            extra.insert("page".to_owned(), page.to_string());
        }
        DocumentMetadata {
            source: source.to_owned(),
            content_type: "application/pdf".to_owned(),
            extra,
        }
    };

    if split_pages {
        pages
            .into_iter()
            .enumerate()
            .map(|(i, content)| Document {
                content,
                metadata: metadata(Some(i + 1)),
            })
            .collect()
    } else {
        vec![Document {
            content: pages.join("\n"),
            metadata: metadata(None),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages() -> Vec<String> {
        vec!["first page".to_owned(), "second page".to_owned()]
    }

    #[test]
    fn joined_pages_record_page_count() {
        let docs = page_documents(pages(), "/tmp/a.pdf", false);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "first page\nsecond page");
        assert_eq!(docs[0].metadata.extra.get("pages").map(String::as_str), Some("2"));
        assert!(!docs[0].metadata.extra.contains_key("page"));
    }

    #[test]
    fn split_pages_are_numbered_from_one() {
        let docs = page_documents(pages(), "/tmp/a.pdf", true);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].content, "second page");
        assert_eq!(docs[1].metadata.extra.get("page").map(String::as_str), Some("2"));
        assert_eq!(docs[1].metadata.extra.get("pages").map(String::as_str), Some("2"));
        assert_eq!(docs[0].metadata.source, "/tmp/a.pdf");
    }

    #[tokio::test]
    async fn garbage_pdf_reports_pdf_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.pdf");
        std::fs::write(&file, b"this is not a pdf").unwrap();

        let result = PdfLoader::default().load(&file).await;
        assert!(matches!(
            result,
            Err(DocumentError::Pdf { .. } | DocumentError::SourceUnreadable { .. })
        ));
    }

    #[tokio::test]
    async fn missing_pdf_is_unreadable() {
        let result = PdfLoader::default()
            .load(Path::new("/nonexistent/file.pdf"))
            .await;
        assert!(matches!(
            result,
            Err(DocumentError::SourceUnreadable { .. })
        ));
    }
}
