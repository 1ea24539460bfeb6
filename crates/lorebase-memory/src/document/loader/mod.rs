#[cfg(feature = "pdf")]
mod pdf;
mod text;

use std::path::{Path, PathBuf};

#[cfg(feature = "pdf")]
pub use pdf::PdfLoader;
pub use text::TextLoader;

use super::{DEFAULT_MAX_FILE_SIZE, DocumentError, DocumentLoader, InputType};

#[derive(Debug, Clone, Copy)]
pub struct LoaderOptions {
    pub max_file_size: u64,
    /// Emit one document per PDF page instead of one per file.
    pub pdf_split_pages: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            pdf_split_pages: false,
        }
    }
}

/// Select the loader for a declared input type.
///
/// # Errors
///
/// Returns [`DocumentError::UnsupportedInputType`] for `pdf` when the crate
/// was built without the `pdf` feature.
pub fn loader_for(
    input_type: InputType,
    options: LoaderOptions,
) -> Result<Box<dyn DocumentLoader>, DocumentError> {
    match input_type {
        InputType::Text | InputType::Markdown => Ok(Box::new(TextLoader {
            max_file_size: options.max_file_size,
            content_type: Some(input_type.content_type()),
        })),
        #[cfg(feature = "pdf")]
        InputType::Pdf => Ok(Box::new(PdfLoader {
            max_file_size: options.max_file_size,
            split_pages: options.pdf_split_pages,
        })),
        #[cfg(not(feature = "pdf"))]
        InputType::Pdf => Err(DocumentError::UnsupportedInputType(
            "pdf (built without the `pdf` feature)".into(),
        )),
    }
}

/// Resolve the source path and enforce the size limit.
async fn open_source(path: &Path, max_size: u64) -> Result<PathBuf, DocumentError> {
    let canonical = tokio::fs::canonicalize(path)
        .await
        .map_err(|e| DocumentError::unreadable(path, e))?;
    let meta = tokio::fs::metadata(&canonical)
        .await
        .map_err(|e| DocumentError::unreadable(path, e))?;
    if !meta.is_file() {
        return Err(DocumentError::unreadable(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }
    if meta.len() > max_size {
        return Err(DocumentError::FileTooLarge {
            path: canonical.display().to_string(),
            size: meta.len(),
        });
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_types_use_text_loader() {
        let loader = loader_for(InputType::Markdown, LoaderOptions::default()).unwrap();
        assert!(loader.supported_extensions().contains(&"md"));
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn pdf_type_uses_pdf_loader() {
        let loader = loader_for(InputType::Pdf, LoaderOptions::default()).unwrap();
        assert_eq!(loader.supported_extensions(), &["pdf"]);
    }

    #[cfg(not(feature = "pdf"))]
    #[test]
    fn pdf_type_without_feature_is_unsupported() {
        let result = loader_for(InputType::Pdf, LoaderOptions::default());
        assert!(matches!(result, Err(DocumentError::UnsupportedInputType(_))));
    }

    #[tokio::test]
    async fn directory_is_not_a_source() {
        let dir = tempfile::tempdir().unwrap();
        let result = open_source(dir.path(), u64::MAX).await;
        assert!(matches!(
            result,
            Err(DocumentError::SourceUnreadable { .. })
        ));
    }
}
