mod env;
mod types;


pub use types::*;

use std::path::{Path, PathBuf};
use std::time::Duration;

use lorebase_llm::RetryPolicy;
use lorebase_memory::document::{IngestOptions, InputType, LoaderOptions, SplitterConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("{0} is not set")]
    MissingSecret(&'static str),
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the resulting configuration is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str::<Self>(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run could succeed with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_owned()));

        if self.llm.base_url.trim().is_empty() {
            return invalid("llm.base_url must not be empty");
        }
        if self.llm.model.trim().is_empty() {
            return invalid("llm.model must not be empty");
        }
        if self.llm.embedding_model.trim().is_empty() {
            return invalid("llm.embedding_model must not be empty");
        }
        if self.ingest.chunk_size == 0 {
            return invalid("ingest.chunk_size must be greater than 0");
        }
        if self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "ingest.chunk_overlap ({}) must be smaller than ingest.chunk_size ({})",
                self.ingest.chunk_overlap, self.ingest.chunk_size
            )));
        }
        if self.ingest.embed_batch_size == 0 {
            return invalid("ingest.embed_batch_size must be greater than 0");
        }
        if self.ingest.embed_concurrency == 0 {
            return invalid("ingest.embed_concurrency must be greater than 0");
        }
        if self.agent.max_steps == 0 {
            return invalid("agent.max_steps must be greater than 0");
        }
        if self.agent.retrieval_k == 0 {
            return invalid("agent.retrieval_k must be greater than 0");
        }
        Ok(())
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            base_backoff: Duration::from_millis(self.retry.base_backoff_ms),
        }
    }

    #[must_use]
    pub fn splitter_config(&self, input_type: InputType) -> SplitterConfig {
        SplitterConfig {
            chunk_size: self.ingest.chunk_size,
            chunk_overlap: self.ingest.chunk_overlap,
            strategy: input_type.split_strategy(),
        }
    }

    #[must_use]
    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            max_file_size: self.ingest.max_file_size,
            pdf_split_pages: self.ingest.pdf_split_pages,
        }
    }

    #[must_use]
    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            embed_batch_size: self.ingest.embed_batch_size,
            embed_concurrency: self.ingest.embed_concurrency,
            retry: self.retry_policy(),
        }
    }
}
