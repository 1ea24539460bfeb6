//! Wiring from a loaded [`Config`] to providers, pipelines and tools.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lorebase_llm::any::AnyProvider;
use lorebase_llm::ollama::OllamaProvider;
use lorebase_llm::openai::OpenAiProvider;
use lorebase_llm::provider::embed_batch_fn;
use lorebase_memory::VectorIndex;
use lorebase_memory::document::{
    DocumentError, IngestionPipeline, InputType, TextSplitter, loader_for,
};
use lorebase_tools::RetrievalExecutor;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ConfigError, ProviderKind};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Priority: `--config` flag > `LOREBASE_CONFIG` env > `config/default.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("LOREBASE_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

/// Build the configured chat + embedding provider.
///
/// # Errors
///
/// Returns [`ConfigError::MissingSecret`] when the OpenAI backend is selected
/// without `LOREBASE_OPENAI_API_KEY`.
pub fn create_provider(config: &Config) -> Result<AnyProvider, ConfigError> {
    match config.llm.provider {
        ProviderKind::Ollama => Ok(AnyProvider::Ollama(OllamaProvider::new(
            &config.llm.base_url,
            config.llm.model.clone(),
            config.llm.embedding_model.clone(),
        ))),
        ProviderKind::OpenAi => {
            let api_key = config
                .secrets
                .openai_api_key
                .clone()
                .ok_or(ConfigError::MissingSecret("LOREBASE_OPENAI_API_KEY"))?;
            Ok(AnyProvider::OpenAi(OpenAiProvider::new(
                api_key,
                config.llm.base_url.clone(),
                config.llm.model.clone(),
                config.llm.max_tokens,
                Some(config.llm.embedding_model.clone()),
            )))
        }
    }
}

/// Assemble the ingestion pipeline for one declared input type.
///
/// # Errors
///
/// Returns [`DocumentError::UnsupportedInputType`] when no loader exists for `input_type`.
pub fn build_pipeline(
    config: &Config,
    provider: &AnyProvider,
    input_type: InputType,
    cancel: CancellationToken,
) -> Result<IngestionPipeline, DocumentError> {
    let loader = loader_for(input_type, config.loader_options())?;
    Ok(IngestionPipeline::new(
        loader,
        TextSplitter::new(config.splitter_config(input_type)),
        embed_batch_fn(provider),
        config.ingest_options(),
    )
    .with_cancel_token(cancel))
}

/// Bind a loaded index to the retrieval tool under `name`.
#[must_use]
pub fn build_retrieval(
    config: &Config,
    provider: &AnyProvider,
    index: VectorIndex,
    name: &str,
    description: &str,
) -> RetrievalExecutor {
    RetrievalExecutor::new(name, description, Arc::new(index), embed_batch_fn(provider))
        .with_k(config.agent.retrieval_k)
        .with_retry(config.retry_policy())
}
