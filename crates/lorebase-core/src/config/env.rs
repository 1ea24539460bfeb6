use std::str::FromStr;

use super::{Config, ProviderKind};

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    if let Ok(value) = raw.trim().parse() {
        Some(value)
    } else {
        tracing::warn!("ignoring invalid {key} value: {raw}");
        None
    }
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LOREBASE_LLM_PROVIDER") {
            if let Ok(kind) =
                serde_json::from_value::<ProviderKind>(serde_json::Value::String(v.clone()))
            {
                self.llm.provider = kind;
            } else {
                tracing::warn!("ignoring invalid LOREBASE_LLM_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("LOREBASE_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("LOREBASE_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("LOREBASE_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Some(v) = parsed("LOREBASE_LLM_MAX_TOKENS") {
            self.llm.max_tokens = v;
        }

        if let Some(v) = parsed("LOREBASE_INGEST_CHUNK_SIZE") {
            self.ingest.chunk_size = v;
        }
        if let Some(v) = parsed("LOREBASE_INGEST_CHUNK_OVERLAP") {
            self.ingest.chunk_overlap = v;
        }
        if let Some(v) = parsed("LOREBASE_INGEST_EMBED_BATCH_SIZE") {
            self.ingest.embed_batch_size = v;
        }
        if let Some(v) = parsed("LOREBASE_INGEST_EMBED_CONCURRENCY") {
            self.ingest.embed_concurrency = v;
        }
        if let Some(v) = parsed("LOREBASE_INGEST_MAX_FILE_SIZE") {
            self.ingest.max_file_size = v;
        }
        if let Some(v) = parsed("LOREBASE_INGEST_PDF_SPLIT_PAGES") {
            self.ingest.pdf_split_pages = v;
        }

        if let Some(v) = parsed("LOREBASE_AGENT_MAX_STEPS") {
            self.agent.max_steps = v;
        }
        if let Some(v) = parsed("LOREBASE_AGENT_RETRIEVAL_K") {
            self.agent.retrieval_k = v;
        }

        if let Some(v) = parsed("LOREBASE_RETRY_MAX_RETRIES") {
            self.retry.max_retries = v;
        }
        if let Some(v) = parsed("LOREBASE_RETRY_BASE_BACKOFF_MS") {
            self.retry.base_backoff_ms = v;
        }

        if let Ok(v) = std::env::var("LOREBASE_OPENAI_API_KEY")
            && !v.trim().is_empty()
        {
            self.secrets.openai_api_key = Some(v);
        }
    }
}
