use std::fmt::Write;
use std::sync::Arc;

use lorebase_llm::{EmbedBatchFn, RetryPolicy, retry_with_backoff};
use lorebase_memory::{SearchHit, VectorIndex};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::executor::{ToolCall, ToolError, ToolExecutor, ToolOutput, deserialize_params};
use crate::registry::ToolDef;

pub const DEFAULT_K: usize = 4;

const SOURCES_SUFFIX: &str = "_with_sources";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RetrievalParams {
    /// A fully formed natural-language question
    pub query: String,
}

/// Exposes a vector index to the agent as a named, described tool.
///
/// Two tools are registered: `<name>` returns the closest passages, and
/// `<name>_with_sources` labels each passage with the document it came from.
pub struct RetrievalExecutor {
    name: String,
    description: String,
    index: Arc<VectorIndex>,
    embed_fn: EmbedBatchFn,
    k: usize,
    retry: RetryPolicy,
}

impl RetrievalExecutor {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        index: Arc<VectorIndex>,
        embed_fn: EmbedBatchFn,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            index,
            embed_fn,
            k: DEFAULT_K,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k.max(1);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn sources_id(&self) -> String {
        format!("{}{SOURCES_SUFFIX}", self.name)
    }

    /// Embed `query` and return the `k` closest chunks.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Embedding`] when the provider fails after retries
    /// and [`ToolError::Index`] when the query vector does not fit the index.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchHit>, ToolError> {
        let texts = vec![query.to_owned()];
        let mut vectors = retry_with_backoff("query embedding", &self.retry, || {
            (self.embed_fn)(texts.clone())
        })
        .await?;
        lorebase_llm::provider::ensure_embedding_count(1, &vectors)?;
        let vector = vectors.swap_remove(0);
        Ok(self.index.query(&vector, self.k)?)
    }
}

impl ToolExecutor for RetrievalExecutor {
    fn tool_definitions(&self) -> Vec<ToolDef> {
        vec![
            ToolDef {
                id: self.name.clone(),
                description: format!(
                    "{}. Use this to look up information about {}. \
                     Input should be a fully formed question.",
                    self.description.trim_end_matches('.'),
                    self.name
                ),
                schema: schemars::schema_for!(RetrievalParams),
            },
            ToolDef {
                id: self.sources_id(),
                description: format!(
                    "Same as {}, but every passage is labelled with the document it came from. \
                     Use this when the answer should cite its sources.",
                    self.name
                ),
                schema: schemars::schema_for!(RetrievalParams),
            },
        ]
    }

    async fn execute_tool_call(&self, call: &ToolCall) -> Result<Option<ToolOutput>, ToolError> {
        let with_sources = if call.tool_id == self.name {
            false
        } else if call.tool_id == self.sources_id() {
            true
        } else {
            return Ok(None);
        };

        let params: RetrievalParams = deserialize_params(&call.params)?;
        let query = params.query.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidParams {
                message: "query must not be empty".into(),
            });
        }

        let hits = self.retrieve(query).await?;
        tracing::debug!(tool = %call.tool_id, hits = hits.len(), "retrieval");
        let summary = if hits.is_empty() {
            "No matching passages found.".to_owned()
        } else if with_sources {
            format_with_sources(&hits)
        } else {
            format_passages(&hits)
        };

        Ok(Some(ToolOutput {
            tool_name: call.tool_id.clone(),
            summary,
        }))
    }
}

fn format_passages(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|h| h.chunk.content.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_with_sources(hits: &[SearchHit]) -> String {
    let mut out = String::new();
    for (i, hit) in hits.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        let meta = &hit.chunk.metadata;
        let _ = write!(out, "[{}] source: {}", i + 1, meta.source);
        if let Some(page) = meta.extra.get("page") {
            let _ = write!(out, " (page {page})");
        }
        let _ = write!(out, "\n{}", hit.chunk.content.trim());
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use lorebase_llm::mock::MockProvider;
    use lorebase_llm::provider::embed_batch_fn;
    use lorebase_memory::document::{Chunk, DocumentMetadata};

    use super::*;

    fn chunk(source: &str, text: &str) -> Chunk {
        Chunk {
            content: text.to_owned(),
            metadata: DocumentMetadata {
                source: source.to_owned(),
                content_type: "text/plain".to_owned(),
                extra: BTreeMap::new(),
            },
            chunk_index: 0,
            offset: 0,
        }
    }

    fn executor(provider: &MockProvider) -> RetrievalExecutor {
        let chunks = vec![
            chunk("zoo.txt", "zebra zebra zebra"),
            chunk("farm.txt", "cow milk barn"),
            chunk("sea.txt", "whale ocean salt"),
        ];
        let vectors = chunks
            .iter()
            .map(|c| provider.embedding_for(&c.content))
            .collect();
        let index = VectorIndex::create(chunks, vectors).unwrap();
        RetrievalExecutor::new(
            "animals",
            "Facts about animals.",
            Arc::new(index),
            embed_batch_fn(provider),
        )
        .with_k(2)
    }

    fn call(tool_id: &str, query: &str) -> ToolCall {
        ToolCall {
            tool_id: tool_id.to_owned(),
            params: HashMap::from([("query".to_owned(), serde_json::json!(query))]),
        }
    }

    #[test]
    fn exposes_two_tools() {
        let ex = executor(&MockProvider::default());
        let defs = ex.tool_definitions();
        let ids: Vec<_> = defs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["animals", "animals_with_sources"]);
        assert!(defs[0].description.starts_with("Facts about animals."));
    }

    #[tokio::test]
    async fn returns_top_k_passages() {
        let ex = executor(&MockProvider::default());
        let out = ex
            .execute_tool_call(&call("animals", "zebra"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.tool_name, "animals");
        assert!(out.summary.starts_with("zebra zebra zebra"));
        assert_eq!(out.summary.split("\n\n").count(), 2);
    }

    #[tokio::test]
    async fn sources_variant_labels_passages() {
        let ex = executor(&MockProvider::default());
        let out = ex
            .execute_tool_call(&call("animals_with_sources", "zebra"))
            .await
            .unwrap()
            .unwrap();
        assert!(out.summary.starts_with("[1] source: zoo.txt\nzebra"));
        assert!(out.summary.contains("[2] source: "));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_handled() {
        let ex = executor(&MockProvider::default());
        let out = ex.execute_tool_call(&call("plants", "fern")).await.unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn missing_query_is_invalid() {
        let ex = executor(&MockProvider::default());
        let bad = ToolCall {
            tool_id: "animals".into(),
            params: HashMap::new(),
        };
        let err = ex.execute_tool_call(&bad).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams { .. }));
    }

    #[tokio::test]
    async fn blank_query_is_invalid() {
        let ex = executor(&MockProvider::default());
        let err = ex
            .execute_tool_call(&call("animals", "   "))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams { .. }));
    }

    #[tokio::test]
    async fn provider_dimension_change_is_index_error() {
        let built_with = MockProvider::default();
        let ex = executor(&built_with);
        let other = MockProvider::default().with_dimension(8);
        let ex = RetrievalExecutor::new(
            ex.name().to_owned(),
            "x",
            Arc::clone(&ex.index),
            embed_batch_fn(&other),
        );
        let err = ex.retrieve("zebra").await.unwrap_err();
        assert!(matches!(
            err,
            ToolError::Index(lorebase_memory::IndexError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn embedding_failure_surfaces_after_retries() {
        let provider = MockProvider::default().with_poison_marker("zebra");
        let ex = executor(&MockProvider::default());
        let ex = RetrievalExecutor::new("animals", "x", Arc::clone(&ex.index), embed_batch_fn(&provider))
            .with_retry(RetryPolicy::none());
        let err = ex.retrieve("zebra").await.unwrap_err();
        assert!(matches!(err, ToolError::Embedding(_)));
        assert_eq!(provider.embed_calls(), 1);
    }
}
