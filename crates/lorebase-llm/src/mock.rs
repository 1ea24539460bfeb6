//! Test-only mock LLM provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message};

/// Scripted chat responses plus a deterministic, text-derived embedding.
///
/// Embeddings are byte-frequency histograms folded into `dimension` buckets,
/// so texts sharing characters land close together under cosine similarity.
#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    pub default_response: String,
    pub dimension: usize,
    pub supports_embeddings: bool,
    pub fail_chat: bool,
    /// Fail this many `embed_batch` calls before succeeding.
    pub embed_failures: Arc<AtomicUsize>,
    /// Texts containing this marker always fail to embed.
    pub poison_marker: Option<String>,
    embed_calls: Arc<AtomicUsize>,
    chat_calls: Arc<AtomicUsize>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            dimension: 32,
            supports_embeddings: true,
            fail_chat: false,
            embed_failures: Arc::new(AtomicUsize::new(0)),
            poison_marker: None,
            embed_calls: Arc::new(AtomicUsize::new(0)),
            chat_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    #[must_use]
    pub fn with_embed_failures(self, count: usize) -> Self {
        self.embed_failures.store(count, Ordering::SeqCst);
        self
    }

    #[must_use]
    pub fn with_poison_marker(mut self, marker: impl Into<String>) -> Self {
        self.poison_marker = Some(marker.into());
        self
    }

    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    /// The vector this provider returns for `text`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn embedding_for(&self, text: &str) -> Vec<f32> {
        let dim = self.dimension.max(1);
        let mut v = vec![0.0_f32; dim];
        for b in text.bytes().filter(|b| !b.is_ascii_whitespace()) {
            v[usize::from(b.to_ascii_lowercase()) % dim] += 1.0;
        }
        v
    }
}

impl LlmProvider for MockProvider {
    async fn chat(&self, _messages: &[Message]) -> Result<String, LlmError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_chat {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        let mut responses = self
            .responses
            .lock()
            .map_err(|e| LlmError::Other(e.to_string()))?;
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if !self.supports_embeddings {
            return Err(LlmError::EmbedUnsupported { provider: "mock" });
        }
        if self
            .embed_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(LlmError::RateLimited);
        }
        if let Some(marker) = &self.poison_marker
            && texts.iter().any(|t| t.contains(marker.as_str()))
        {
            return Err(LlmError::Unavailable);
        }
        Ok(texts.iter().map(|t| self.embedding_for(t)).collect())
    }

    fn supports_embeddings(&self) -> bool {
        self.supports_embeddings
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_responses_then_default() {
        let p = MockProvider::with_responses(vec!["first".into()]);
        assert_eq!(p.chat(&[]).await.unwrap(), "first");
        assert_eq!(p.chat(&[]).await.unwrap(), "mock response");
        assert_eq!(p.chat_calls(), 2);
    }

    #[tokio::test]
    async fn embed_batch_preserves_order_and_count() {
        let p = MockProvider::default();
        let texts = vec!["alpha".to_owned(), "beta".to_owned(), "gamma".to_owned()];
        let vectors = p.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), texts.len());
        for (text, v) in texts.iter().zip(&vectors) {
            assert_eq!(v, &p.embedding_for(text));
        }
    }

    #[tokio::test]
    async fn configured_failures_then_success() {
        let p = MockProvider::default().with_embed_failures(1);
        assert!(p.embed_batch(&["x".into()]).await.is_err());
        assert!(p.embed_batch(&["x".into()]).await.is_ok());
    }
}
