use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sender for human-readable provider status lines (rate limits, retries).
pub type StatusTx = tokio::sync::mpsc::UnboundedSender<String>;

pub type EmbedBatchFuture = Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send>>;

/// Type-erased batch embedding function, shared between the ingestion
/// pipeline and the retrieval tool.
pub type EmbedBatchFn = Arc<dyn Fn(Vec<String>) -> EmbedBatchFuture + Send + Sync>;

pub trait LlmProvider: Send + Sync {
    /// Send messages to the LLM and return the assistant response.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response is invalid.
    fn chat(&self, messages: &[Message]) -> impl Future<Output = Result<String, LlmError>> + Send;

    /// Embed a batch of texts. The result has the same length and order as `texts`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot embed or returns a malformed response.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send;

    fn supports_embeddings(&self) -> bool {
        true
    }

    fn name(&self) -> &str;
}

/// Wrap a provider's `embed_batch` into a cloneable, type-erased closure.
pub fn embed_batch_fn<P>(provider: &P) -> EmbedBatchFn
where
    P: LlmProvider + Clone + 'static,
{
    let provider = Arc::new(provider.clone());
    Arc::new(move |texts: Vec<String>| -> EmbedBatchFuture {
        let p = Arc::clone(&provider);
        Box::pin(async move { p.embed_batch(&texts).await })
    })
}

/// Check that a provider answered with one vector per requested text.
///
/// # Errors
///
/// Returns `LlmError::EmbeddingCount` on a length mismatch.
pub fn ensure_embedding_count(expected: usize, got: &[Vec<f32>]) -> Result<(), LlmError> {
    if got.len() == expected {
        Ok(())
    } else {
        Err(LlmError::EmbeddingCount {
            expected,
            got: got.len(),
        })
    }
}
