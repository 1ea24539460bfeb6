use std::fmt;
use std::path::{Path, PathBuf};

use futures::{StreamExt, TryStreamExt};
use lorebase_llm::provider::ensure_embedding_count;
use lorebase_llm::{EmbedBatchFn, LlmError, RetryPolicy, retry_with_backoff};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{Chunk, DocumentError, DocumentLoader, IngestObserver, TextSplitter};
use crate::index::{IndexError, VectorIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    /// Build a fresh index from the given sources, replacing any existing one.
    Create,
    /// Load the existing index and add the given sources to it.
    Append,
}

/// Lifecycle of one source within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Loading,
    Splitting,
    Embedding,
    IndexWrite,
    Done,
    Failed,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Loading => "loading",
            Self::Splitting => "splitting",
            Self::Embedding => "embedding",
            Self::IndexWrite => "writing index",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Texts per embedding request.
    pub embed_batch_size: usize,
    /// Embedding requests in flight at once for a single source.
    pub embed_concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            embed_batch_size: 512,
            embed_concurrency: 1,
            retry: RetryPolicy::default(),
        }
    }
}

/// A source that was skipped, and where it stopped.
#[derive(Debug)]
pub struct SourceFailure {
    pub source: PathBuf,
    pub stage: SourceState,
    pub error: DocumentError,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub sources_ok: usize,
    pub chunks_indexed: usize,
    pub failures: Vec<SourceFailure>,
    pub cancelled: bool,
    /// Entries in the index on disk after the run, if it was written.
    pub index_len: Option<usize>,
}

impl IngestReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Errors that abort a whole run.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("overwrite of existing index at {0} was declined")]
    OverwriteDeclined(String),

    #[error(transparent)]
    Index(#[from] IndexError),
}

type Embedded = (Vec<Chunk>, Vec<Vec<f32>>);

pub struct IngestionPipeline {
    loader: Box<dyn DocumentLoader>,
    splitter: TextSplitter,
    embed_fn: EmbedBatchFn,
    options: IngestOptions,
    cancel: CancellationToken,
}

impl IngestionPipeline {
    pub fn new(
        loader: Box<dyn DocumentLoader>,
        splitter: TextSplitter,
        embed_fn: EmbedBatchFn,
        options: IngestOptions,
    ) -> Self {
        Self {
            loader,
            splitter,
            embed_fn,
            options,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Ingest `sources` into the index at `index_path`.
    ///
    /// Sources that cannot be read, split or embedded are recorded in the
    /// report and skipped. Cancellation is honoured between sources; a
    /// cancelled create-mode run writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] when the overwrite is declined, the index
    /// cannot be loaded (append mode), or the index cannot be built or saved.
    pub async fn run<O, I>(
        &self,
        mode: IngestMode,
        index_path: &Path,
        sources: I,
        observer: &O,
    ) -> Result<IngestReport, IngestError>
    where
        O: IngestObserver + ?Sized,
        I: IntoIterator<Item = PathBuf>,
    {
        match mode {
            IngestMode::Create => self.run_create(index_path, sources, observer).await,
            IngestMode::Append => self.run_append(index_path, sources, observer).await,
        }
    }

    async fn run_create<O, I>(
        &self,
        index_path: &Path,
        sources: I,
        observer: &O,
    ) -> Result<IngestReport, IngestError>
    where
        O: IngestObserver + ?Sized,
        I: IntoIterator<Item = PathBuf>,
    {
        if !observer.confirm_overwrite(index_path) {
            return Err(IngestError::OverwriteDeclined(
                index_path.display().to_string(),
            ));
        }

        let mut report = IngestReport::default();
        let mut prepared = Vec::new();
        let mut chunks = Vec::new();
        let mut vectors = Vec::new();

        for source in sources {
            if self.cancel.is_cancelled() {
                tracing::info!("ingestion cancelled; index not written");
                report.cancelled = true;
                return Ok(report);
            }
            if let Some((c, v)) = self.process(&source, observer, &mut report).await {
                report.sources_ok += 1;
                report.chunks_indexed += c.len();
                prepared.push((source, c.len()));
                chunks.extend(c);
                vectors.extend(v);
            }
        }

        for (source, _) in &prepared {
            observer.stage(source, SourceState::IndexWrite);
        }
        let index = VectorIndex::create(chunks, vectors)?;
        index.save(index_path).await?;
        tracing::info!(path = %index_path.display(), entries = index.len(), "index created");
        for (source, count) in &prepared {
            observer.source_done(source, *count);
        }
        observer.index_written(index_path, index.len());
        report.index_len = Some(index.len());
        Ok(report)
    }

    async fn run_append<O, I>(
        &self,
        index_path: &Path,
        sources: I,
        observer: &O,
    ) -> Result<IngestReport, IngestError>
    where
        O: IngestObserver + ?Sized,
        I: IntoIterator<Item = PathBuf>,
    {
        let mut index = VectorIndex::load(index_path).await?;
        let mut report = IngestReport::default();

        for source in sources {
            if self.cancel.is_cancelled() {
                tracing::info!("ingestion cancelled");
                report.cancelled = true;
                break;
            }
            let Some((c, v)) = self.process(&source, observer, &mut report).await else {
                continue;
            };
            let count = c.len();
            if count > 0 {
                observer.stage(&source, SourceState::IndexWrite);
                index.add_batch(c, v)?;
                index.save(index_path).await?;
                observer.index_written(index_path, index.len());
                report.index_len = Some(index.len());
            }
            observer.source_done(&source, count);
            report.sources_ok += 1;
            report.chunks_indexed += count;
        }

        Ok(report)
    }

    /// Load, split and embed one source, recording a failure in `report`.
    async fn process<O>(
        &self,
        source: &Path,
        observer: &O,
        report: &mut IngestReport,
    ) -> Option<Embedded>
    where
        O: IngestObserver + ?Sized,
    {
        observer.source_started(source);
        let span = tracing::info_span!("ingest_source", source = %source.display());
        match self.prepare(source, observer).instrument(span).await {
            Ok(embedded) => Some(embedded),
            Err((stage, error)) => {
                tracing::warn!(source = %source.display(), %stage, "skipping source: {error:#}");
                let failure = SourceFailure {
                    source: source.to_path_buf(),
                    stage,
                    error,
                };
                observer.stage(source, SourceState::Failed);
                observer.source_failed(&failure);
                report.failures.push(failure);
                None
            }
        }
    }

    async fn prepare<O>(
        &self,
        source: &Path,
        observer: &O,
    ) -> Result<Embedded, (SourceState, DocumentError)>
    where
        O: IngestObserver + ?Sized,
    {
        observer.stage(source, SourceState::Loading);
        let documents = self
            .loader
            .load(source)
            .await
            .map_err(|e| (SourceState::Loading, e))?;

        observer.stage(source, SourceState::Splitting);
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| self.splitter.split(doc))
            .collect();
        tracing::debug!(documents = documents.len(), chunks = chunks.len(), "split");
        if chunks.is_empty() {
            return Ok((chunks, Vec::new()));
        }

        observer.stage(source, SourceState::Embedding);
        let vectors = self
            .embed_chunks(&chunks)
            .await
            .map_err(|e| (SourceState::Embedding, e.into()))?;
        Ok((chunks, vectors))
    }

    /// Embed chunk texts in batches, preserving chunk order.
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>, LlmError> {
        let batch_size = self.options.embed_batch_size.max(1);
        let batches: Vec<Vec<String>> = chunks
            .chunks(batch_size)
            .map(|batch| batch.iter().map(|c| c.content.clone()).collect())
            .collect();

        let results: Vec<Vec<Vec<f32>>> = futures::stream::iter(
            batches.into_iter().map(|texts| self.embed_batch(texts)),
        )
        .buffered(self.options.embed_concurrency.max(1))
        .try_collect()
        .await?;

        Ok(results.into_iter().flatten().collect())
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, LlmError> {
        let expected = texts.len();
        let vectors = retry_with_backoff("embedding batch", &self.options.retry, || {
            (self.embed_fn)(texts.clone())
        })
        .await?;
        ensure_embedding_count(expected, &vectors)?;
        Ok(vectors)
    }
}
