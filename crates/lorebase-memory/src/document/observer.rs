use std::path::Path;

use super::pipeline::{SourceFailure, SourceState};

/// Progress hooks and the overwrite prompt for an ingestion run.
///
/// Every method except [`IngestObserver::confirm_overwrite`] defaults to a no-op.
pub trait IngestObserver: Send + Sync {
    /// Asked once before a create-mode run touches anything.
    fn confirm_overwrite(&self, index_path: &Path) -> bool;

    fn source_started(&self, _source: &Path) {}

    fn stage(&self, _source: &Path, _state: SourceState) {}

    fn source_done(&self, _source: &Path, _chunks: usize) {}

    fn source_failed(&self, _failure: &SourceFailure) {}

    fn index_written(&self, _index_path: &Path, _entries: usize) {}
}

/// Observer that approves overwrites without asking.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoConfirm;

impl IngestObserver for AutoConfirm {
    fn confirm_overwrite(&self, _index_path: &Path) -> bool {
        true
    }
}
