//! On-disk layout: a directory holding `args.json`, `docstore.json` and `vectors.bin`.
//!
//! Saves are staged in a sibling temporary directory and swapped into place,
//! so readers see either the previous index or the new one. The previous index
//! is parked as `.{name}.old-*` during the swap; if a save dies there, `load`
//! reads the newest parked copy and the next save clears it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{IndexError, VectorIndex, norm};
use crate::document::Chunk;

const FORMAT_VERSION: u32 = 1;
const SPACE: &str = "cosine";

const ARGS_FILE: &str = "args.json";
const DOCSTORE_FILE: &str = "docstore.json";
const VECTORS_FILE: &str = "vectors.bin";

#[derive(Debug, Serialize, Deserialize)]
struct IndexArgs {
    format_version: u32,
    space: String,
    dimension: usize,
    num_elements: usize,
    checksum: String,
}

impl VectorIndex {
    /// Persist the index to the directory at `path`, replacing any previous index.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O or serialization failure. The previous index,
    /// if any, is left intact.
    pub async fn save(&self, path: &Path) -> Result<(), IndexError> {
        let (parent, name) = split_path(path)?;
        tokio::fs::create_dir_all(&parent).await?;

        let docstore = serde_json::to_vec(&self.chunks)?;
        let vectors = encode_vectors(&self.vectors);
        let args = IndexArgs {
            format_version: FORMAT_VERSION,
            space: SPACE.to_owned(),
            dimension: self.dimension,
            num_elements: self.chunks.len(),
            checksum: checksum(&docstore, &vectors),
        };
        let args = serde_json::to_vec_pretty(&args)?;

        let staging = parent.join(format!(".{name}.tmp-{}", Uuid::new_v4()));
        tokio::fs::create_dir(&staging).await?;
        let written = async {
            write_synced(&staging.join(DOCSTORE_FILE), &docstore).await?;
            write_synced(&staging.join(VECTORS_FILE), &vectors).await?;
            write_synced(&staging.join(ARGS_FILE), &args).await
        }
        .await;
        if let Err(e) = written {
            discard(&staging).await;
            return Err(e.into());
        }

        publish(&staging, path, &parent, &name).await?;
        sync_dir(&parent).await;
        for stale in backups(&parent, &name).await {
            discard(&stale).await;
        }
        tracing::debug!(path = %path.display(), entries = self.len(), "index saved");
        Ok(())
    }

    /// Load an index previously written by [`VectorIndex::save`].
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NotFound`] when the directory is missing,
    /// incomplete, or fails its integrity check.
    pub async fn load(path: &Path) -> Result<Self, IndexError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => load_dir(path).await,
            Ok(_) => Err(IndexError::not_found(path, "not a directory")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let (parent, name) = split_path(path)?;
                match backups(&parent, &name).await.into_iter().next() {
                    Some(parked) => {
                        tracing::warn!(
                            path = %path.display(),
                            backup = %parked.display(),
                            "index missing after an interrupted save, reading parked copy"
                        );
                        load_dir(&parked).await
                    }
                    None => Err(IndexError::not_found(path, "directory does not exist")),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

async fn load_dir(path: &Path) -> Result<VectorIndex, IndexError> {
    let args = read_part(path, ARGS_FILE).await?;
    let args: IndexArgs = serde_json::from_slice(&args)
        .map_err(|e| IndexError::not_found(path, format!("unreadable {ARGS_FILE}: {e}")))?;
    if args.format_version != FORMAT_VERSION {
        return Err(IndexError::not_found(
            path,
            format!("unsupported format version {}", args.format_version),
        ));
    }
    if args.space != SPACE {
        return Err(IndexError::not_found(
            path,
            format!("unsupported space {:?}", args.space),
        ));
    }

    let docstore = read_part(path, DOCSTORE_FILE).await?;
    let vectors = read_part(path, VECTORS_FILE).await?;
    if checksum(&docstore, &vectors) != args.checksum {
        return Err(IndexError::not_found(path, "checksum mismatch"));
    }

    let chunks: Vec<Chunk> = serde_json::from_slice(&docstore).map_err(|e| {
        IndexError::not_found(path, format!("unreadable {DOCSTORE_FILE}: {e}"))
    })?;
    let vectors = decode_vectors(&vectors, args.dimension)
        .ok_or_else(|| IndexError::not_found(path, "vector data is truncated"))?;

    if chunks.len() != args.num_elements || vectors.len() != args.num_elements {
        return Err(IndexError::not_found(path, "element count mismatch"));
    }
    if args.num_elements == 0 || args.dimension == 0 {
        return Err(IndexError::not_found(path, "index is empty"));
    }

    let norms = vectors.iter().map(|v| norm(v)).collect();
    tracing::debug!(path = %path.display(), entries = chunks.len(), "index loaded");
    Ok(VectorIndex {
        dimension: args.dimension,
        chunks,
        vectors,
        norms,
    })
}

/// Parked copies of `name` left by interrupted saves, newest first.
async fn backups(parent: &Path, name: &str) -> Vec<PathBuf> {
    let prefix = format!(".{name}.old-");
    let Ok(mut entries) = tokio::fs::read_dir(parent).await else {
        return Vec::new();
    };
    let mut found = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        if !entry.file_name().to_string_lossy().starts_with(&prefix) {
            continue;
        }
        if let Ok(meta) = entry.metadata().await
            && meta.is_dir()
        {
            found.push((meta.modified().ok(), entry.path()));
        }
    }
    found.sort_by(|a, b| b.0.cmp(&a.0));
    found.into_iter().map(|(_, path)| path).collect()
}

fn split_path(path: &Path) -> Result<(PathBuf, String), IndexError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| IndexError::InvalidPath(path.display().to_string()))?
        .to_owned();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((parent, name))
}

async fn read_part(dir: &Path, file: &str) -> Result<Vec<u8>, IndexError> {
    match tokio::fs::read(dir.join(file)).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(IndexError::not_found(dir, format!("missing {file}")))
        }
        Err(e) => Err(e.into()),
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// Swap `staging` into `target`, keeping the previous index until the swap succeeds.
async fn publish(staging: &Path, target: &Path, parent: &Path, name: &str) -> Result<(), IndexError> {
    let previous = match tokio::fs::symlink_metadata(target).await {
        Ok(_) => {
            let backup = parent.join(format!(".{name}.old-{}", Uuid::new_v4()));
            if let Err(e) = tokio::fs::rename(target, &backup).await {
                discard(staging).await;
                return Err(e.into());
            }
            Some(backup)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            discard(staging).await;
            return Err(e.into());
        }
    };

    if let Err(e) = tokio::fs::rename(staging, target).await {
        if let Some(backup) = &previous
            && let Err(restore) = tokio::fs::rename(backup, target).await
        {
            tracing::error!(
                backup = %backup.display(),
                "failed to restore previous index: {restore:#}"
            );
        }
        discard(staging).await;
        return Err(e.into());
    }

    if let Some(backup) = previous {
        discard(&backup).await;
    }
    Ok(())
}

async fn discard(path: &Path) {
    let result = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(_) => return,
    };
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), "failed to remove stale index files: {e:#}");
    }
}

async fn sync_dir(dir: &Path) {
    if let Ok(handle) = tokio::fs::File::open(dir).await {
        let _ = handle.sync_all().await;
    }
}

fn checksum(docstore: &[u8], vectors: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(docstore);
    hasher.update(vectors);
    hasher.finalize().to_hex().to_string()
}

fn encode_vectors(vectors: &[Vec<f32>]) -> Vec<u8> {
    vectors
        .iter()
        .flatten()
        .flat_map(|x| x.to_le_bytes())
        .collect()
}

fn decode_vectors(bytes: &[u8], dimension: usize) -> Option<Vec<Vec<f32>>> {
    let row = dimension.checked_mul(4)?;
    if row == 0 || bytes.len() % row != 0 {
        return if bytes.is_empty() { Some(Vec::new()) } else { None };
    }
    Some(
        bytes
            .chunks_exact(row)
            .map(|r| {
                r.chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect()
            })
            .collect(),
    )
}
