//! Crash-safe persistence of [`RangeTracker`] state.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use segdl_fs::AtomicWriteOptions;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::{ChunkSpan, RangeTracker, chunk_count};
use crate::error::{Error, Result};

/// Suffix appended to the output file name to name its progress file.
pub const PROGRESS_SUFFIX: &str = ".metadata";

const FORMAT_VERSION: u32 = 1;

/// On-disk form of a tracker. Missing chunks are stored as index spans so the
/// file stays small however large the download is.
#[derive(Debug, Serialize, Deserialize)]
struct ProgressFile {
    version: u32,
    url: String,
    file_name: String,
    file_size: u64,
    chunk_size: usize,
    total_chunks: u64,
    chunks_written: u64,
    completed: bool,
    missing: Vec<ChunkSpan>,
}

impl From<&RangeTracker> for ProgressFile {
    fn from(tracker: &RangeTracker) -> Self {
        Self {
            version: FORMAT_VERSION,
            url: tracker.url().to_string(),
            file_name: tracker.file_name().to_string(),
            file_size: tracker.file_size(),
            chunk_size: tracker.chunk_size(),
            total_chunks: tracker.total_chunks(),
            chunks_written: tracker.chunks_written(),
            completed: tracker.is_completed(),
            missing: tracker.missing_spans(),
        }
    }
}

/// The progress file of one download, `<output_dir>/<file_name>.metadata`.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(output_dir: impl AsRef<Path>, file_name: &str) -> Self {
        Self {
            path: output_dir
                .as_ref()
                .join(format!("{file_name}{PROGRESS_SUFFIX}")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where [`save`](Self::save) stages the next state before renaming it.
    pub fn temp_path(&self) -> Result<PathBuf> {
        Ok(segdl_fs::temp_path_for(&self.path, write_options())?)
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the persisted tracker, or `None` if there is no progress file.
    ///
    /// A file that exists but cannot be decoded is an error, never a fresh
    /// start.
    pub fn load(&self) -> Result<Option<RangeTracker>> {
        let bytes = match segdl_fs::atomic_read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.io().map(std::io::Error::kind) == Some(ErrorKind::NotFound) => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let file: ProgressFile =
            serde_json::from_slice(&bytes).map_err(|e| self.corrupt(e.to_string()))?;

        if file.version != FORMAT_VERSION {
            return Err(self.corrupt(format!("unsupported version {}", file.version)));
        }
        if file.chunk_size == 0 {
            return Err(self.corrupt("chunk size is zero".into()));
        }
        let expected = chunk_count(file.file_size, file.chunk_size);
        if file.total_chunks != expected {
            return Err(self.corrupt(format!(
                "{} chunks recorded but {} bytes need {expected}",
                file.total_chunks, file.file_size
            )));
        }

        let tracker = RangeTracker::from_spans(
            file.url,
            file.file_name,
            file.file_size,
            file.chunk_size,
            &file.missing,
            file.chunks_written,
            file.completed,
        )
        .map_err(|e| self.corrupt(e.to_string()))?;

        debug!(
            path = %self.path.display(),
            written = tracker.chunks_written(),
            total = tracker.total_chunks(),
            "loaded progress"
        );
        Ok(Some(tracker))
    }

    /// Replace the progress file with the tracker's current state.
    pub fn save(&self, tracker: &RangeTracker) -> Result<()> {
        let content =
            serde_json::to_vec_pretty(&ProgressFile::from(tracker)).map_err(Error::Serialize)?;
        segdl_fs::atomic_write(&self.path, &content, write_options())?;
        Ok(())
    }

    /// Remove the progress file. Failure is logged, not returned.
    pub fn delete(&self) -> bool {
        match segdl_fs::remove_if_exists(&self.path) {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "failed to delete progress file");
                false
            }
        }
    }

    /// Remove a staging file left behind by an interrupted save.
    pub fn cleanup_temporaries(&self) {
        let removed = self
            .temp_path()
            .and_then(|tmp| Ok(segdl_fs::remove_if_exists(tmp)?));
        if let Err(e) = removed {
            warn!(error = %e, "failed to remove temporary progress file");
        }
    }

    fn corrupt(&self, reason: String) -> Error {
        Error::CorruptProgress {
            path: self.path.clone(),
            reason,
        }
    }
}

fn write_options() -> AtomicWriteOptions {
    AtomicWriteOptions::new().prefix(".").suffix(".tmp").sync(true)
}
