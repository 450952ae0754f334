use std::fmt;
use std::path::PathBuf;

/// Snapshot handed to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// `floor(100 * chunks_written / total_chunks)`.
    pub percent: u8,

    pub chunks_written: u64,

    pub total_chunks: u64,

    /// Bytes covered by written chunks.
    pub bytes_written: u64,

    pub file_size: u64,
}

/// Final state of a download attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The writer observed end-of-stream; the progress file was removed.
    Succeeded,

    /// The wave loop gave up; the progress file is kept for a later resume.
    Failed,
}

impl fmt::Display for DownloadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadOutcome::Succeeded => write!(f, "Download succeeded"),
            DownloadOutcome::Failed => write!(f, "Download failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub outcome: DownloadOutcome,
    pub output_path: PathBuf,
    pub progress: Progress,
    /// Number of fetch waves run by this attempt.
    pub waves: u32,
}

impl DownloadReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == DownloadOutcome::Succeeded
    }
}
