//! Error types for segdl-fetch.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("could not determine the size of {0}")]
    UnknownSize(String),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("progress file '{}' is corrupt: {reason}", path.display())]
    CorruptProgress { path: PathBuf, reason: String },

    #[error("progress file '{}' does not match the download: {reason}", path.display())]
    ProgressMismatch { path: PathBuf, reason: String },

    #[error("failed to encode progress: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error(transparent)]
    Fs(#[from] segdl_fs::Error),

    #[error("chunk writer stopped before the download finished")]
    WriterGone,

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
