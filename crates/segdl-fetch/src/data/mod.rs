//! Immutable data types shared by the download pipeline.
//!
//! Nothing in here performs I/O; these values are created by the caller or by
//! the pipeline and passed between tasks without mutation.

pub mod chunk;
pub mod options;
pub mod progress;
pub mod range;

pub use chunk::Chunk;
pub use options::{
    CHUNK_SIZE, DEFAULT_MAX_BYTES_PER_SECOND, DownloadOptions, ProgressCallback, RefillPolicy,
    Timeouts,
};
pub use progress::{DownloadOutcome, DownloadReport, Progress};
pub use range::Range;
