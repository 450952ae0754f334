//! Resumable, parallel, rate-limited HTTP range downloading.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - [`data`] - Immutable configuration and value types
//! - [`core`] - Pure state and algorithms (chunk tracking, partitioning, token bucket)
//! - [`effects`] - I/O operations with trait abstraction
//!
//! # Pipeline
//!
//! [`Downloader`] splits the resource into one slot per connection and runs
//! waves of [`RangeFetcher`]s. Fetchers withdraw from a shared [`TokenBucket`]
//! that a [`RateLimiter`] refills once per second, and push chunks onto a
//! queue drained by a single [`ChunkWriter`]. The writer owns the output file
//! and the [`RangeTracker`], and persists the tracker through a
//! [`ProgressStore`] so an interrupted download resumes where it stopped.
//!
//! ```no_run
//! use segdl_fetch::{DownloadOptions, Downloader};
//!
//! # async fn run() -> segdl_fetch::Result<()> {
//! let options = DownloadOptions::default()
//!     .max_connections(4)
//!     .max_bytes_per_second(Some(2_000_000));
//! let downloader = Downloader::with_reqwest(options)?;
//! let report = downloader.download("https://example.com/big.iso").await?;
//! println!("{}", report.outcome);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod data;
pub mod effects;
mod error;

pub use self::core::{
    ChunkSpan, InvalidSpans, MAX_WAVE_BACKOFF, RangeTracker, TokenBucket, chunk_count,
    file_name_from_url, partition, stall_backoff,
};
pub use data::{
    CHUNK_SIZE, Chunk, DEFAULT_MAX_BYTES_PER_SECOND, DownloadOptions, DownloadOutcome,
    DownloadReport, Progress, ProgressCallback, Range, RefillPolicy, Timeouts,
};
pub use effects::{
    BoxStream, ChunkWriter, Downloader, FetchReport, HttpClient, PROGRESS_SUFFIX, ProgressStore,
    RangeFetcher, RateLimiter, WriterMessage,
};

#[cfg(feature = "reqwest")]
pub use effects::{HttpError, ReqwestClient};

pub use error::{Error, Result};
