//! Pure state and algorithms for segmented downloading.
//!
//! Nothing here touches the network or the filesystem.

mod bucket;
mod naming;
mod retry;
mod segment;
mod tracker;

pub use bucket::TokenBucket;
pub use naming::file_name_from_url;
pub use retry::{MAX_WAVE_BACKOFF, stall_backoff};
pub use segment::partition;
pub use tracker::{ChunkSpan, InvalidSpans, RangeTracker, chunk_count};
