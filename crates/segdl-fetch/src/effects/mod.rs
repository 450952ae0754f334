//! I/O: the HTTP seam, the pipeline tasks and their orchestration.

mod downloader;
mod fetcher;
mod http;
mod limiter;
mod store;
mod writer;

pub use downloader::Downloader;
pub use fetcher::{FetchReport, RangeFetcher};
pub use http::{BoxStream, HttpClient};
pub use limiter::RateLimiter;
pub use store::{PROGRESS_SUFFIX, ProgressStore};
pub use writer::{ChunkWriter, WriterMessage};

#[cfg(feature = "reqwest")]
pub use http::{HttpError, ReqwestClient};
