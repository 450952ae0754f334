use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::progress::Progress;
use crate::error::{Error, Result};

/// Unit of transfer, bookkeeping, and rate-limit withdrawal.
pub const CHUNK_SIZE: usize = 4096;

/// Throughput ceiling used when the caller does not set one.
pub const DEFAULT_MAX_BYTES_PER_SECOND: u64 = 1_000_000;

/// Callback invoked by the chunk writer each time the completion percentage rises.
pub type ProgressCallback = Arc<dyn Fn(&Progress) + Send + Sync>;

/// How the rate limiter refills the token bucket once per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefillPolicy {
    /// Add the ceiling to whatever is left ("soft" limiting).
    ///
    /// Tokens are never capped, so a fetcher that was starved can burst above
    /// the ceiling afterwards.
    #[default]
    Accumulate,

    /// Reset the bucket to exactly the ceiling ("hard" limiting).
    ///
    /// Unused tokens are forfeited at each refill. The ceiling must be at
    /// least one chunk or no fetcher could ever withdraw.
    Reset,
}

/// Network timeouts applied to every range request.
///
/// Both are short: a stalled fetcher should fail fast and leave its gap to the
/// next wave rather than hang the whole download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(500),
            read: Duration::from_secs(2),
        }
    }
}

/// Configuration for a download.
///
/// # Examples
///
/// ```
/// use segdl_fetch::{DownloadOptions, RefillPolicy};
///
/// let options = DownloadOptions::default()
///     .max_connections(4)
///     .max_bytes_per_second(Some(512 * 1024))
///     .refill_policy(RefillPolicy::Reset)
///     .output_dir("downloads");
/// assert!(options.validate().is_ok());
/// ```
#[derive(Clone)]
pub struct DownloadOptions {
    /// Number of worker slots the resource is partitioned into.
    ///
    /// Default: 1
    pub max_connections: usize,

    /// Aggregate throughput ceiling. `None` means [`DEFAULT_MAX_BYTES_PER_SECOND`].
    pub max_bytes_per_second: Option<u64>,

    /// Default: [`RefillPolicy::Accumulate`]
    pub refill_policy: RefillPolicy,

    /// Default: [`CHUNK_SIZE`]
    pub chunk_size: usize,

    /// Directory receiving the output file and its progress file.
    ///
    /// Default: the current directory
    pub output_dir: PathBuf,

    /// Consecutive waves without a newly written chunk before giving up.
    ///
    /// Default: 5
    pub max_stalled_waves: u32,

    /// Base delay before re-running a stalled wave, doubled per stalled wave.
    ///
    /// Default: 500ms
    pub wave_backoff: Duration,

    pub timeouts: Timeouts,

    /// Default: None
    pub on_progress: Option<ProgressCallback>,
}

impl fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("max_connections", &self.max_connections)
            .field("max_bytes_per_second", &self.max_bytes_per_second)
            .field("refill_policy", &self.refill_policy)
            .field("chunk_size", &self.chunk_size)
            .field("output_dir", &self.output_dir)
            .field("max_stalled_waves", &self.max_stalled_waves)
            .field("wave_backoff", &self.wave_backoff)
            .field("timeouts", &self.timeouts)
            .field("on_progress", &self.on_progress.as_ref().map(|_| "{ ... }"))
            .finish()
    }
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            max_connections: 1,
            max_bytes_per_second: None,
            refill_policy: RefillPolicy::default(),
            chunk_size: CHUNK_SIZE,
            output_dir: PathBuf::from("."),
            max_stalled_waves: 5,
            wave_backoff: Duration::from_millis(500),
            timeouts: Timeouts::default(),
            on_progress: None,
        }
    }
}

impl DownloadOptions {
    #[must_use]
    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    #[must_use]
    pub fn max_bytes_per_second(mut self, max_bytes_per_second: Option<u64>) -> Self {
        self.max_bytes_per_second = max_bytes_per_second;
        self
    }

    #[must_use]
    pub fn refill_policy(mut self, refill_policy: RefillPolicy) -> Self {
        self.refill_policy = refill_policy;
        self
    }

    #[must_use]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    #[must_use]
    pub fn max_stalled_waves(mut self, max_stalled_waves: u32) -> Self {
        self.max_stalled_waves = max_stalled_waves;
        self
    }

    #[must_use]
    pub fn wave_backoff(mut self, wave_backoff: Duration) -> Self {
        self.wave_backoff = wave_backoff;
        self
    }

    #[must_use]
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the progress callback.
    ///
    /// # Examples
    ///
    /// ```
    /// use segdl_fetch::DownloadOptions;
    /// use std::sync::Arc;
    ///
    /// let options = DownloadOptions::default().on_progress(Arc::new(|progress| {
    ///     eprintln!("Downloaded {}%", progress.percent);
    /// }));
    /// assert!(options.on_progress.is_some());
    /// ```
    #[must_use]
    pub fn on_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    /// The ceiling actually enforced.
    pub fn effective_bytes_per_second(&self) -> u64 {
        self.max_bytes_per_second
            .unwrap_or(DEFAULT_MAX_BYTES_PER_SECOND)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::InvalidOptions(
                "max_connections must be at least 1".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(Error::InvalidOptions("chunk_size must be at least 1".into()));
        }
        if self.max_stalled_waves == 0 {
            return Err(Error::InvalidOptions(
                "max_stalled_waves must be at least 1".into(),
            ));
        }
        let ceiling = self.effective_bytes_per_second();
        if ceiling == 0 {
            return Err(Error::InvalidOptions(
                "max_bytes_per_second must be at least 1".into(),
            ));
        }
        if self.refill_policy == RefillPolicy::Reset && ceiling < self.chunk_size as u64 {
            return Err(Error::InvalidOptions(format!(
                "a reset refill of {ceiling} bytes can never cover a {} byte chunk",
                self.chunk_size
            )));
        }
        Ok(())
    }
}
