//! Wave-based orchestration of fetchers, writer and rate limiter.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::core::{RangeTracker, TokenBucket, file_name_from_url, partition, stall_backoff};
use crate::data::{DownloadOptions, DownloadOutcome, DownloadReport, Range};
use crate::effects::fetcher::RangeFetcher;
use crate::effects::http::HttpClient;
use crate::effects::limiter::RateLimiter;
use crate::effects::store::ProgressStore;
use crate::effects::writer::{ChunkWriter, WriterMessage};
use crate::error::{Error, Result};

/// How the wave loop ended.
#[derive(Debug, Clone, Copy)]
struct Waves {
    /// Every slot reported no missing data.
    converged: bool,
    count: u32,
}

/// Resumable, parallel, rate-limited download of one resource.
///
/// Each call to [`download`](Self::download) partitions the file into one slot
/// per connection and runs waves: every slot with missing data gets a
/// [`RangeFetcher`], the wave is joined and the writer drained, and the
/// tracker is queried again. A fetcher that dies leaves a gap the next wave
/// picks up.
pub struct Downloader<C> {
    client: Arc<C>,
    options: DownloadOptions,
}

impl<C: HttpClient> Downloader<C> {
    pub fn new(client: C, options: DownloadOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            client: Arc::new(client),
            options,
        })
    }

    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Download `url`, asking the server for its size first.
    pub async fn download(&self, url: &str) -> Result<DownloadReport> {
        let file_size = self
            .client
            .content_length(url)
            .await
            .map_err(|e| Error::Network(e.to_string()))?
            .ok_or_else(|| Error::UnknownSize(url.to_string()))?;
        self.download_with_size(url, file_size).await
    }

    /// Download `url`, whose size is already known.
    pub async fn download_with_size(&self, url: &str, file_size: u64) -> Result<DownloadReport> {
        let options = &self.options;
        let file_name = file_name_from_url(url)?;
        let slots = partition(file_size, options.max_connections, options.chunk_size)?;

        segdl_fs::ensure_dir(&options.output_dir)?;
        let output_path = options.output_dir.join(&file_name);
        let store = ProgressStore::new(&options.output_dir, &file_name);
        store.cleanup_temporaries();
        let tracker = self.resume_or_create(&store, url, &file_name, file_size)?;

        info!(
            url,
            file = %output_path.display(),
            file_size,
            chunks = tracker.total_chunks(),
            percent = tracker.percent_complete(),
            slots = slots.len(),
            "starting download"
        );

        let snapshot = tracker.clone();
        let writer = ChunkWriter::open(
            &output_path,
            tracker,
            store.clone(),
            options.on_progress.clone(),
        )?;

        let bucket = Arc::new(TokenBucket::new(0));
        let limiter = RateLimiter::new(
            Arc::clone(&bucket),
            options.effective_bytes_per_second(),
            options.refill_policy,
        )
        .spawn();

        let (queue, receiver) = mpsc::unbounded_channel();
        let writer = tokio::task::spawn_blocking(move || writer.run(receiver));

        let waves = self.run_waves(url, &slots, &bucket, &queue, snapshot).await;

        // Every fetcher of the last wave has been joined by now.
        if matches!(waves, Ok(Waves { converged: true, .. })) {
            // a send error means the writer is gone; its result says why
            let _ = queue.send(WriterMessage::EndOfStream);
        }
        drop(queue);
        bucket.terminate();
        let refills = limiter.await?;
        let written = writer.await?;
        debug!(refills, "pipeline stopped");

        let tracker = written?;
        let waves = waves?;

        let outcome = if tracker.is_completed() {
            store.delete();
            store.cleanup_temporaries();
            info!(file = %output_path.display(), waves = waves.count, "download succeeded");
            DownloadOutcome::Succeeded
        } else {
            warn!(
                progress = %store.path().display(),
                percent = tracker.percent_complete(),
                waves = waves.count,
                "download incomplete, progress kept for resume"
            );
            DownloadOutcome::Failed
        };

        Ok(DownloadReport {
            outcome,
            output_path,
            progress: tracker.progress(),
            waves: waves.count,
        })
    }

    fn resume_or_create(
        &self,
        store: &ProgressStore,
        url: &str,
        file_name: &str,
        file_size: u64,
    ) -> Result<RangeTracker> {
        let Some(tracker) = store.load()? else {
            return Ok(RangeTracker::new(
                url,
                file_name,
                file_size,
                self.options.chunk_size,
            ));
        };

        let mismatch = |reason: String| Error::ProgressMismatch {
            path: store.path().to_path_buf(),
            reason,
        };
        if tracker.file_size() != file_size {
            return Err(mismatch(format!(
                "recorded size {} but the resource has {file_size} bytes",
                tracker.file_size()
            )));
        }
        if tracker.chunk_size() != self.options.chunk_size {
            return Err(mismatch(format!(
                "recorded chunk size {} but {} is configured",
                tracker.chunk_size(),
                self.options.chunk_size
            )));
        }
        if tracker.url() != url {
            warn!(recorded = tracker.url(), url, "resuming a download started from another URL");
        }

        info!(
            percent = tracker.percent_complete(),
            written = tracker.chunks_written(),
            "resuming download"
        );
        Ok(tracker.resumed())
    }

    async fn run_waves(
        &self,
        url: &str,
        slots: &[Range],
        bucket: &Arc<TokenBucket>,
        queue: &UnboundedSender<WriterMessage>,
        mut snapshot: RangeTracker,
    ) -> Result<Waves> {
        let url: Arc<str> = Arc::from(url);
        let mut count = 0;
        let mut stalled = 0;

        loop {
            let pending: Vec<Range> = slots
                .iter()
                .filter_map(|&slot| snapshot.missing_sub_range(slot))
                .collect();
            if pending.is_empty() {
                return Ok(Waves {
                    converged: true,
                    count,
                });
            }
            if stalled >= self.options.max_stalled_waves {
                warn!(stalled, "giving up after waves without progress");
                return Ok(Waves {
                    converged: false,
                    count,
                });
            }

            let pause = stall_backoff(stalled, self.options.wave_backoff);
            if !pause.is_zero() {
                debug!(?pause, "backing off before the next wave");
                tokio::time::sleep(pause).await;
            }

            count += 1;
            info!(wave = count, fetchers = pending.len(), "starting wave");

            let fetchers: Vec<_> = pending
                .into_iter()
                .map(|range| {
                    let fetcher = RangeFetcher::new(
                        Arc::clone(&self.client),
                        Arc::clone(&url),
                        range,
                        self.options.chunk_size,
                        Arc::clone(bucket),
                        queue.clone(),
                    );
                    tokio::spawn(fetcher.run())
                })
                .collect();

            let mut enqueued = 0;
            let mut failed = None;
            for fetcher in fetchers {
                match fetcher.await {
                    Ok(report) => enqueued += report.bytes_enqueued,
                    Err(e) => {
                        failed.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = failed {
                return Err(e.into());
            }

            let before = snapshot.chunks_written();
            snapshot = drain(queue).await?;
            let gained = snapshot.chunks_written() - before;
            if gained == 0 {
                stalled += 1;
                warn!(wave = count, stalled, "wave wrote no new chunks");
            } else {
                stalled = 0;
            }

            info!(
                wave = count,
                enqueued,
                gained,
                percent = snapshot.percent_complete(),
                "wave finished"
            );
        }
    }
}

#[cfg(feature = "reqwest")]
impl Downloader<crate::effects::http::ReqwestClient> {
    /// Downloader over a [`ReqwestClient`](crate::ReqwestClient) built from
    /// the configured timeouts.
    pub fn with_reqwest(options: DownloadOptions) -> Result<Self> {
        let client = crate::effects::http::ReqwestClient::new(options.timeouts)
            .map_err(|e| Error::Network(e.to_string()))?;
        Self::new(client, options)
    }
}

/// Wait until the writer has consumed everything enqueued so far.
async fn drain(queue: &UnboundedSender<WriterMessage>) -> Result<RangeTracker> {
    let (reply, snapshot) = oneshot::channel();
    queue
        .send(WriterMessage::Drain(reply))
        .map_err(|_| Error::WriterGone)?;
    snapshot.await.map_err(|_| Error::WriterGone)
}
