use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::core::TokenBucket;
use crate::data::{Chunk, Range};
use crate::effects::http::HttpClient;
use crate::effects::writer::WriterMessage;
use crate::error::{Error, Result};

/// What a single fetcher managed to hand to the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchReport {
    pub range: Range,
    pub bytes_enqueued: u64,
    pub chunks_enqueued: u64,
    /// Whether the whole range was enqueued.
    pub completed: bool,
}

/// Producer for one byte range.
///
/// Issues one ranged request, slices the body into chunk-size pieces, waits on
/// the token bucket before each piece and enqueues it with its absolute
/// offset. Failures end the fetch without retrying; whatever was not written
/// is found again by the next wave.
pub struct RangeFetcher<C> {
    client: Arc<C>,
    url: Arc<str>,
    range: Range,
    chunk_size: usize,
    bucket: Arc<TokenBucket>,
    queue: UnboundedSender<WriterMessage>,
}

impl<C: HttpClient> RangeFetcher<C> {
    pub fn new(
        client: Arc<C>,
        url: Arc<str>,
        range: Range,
        chunk_size: usize,
        bucket: Arc<TokenBucket>,
        queue: UnboundedSender<WriterMessage>,
    ) -> Self {
        Self {
            client,
            url,
            range,
            chunk_size,
            bucket,
            queue,
        }
    }

    /// Fetch until the range is exhausted, the body ends, or an error occurs.
    pub async fn run(self) -> FetchReport {
        let mut report = FetchReport {
            range: self.range,
            bytes_enqueued: 0,
            chunks_enqueued: 0,
            completed: false,
        };

        match self.transfer(&mut report).await {
            Ok(()) => debug!(
                range = %self.range,
                bytes = report.bytes_enqueued,
                completed = report.completed,
                "range fetch finished"
            ),
            Err(e) => warn!(
                range = %self.range,
                offset = self.range.start + report.bytes_enqueued,
                error = %e,
                "range fetch failed"
            ),
        }
        report
    }

    /// Tokens for a chunk are withdrawn before its bytes are read, so when the
    /// body ends exactly on a chunk boundary the last withdrawal pays for no
    /// bytes.
    async fn transfer(&self, report: &mut FetchReport) -> Result<()> {
        let mut stream = self
            .client
            .fetch_range(&self.url, self.range)
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let mut offset = self.range.start;
        let mut leftover = Bytes::new();
        let mut body_ended = false;

        while offset <= self.range.end && !body_ended {
            let want = (self.chunk_size as u64).min(self.range.end - offset + 1) as usize;
            self.bucket.take(want as u64).await;

            let mut buf = BytesMut::with_capacity(want);
            while buf.len() < want {
                if leftover.is_empty() {
                    match stream.next().await {
                        Some(Ok(bytes)) => leftover = bytes,
                        // the partial buffer is dropped; its chunk stays missing
                        Some(Err(e)) => return Err(Error::Network(e.to_string())),
                        None => {
                            body_ended = true;
                            break;
                        }
                    }
                    continue;
                }
                let take = (want - buf.len()).min(leftover.len());
                buf.extend_from_slice(&leftover.split_to(take));
            }

            if buf.is_empty() {
                break;
            }
            let len = buf.len() as u64;
            self.queue
                .send(WriterMessage::Chunk(Chunk::new(offset, buf.freeze())))
                .map_err(|_| Error::WriterGone)?;
            offset += len;
            report.bytes_enqueued += len;
            report.chunks_enqueued += 1;
        }

        report.completed = offset > self.range.end;
        Ok(())
    }
}
