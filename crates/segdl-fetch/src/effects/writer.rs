use std::path::Path;

use segdl_fs::PositionedFile;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;
use tracing::{debug, error, info, trace, warn};

use crate::core::RangeTracker;
use crate::data::{Chunk, ProgressCallback};
use crate::effects::store::ProgressStore;
use crate::error::{Error, Result};

/// Message on the chunk queue.
#[derive(Debug)]
pub enum WriterMessage {
    Chunk(Chunk),

    /// Barrier: answered with a tracker snapshot once every earlier message
    /// has been handled.
    Drain(oneshot::Sender<RangeTracker>),

    /// No more chunks will follow; the download is complete.
    EndOfStream,
}

/// The single consumer of the chunk queue.
///
/// Owns the output file and the only mutable [`RangeTracker`]. Progress is
/// persisted each time the completion percentage rises; the output file is
/// synced first so a chunk is never recorded before its bytes are durable.
pub struct ChunkWriter {
    file: PositionedFile,
    tracker: RangeTracker,
    store: ProgressStore,
    last_persisted: u8,
    last_reported: u8,
    on_progress: Option<ProgressCallback>,
}

impl ChunkWriter {
    /// Open (or create) the output file at its full size.
    pub fn open(
        path: impl AsRef<Path>,
        tracker: RangeTracker,
        store: ProgressStore,
        on_progress: Option<ProgressCallback>,
    ) -> Result<Self> {
        let file = PositionedFile::open(path, tracker.file_size())?;
        let percent = tracker.percent_complete();
        Ok(Self {
            file,
            tracker,
            store,
            last_persisted: percent,
            last_reported: percent,
            on_progress,
        })
    }

    /// Consume the queue until end-of-stream or until every sender is gone.
    ///
    /// Blocks the calling thread; run it with `spawn_blocking`. The returned
    /// tracker is completed only if [`WriterMessage::EndOfStream`] was seen.
    pub fn run(mut self, mut queue: UnboundedReceiver<WriterMessage>) -> Result<RangeTracker> {
        while let Some(message) = queue.blocking_recv() {
            match message {
                WriterMessage::Chunk(chunk) => {
                    if let Err(e) = self.write(&chunk) {
                        error!(offset = chunk.offset(), error = %e, "failed to write chunk");
                        self.persist();
                        return Err(e);
                    }
                }
                WriterMessage::Drain(reply) => {
                    // the orchestrator may have stopped waiting
                    let _ = reply.send(self.tracker.clone());
                }
                WriterMessage::EndOfStream => {
                    self.tracker.set_completed();
                    self.persist();
                    info!(
                        file = %self.file.path().display(),
                        chunks = self.tracker.total_chunks(),
                        "all chunks written"
                    );
                    return Ok(self.tracker);
                }
            }
        }

        debug!("chunk queue closed without end-of-stream");
        self.persist();
        Ok(self.tracker)
    }

    fn write(&mut self, chunk: &Chunk) -> Result<()> {
        self.file.write_at(chunk.offset(), chunk.data())?;

        if let Some(index) = self.tracker.completes_chunk(chunk.offset(), chunk.len()) {
            if self.tracker.mark_chunk_written(index) {
                trace!(index, "chunk written");
            }
        }

        let percent = self.tracker.percent_complete();
        if percent > self.last_persisted {
            self.persist();
        }
        if percent > self.last_reported {
            self.last_reported = percent;
            if let Some(on_progress) = &self.on_progress {
                on_progress(&self.tracker.progress());
            }
        }
        Ok(())
    }

    /// Sync the output file and save the tracker. A failure is logged and
    /// retried on the next chunk.
    fn persist(&mut self) -> bool {
        let saved = self
            .file
            .sync_data()
            .map_err(Error::from)
            .and_then(|()| self.store.save(&self.tracker));

        match saved {
            Ok(()) => {
                self.last_persisted = self.tracker.percent_complete();
                true
            }
            Err(e) => {
                warn!(
                    path = %self.store.path().display(),
                    error = %e,
                    "failed to persist progress"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Progress;
    use bytes::Bytes;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    const CS: usize = 4;

    fn chunk(offset: u64, data: &[u8]) -> WriterMessage {
        WriterMessage::Chunk(Chunk::new(offset, Bytes::copy_from_slice(data)))
    }

    fn setup(dir: &Path, size: u64) -> (ChunkWriter, ProgressStore) {
        let store = ProgressStore::new(dir, "out.bin");
        let tracker = RangeTracker::new("http://h/out.bin", "out.bin", size, CS);
        let writer = ChunkWriter::open(dir.join("out.bin"), tracker, store.clone(), None).unwrap();
        (writer, store)
    }

    #[test]
    fn test_positioned_writes_and_completion() {
        let dir = tempdir().unwrap();
        let (writer, store) = setup(dir.path(), 10);
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(chunk(8, b"ij")).unwrap();
        tx.send(chunk(0, b"abcd")).unwrap();
        tx.send(chunk(4, b"efgh")).unwrap();
        tx.send(WriterMessage::EndOfStream).unwrap();

        let tracker = writer.run(rx).unwrap();
        assert!(tracker.is_completed());
        assert_eq!(tracker.percent_complete(), 100);
        assert_eq!(fs::read(dir.path().join("out.bin")).unwrap(), b"abcdefghij");
        assert!(store.load().unwrap().unwrap().is_completed());
    }

    #[test]
    fn test_all_chunks_without_sentinel_is_not_completed() {
        let dir = tempdir().unwrap();
        let (writer, store) = setup(dir.path(), 8);
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(chunk(0, b"abcd")).unwrap();
        tx.send(chunk(4, b"efgh")).unwrap();
        drop(tx);

        let tracker = writer.run(rx).unwrap();
        assert_eq!(tracker.percent_complete(), 100);
        assert!(!tracker.is_completed());
        assert!(!store.load().unwrap().unwrap().is_completed());
    }

    #[test]
    fn test_partial_chunk_is_written_but_not_marked() {
        let dir = tempdir().unwrap();
        let (writer, _store) = setup(dir.path(), 8);
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(chunk(0, b"ab")).unwrap();
        tx.send(chunk(4, b"efgh")).unwrap();
        drop(tx);

        let tracker = writer.run(rx).unwrap();
        assert_eq!(tracker.chunks_written(), 1);
        assert!(tracker.is_missing(0));
        assert_eq!(&fs::read(dir.path().join("out.bin")).unwrap()[..2], b"ab");
    }

    #[test]
    fn test_drain_replies_after_earlier_chunks() {
        let dir = tempdir().unwrap();
        let (writer, _store) = setup(dir.path(), 8);
        let (tx, rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = oneshot::channel();

        tx.send(chunk(0, b"abcd")).unwrap();
        tx.send(WriterMessage::Drain(reply_tx)).unwrap();
        tx.send(chunk(4, b"efgh")).unwrap();
        drop(tx);

        let tracker = writer.run(rx).unwrap();
        let snapshot = reply_rx.blocking_recv().unwrap();
        assert_eq!(snapshot.chunks_written(), 1);
        assert_eq!(tracker.chunks_written(), 2);
    }

    #[test]
    fn test_persists_only_when_percent_rises() {
        let dir = tempdir().unwrap();
        let store = ProgressStore::new(dir.path(), "out.bin");
        // 400 chunks: each one is a quarter of a percent
        let tracker = RangeTracker::new("http://h/out.bin", "out.bin", 1600, CS);
        let reported = Arc::new(Mutex::new(Vec::new()));
        let on_progress: ProgressCallback = {
            let reported = Arc::clone(&reported);
            Arc::new(move |p: &Progress| reported.lock().unwrap().push(p.percent))
        };
        let writer =
            ChunkWriter::open(dir.path().join("out.bin"), tracker, store.clone(), Some(on_progress))
                .unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        for i in 0..3 {
            tx.send(chunk(i * 4, b"wxyz")).unwrap();
        }
        let (drain_tx, drain_rx) = oneshot::channel();
        tx.send(WriterMessage::Drain(drain_tx)).unwrap();
        tx.send(chunk(12, b"wxyz")).unwrap();
        drop(tx);

        let handle = std::thread::spawn(move || writer.run(rx));
        let snapshot = drain_rx.blocking_recv().unwrap();
        assert_eq!(snapshot.percent_complete(), 0);

        handle.join().unwrap().unwrap();
        assert_eq!(*reported.lock().unwrap(), vec![1]);
        assert_eq!(store.load().unwrap().unwrap().chunks_written(), 4);
    }

    #[test]
    fn test_failed_save_is_retried_on_a_later_chunk() {
        let dir = tempdir().unwrap();
        let (writer, store) = setup(dir.path(), 16);
        // a directory where the progress file belongs makes the rename fail
        fs::create_dir(store.path()).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = std::thread::spawn(move || writer.run(rx));

        let (drain_tx, drain_rx) = oneshot::channel();
        tx.send(chunk(0, b"abcd")).unwrap();
        tx.send(WriterMessage::Drain(drain_tx)).unwrap();
        assert_eq!(drain_rx.blocking_recv().unwrap().chunks_written(), 1);
        assert!(store.path().is_dir());
        assert!(!store.temp_path().unwrap().exists());

        fs::remove_dir(store.path()).unwrap();
        tx.send(chunk(4, b"efgh")).unwrap();
        drop(tx);

        let tracker = handle.join().unwrap().unwrap();
        assert_eq!(tracker.chunks_written(), 2);
        assert_eq!(store.load().unwrap().unwrap().chunks_written(), 2);
        assert_eq!(&fs::read(dir.path().join("out.bin")).unwrap()[..8], b"abcdefgh");
    }

    #[test]
    fn test_resumed_tracker_keeps_earlier_bytes() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("out.bin"), b"abcd????").unwrap();

        let store = ProgressStore::new(dir.path(), "out.bin");
        let mut tracker = RangeTracker::new("http://h/out.bin", "out.bin", 8, CS);
        tracker.mark_chunk_written(0);
        let writer = ChunkWriter::open(dir.path().join("out.bin"), tracker, store, None).unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(chunk(4, b"efgh")).unwrap();
        tx.send(WriterMessage::EndOfStream).unwrap();

        assert!(writer.run(rx).unwrap().is_completed());
        assert_eq!(fs::read(dir.path().join("out.bin")).unwrap(), b"abcdefgh");
    }
}
