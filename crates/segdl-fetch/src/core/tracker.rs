//! Per-chunk download progress.
//!
//! A [`RangeTracker`] records which fixed-size chunks of the output file have
//! been written. It is mutated only by the chunk writer; everyone else sees
//! snapshots.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{Progress, Range};

/// Number of chunks needed to cover `file_size` bytes.
///
/// # Examples
///
/// ```
/// use segdl_fetch::chunk_count;
///
/// assert_eq!(chunk_count(10_000, 4096), 3);
/// assert_eq!(chunk_count(8192, 4096), 2);
/// assert_eq!(chunk_count(0, 4096), 0);
/// ```
pub fn chunk_count(file_size: u64, chunk_size: usize) -> u64 {
    file_size.div_ceil(chunk_size as u64)
}

/// Inclusive span of chunk indices that are still missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpan {
    pub first: u64,
    pub last: u64,
}

/// Error returned when persisted spans cannot describe a valid tracker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid missing spans: {0}")]
pub struct InvalidSpans(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeTracker {
    url: String,
    file_name: String,
    file_size: u64,
    chunk_size: u64,
    missing: Vec<bool>,
    written: u64,
    completed: bool,
}

impl RangeTracker {
    /// Fresh tracker with every chunk missing.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is 0.
    pub fn new(
        url: impl Into<String>,
        file_name: impl Into<String>,
        file_size: u64,
        chunk_size: usize,
    ) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        let total = chunk_count(file_size, chunk_size);
        Self {
            url: url.into(),
            file_name: file_name.into(),
            file_size,
            chunk_size: chunk_size as u64,
            missing: vec![true; total as usize],
            written: 0,
            completed: false,
        }
    }

    /// Rebuild a tracker from its run-length persisted form.
    ///
    /// `written` is the stored count and must agree with the spans.
    pub fn from_spans(
        url: impl Into<String>,
        file_name: impl Into<String>,
        file_size: u64,
        chunk_size: usize,
        spans: &[ChunkSpan],
        written: u64,
        completed: bool,
    ) -> Result<Self, InvalidSpans> {
        if chunk_size == 0 {
            return Err(InvalidSpans("chunk size is zero".into()));
        }
        let mut tracker = Self::new(url, file_name, file_size, chunk_size);
        tracker.missing.fill(false);

        let total = tracker.total_chunks();
        let mut next_allowed = 0;
        let mut missing = 0;
        for span in spans {
            if span.first > span.last {
                return Err(InvalidSpans(format!(
                    "span {}..={} is inverted",
                    span.first, span.last
                )));
            }
            if span.first < next_allowed {
                return Err(InvalidSpans(format!(
                    "span {}..={} overlaps or precedes the previous span",
                    span.first, span.last
                )));
            }
            if span.last >= total {
                return Err(InvalidSpans(format!(
                    "span {}..={} exceeds {total} chunks",
                    span.first, span.last
                )));
            }
            tracker.missing[span.first as usize..=span.last as usize].fill(true);
            missing += span.last - span.first + 1;
            next_allowed = span.last + 1;
        }

        if completed && missing != 0 {
            return Err(InvalidSpans(format!(
                "marked completed with {missing} chunks still missing"
            )));
        }

        let derived = total - missing;
        if derived != written {
            return Err(InvalidSpans(format!(
                "stored written count {written} disagrees with spans ({derived})"
            )));
        }
        tracker.written = derived;
        tracker.completed = completed;
        Ok(tracker)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size as usize
    }

    pub fn total_chunks(&self) -> u64 {
        self.missing.len() as u64
    }

    pub fn chunks_written(&self) -> u64 {
        self.written
    }

    pub fn is_missing(&self, index: u64) -> bool {
        self.missing.get(index as usize).copied().unwrap_or(false)
    }

    /// Mark a chunk present. Returns `true` if it was missing before.
    ///
    /// Out-of-range indices are ignored.
    pub fn mark_chunk_written(&mut self, index: u64) -> bool {
        match self.missing.get_mut(index as usize) {
            Some(flag) if *flag => {
                *flag = false;
                self.written += 1;
                true
            }
            _ => false,
        }
    }

    /// Index of the chunk a write covers in full, if any.
    ///
    /// A write completes a chunk only when it starts on a chunk boundary and
    /// either spans a whole chunk or ends exactly at the end of the file.
    pub fn completes_chunk(&self, offset: u64, len: usize) -> Option<u64> {
        if offset % self.chunk_size != 0 || offset >= self.file_size {
            return None;
        }
        let expected = self.chunk_size.min(self.file_size - offset);
        (len as u64 == expected).then_some(offset / self.chunk_size)
    }

    /// `floor(100 * written / total)`; an empty file is 100% complete.
    pub fn percent_complete(&self) -> u8 {
        let total = self.total_chunks();
        if total == 0 {
            return 100;
        }
        (self.written * 100 / total) as u8
    }

    /// Bytes covered by written chunks.
    pub fn bytes_written(&self) -> u64 {
        let mut bytes = self.written * self.chunk_size;
        let tail = self.file_size % self.chunk_size;
        if tail != 0 && self.missing.last() == Some(&false) {
            bytes -= self.chunk_size - tail;
        }
        bytes
    }

    pub fn progress(&self) -> Progress {
        Progress {
            percent: self.percent_complete(),
            chunks_written: self.written,
            total_chunks: self.total_chunks(),
            bytes_written: self.bytes_written(),
            file_size: self.file_size,
        }
    }

    /// The earliest contiguous run of missing chunks inside `requested`.
    ///
    /// The result starts on the boundary of its first missing chunk, so an
    /// unaligned request can widen backwards; a chunk-aligned one never
    /// does. It ends one byte before the next
    /// present chunk, or at `requested.end` when no present chunk follows
    /// within the window. `None` when every chunk touched by `requested` is
    /// present.
    pub fn missing_sub_range(&self, requested: Range) -> Option<Range> {
        let total = self.total_chunks();
        let first = requested.start / self.chunk_size;
        if first >= total {
            return None;
        }
        let last = (requested.end / self.chunk_size).min(total - 1);

        let mut gap_start = None;
        for index in first..=last {
            match (gap_start, self.missing[index as usize]) {
                (None, true) => gap_start = Some(index),
                (Some(start), false) => {
                    return Some(Range::new(
                        start * self.chunk_size,
                        index * self.chunk_size - 1,
                    ));
                }
                _ => {}
            }
        }
        gap_start.map(|start| Range::new(start * self.chunk_size, requested.end))
    }

    /// Run-length encoding of the missing flags.
    pub fn missing_spans(&self) -> Vec<ChunkSpan> {
        let mut spans = Vec::new();
        let mut open: Option<u64> = None;
        for (index, &missing) in self.missing.iter().enumerate() {
            let index = index as u64;
            match (open, missing) {
                (None, true) => open = Some(index),
                (Some(first), false) => {
                    spans.push(ChunkSpan {
                        first,
                        last: index - 1,
                    });
                    open = None;
                }
                _ => {}
            }
        }
        if let Some(first) = open {
            spans.push(ChunkSpan {
                first,
                last: self.total_chunks() - 1,
            });
        }
        spans
    }

    /// One-way transition, asserted by the writer on end-of-stream.
    pub fn set_completed(&mut self) {
        self.completed = true;
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// The same progress with completion cleared, for a new run whose writer
    /// has yet to see end-of-stream.
    pub fn resumed(mut self) -> Self {
        self.completed = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CS: usize = 4096;

    fn tracker(size: u64) -> RangeTracker {
        RangeTracker::new("http://example.com/file.bin", "file.bin", size, CS)
    }

    #[test]
    fn counts_chunks() {
        let t = tracker(10_000);
        assert_eq!(t.total_chunks(), 3);
        assert_eq!(t.chunks_written(), 0);
        assert_eq!(t.percent_complete(), 0);
        assert!(!t.is_completed());
    }

    #[test]
    fn mark_is_idempotent() {
        let mut t = tracker(10_000);
        assert!(t.mark_chunk_written(1));
        assert!(!t.mark_chunk_written(1));
        assert_eq!(t.chunks_written(), 1);
        assert_eq!(t.percent_complete(), 33);
        assert!(!t.mark_chunk_written(99));
    }

    #[test]
    fn full_coverage_is_not_completion() {
        let mut t = tracker(10_000);
        for i in 0..3 {
            t.mark_chunk_written(i);
        }
        assert_eq!(t.percent_complete(), 100);
        assert!(!t.is_completed());
        t.set_completed();
        t.set_completed();
        assert!(t.is_completed());
    }

    #[test]
    fn empty_file_is_fully_written() {
        let t = tracker(0);
        assert_eq!(t.total_chunks(), 0);
        assert_eq!(t.percent_complete(), 100);
        assert_eq!(t.missing_sub_range(Range::new(0, 0)), None);
        assert!(t.missing_spans().is_empty());
    }

    #[test]
    fn unaligned_requests_widen_to_chunk_boundaries() {
        let t = tracker(10_000);
        assert_eq!(
            t.missing_sub_range(Range::new(0, 3332)),
            Some(Range::new(0, 3332))
        );
        assert_eq!(
            t.missing_sub_range(Range::new(3333, 6665)),
            Some(Range::new(0, 6665))
        );
        assert_eq!(
            t.missing_sub_range(Range::new(6666, 9999)),
            Some(Range::new(4096, 9999))
        );
    }

    #[test]
    fn gap_stops_before_present_chunk() {
        let mut t = tracker(5 * CS as u64);
        t.mark_chunk_written(0);
        t.mark_chunk_written(2);
        let whole = Range::new(0, 5 * CS as u64 - 1);
        assert_eq!(
            t.missing_sub_range(whole),
            Some(Range::new(4096, 8191))
        );

        t.mark_chunk_written(1);
        assert_eq!(
            t.missing_sub_range(whole),
            Some(Range::new(12288, 20479))
        );

        t.mark_chunk_written(3);
        t.mark_chunk_written(4);
        assert_eq!(t.missing_sub_range(whole), None);
    }

    #[test]
    fn dead_fetcher_leaves_whole_chunk_missing() {
        let mut t = tracker(3 * CS as u64);
        t.mark_chunk_written(0);
        // a write of [4096, 6000] does not complete chunk 1
        assert_eq!(t.completes_chunk(4096, 1905), None);
        assert_eq!(
            t.missing_sub_range(Range::new(4096, 8191)),
            Some(Range::new(4096, 8191))
        );
    }

    #[test]
    fn completes_chunk_rules() {
        let t = tracker(10_000);
        assert_eq!(t.completes_chunk(0, 4096), Some(0));
        assert_eq!(t.completes_chunk(8192, 1808), Some(2));
        assert_eq!(t.completes_chunk(8192, 1000), None);
        assert_eq!(t.completes_chunk(0, 3333), None);
        assert_eq!(t.completes_chunk(3333, 4096), None);
        assert_eq!(t.completes_chunk(12288, 4096), None);
    }

    #[test]
    fn bytes_written_accounts_for_short_tail() {
        let mut t = tracker(10_000);
        t.mark_chunk_written(2);
        assert_eq!(t.bytes_written(), 1808);
        t.mark_chunk_written(0);
        assert_eq!(t.bytes_written(), 4096 + 1808);
    }

    #[test]
    fn spans_round_trip_through_from_spans() {
        let mut t = tracker(10 * CS as u64);
        for i in [0, 1, 4, 9] {
            t.mark_chunk_written(i);
        }
        let spans = t.missing_spans();
        assert_eq!(
            spans,
            vec![
                ChunkSpan { first: 2, last: 3 },
                ChunkSpan { first: 5, last: 8 }
            ]
        );

        let restored = RangeTracker::from_spans(
            t.url(),
            t.file_name(),
            t.file_size(),
            CS,
            &spans,
            t.chunks_written(),
            false,
        )
        .unwrap();
        assert_eq!(restored, t);
    }

    #[test]
    fn completed_with_missing_chunks_is_invalid() {
        let spans = [ChunkSpan { first: 0, last: 1 }];
        let err = RangeTracker::from_spans("u", "f", 2 * CS as u64, CS, &spans, 0, true);
        assert!(err.is_err());

        let done = RangeTracker::from_spans("u", "f", 2 * CS as u64, CS, &[], 2, true).unwrap();
        assert!(done.is_completed());
        let resumed = done.resumed();
        assert!(!resumed.is_completed());
        assert_eq!(resumed.chunks_written(), 2);
    }

    #[test]
    fn from_spans_rejects_bad_input() {
        let size = 4 * CS as u64;
        let build = |spans: &[ChunkSpan], written| {
            RangeTracker::from_spans("u", "f", size, CS, spans, written, false)
        };

        assert!(build(&[ChunkSpan { first: 2, last: 1 }], 4).is_err());
        assert!(build(&[ChunkSpan { first: 0, last: 4 }], 0).is_err());
        assert!(
            build(
                &[ChunkSpan { first: 0, last: 1 }, ChunkSpan { first: 1, last: 2 }],
                1
            )
            .is_err()
        );
        assert!(build(&[ChunkSpan { first: 0, last: 1 }], 3).is_err());
        assert!(build(&[ChunkSpan { first: 0, last: 1 }], 2).is_ok());
    }

    proptest! {
        #[test]
        fn missing_sub_range_is_aligned_and_bounded(
            size in 1u64..200_000,
            marks in proptest::collection::vec(any::<bool>(), 0..64),
            a in any::<u64>(),
            b in any::<u64>(),
        ) {
            let mut t = tracker(size);
            for (i, &present) in marks.iter().enumerate() {
                if present {
                    t.mark_chunk_written(i as u64);
                }
            }
            let (lo, hi) = (a % size, b % size);
            let requested = Range::new(lo.min(hi), lo.max(hi));

            match t.missing_sub_range(requested) {
                None => {
                    let first = requested.start / CS as u64;
                    let last = requested.end / CS as u64;
                    for i in first..=last {
                        prop_assert!(!t.is_missing(i));
                    }
                }
                Some(gap) => {
                    prop_assert_eq!(gap.start % CS as u64, 0);
                    prop_assert!(t.is_missing(gap.start / CS as u64));
                    prop_assert!(gap.start <= requested.end);
                    prop_assert!(gap.end <= requested.end);
                    prop_assert!(gap.start / CS as u64 >= requested.start / CS as u64);
                }
            }
        }

        #[test]
        fn gap_stays_inside_aligned_request(
            chunks in 1u64..48,
            tail in 1u64..=4096,
            marks in proptest::collection::vec(any::<bool>(), 0..48),
            first in any::<u64>(),
            len in any::<u64>(),
        ) {
            let size = (chunks - 1) * CS as u64 + tail;
            let mut t = tracker(size);
            for (i, &present) in marks.iter().enumerate() {
                if present {
                    t.mark_chunk_written(i as u64);
                }
            }
            let start = (first % chunks) * CS as u64;
            let end = start + len % (size - start);
            let requested = Range::new(start, end);

            if let Some(gap) = t.missing_sub_range(requested) {
                prop_assert!(gap.start >= requested.start);
                prop_assert!(gap.end <= requested.end);
                prop_assert_eq!(gap.start % CS as u64, 0);
                // every chunk inside the gap is missing
                for i in gap.start / CS as u64..=gap.end / CS as u64 {
                    prop_assert!(t.is_missing(i));
                }
            }
        }

        #[test]
        fn written_count_matches_flags(
            size in 0u64..100_000,
            marks in proptest::collection::vec(0u64..40, 0..80),
        ) {
            let mut t = tracker(size);
            for i in marks {
                t.mark_chunk_written(i);
            }
            let present = (0..t.total_chunks()).filter(|&i| !t.is_missing(i)).count() as u64;
            prop_assert_eq!(t.chunks_written(), present);

            let restored = RangeTracker::from_spans(
                t.url(), t.file_name(), size, CS, &t.missing_spans(), t.chunks_written(), false,
            );
            prop_assert_eq!(restored, Ok(t));
        }
    }
}
