use crate::data::Range;
use crate::error::{Error, Result};

/// Split `[0, file_size)` into contiguous per-worker slots on chunk boundaries.
///
/// Worker `i` nominally owns `i * (file_size / workers)` onwards; that offset
/// is rounded up to the next chunk boundary so every chunk belongs to exactly
/// one slot. The last slot ends at the last byte. Slots that round away to
/// nothing are dropped, so there may be fewer slots than workers. An empty
/// resource has no slots.
///
/// # Examples
///
/// ```
/// use segdl_fetch::{Range, partition};
///
/// let slots = partition(10_000, 3, 4096).unwrap();
/// assert_eq!(
///     slots,
///     vec![Range::new(0, 4095), Range::new(4096, 8191), Range::new(8192, 9999)]
/// );
/// ```
pub fn partition(file_size: u64, workers: usize, chunk_size: usize) -> Result<Vec<Range>> {
    if workers == 0 {
        return Err(Error::InvalidOptions(
            "number of workers must be greater than 0".into(),
        ));
    }
    if chunk_size == 0 {
        return Err(Error::InvalidOptions("chunk size must be greater than 0".into()));
    }
    if file_size == 0 {
        return Ok(Vec::new());
    }

    let workers = workers as u64;
    let chunk_size = chunk_size as u64;
    let slice = file_size / workers;
    let boundary = |i: u64| ((i * slice).div_ceil(chunk_size) * chunk_size).min(file_size);

    let slots = (0..workers)
        .filter_map(|i| {
            let start = boundary(i);
            let end = if i == workers - 1 {
                file_size
            } else {
                boundary(i + 1)
            };
            (start < end).then(|| Range::new(start, end - 1))
        })
        .collect();
    Ok(slots)
}
