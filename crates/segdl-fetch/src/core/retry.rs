use std::time::Duration;

/// Upper bound on the pause between two stalled waves.
pub const MAX_WAVE_BACKOFF: Duration = Duration::from_secs(30);

/// Pause before re-running a wave after `stalled` consecutive waves that wrote
/// nothing new.
///
/// Uses exponential backoff: `base * 2^(stalled - 1)`, saturating and capped
/// at [`MAX_WAVE_BACKOFF`]. No pause is needed before the first stall.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use segdl_fetch::stall_backoff;
///
/// let base = Duration::from_millis(500);
/// assert_eq!(stall_backoff(0, base), Duration::ZERO);
/// assert_eq!(stall_backoff(1, base), Duration::from_millis(500));
/// assert_eq!(stall_backoff(3, base), Duration::from_secs(2));
/// ```
pub fn stall_backoff(stalled: u32, base: Duration) -> Duration {
    if stalled == 0 {
        return Duration::ZERO;
    }
    let multiplier = 2_u32.saturating_pow(stalled - 1);
    base.saturating_mul(multiplier).min(MAX_WAVE_BACKOFF)
}
