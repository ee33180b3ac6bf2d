use crate::config::QueueIntervals;
use std::time::Duration;
use time::OffsetDateTime;

/// Returns the next queue poll interval based on the earliest pending due time.
///
/// The fast interval only applies while something is due within the fast
/// window (or already overdue); with nothing imminent it falls back to the
/// slow interval on its own.
pub fn next_poll_interval(
    next_due: Option<OffsetDateTime>,
    now: OffsetDateTime,
    intervals: &QueueIntervals,
) -> Duration {
    let Some(next_due) = next_due else {
        return intervals.slow;
    };
    let until_due = next_due - now;
    match until_due {
        d if d <= time::Duration::ZERO => intervals.fast,
        d if d <= intervals.fast_window => intervals.fast,
        _ => intervals.slow,
    }
}
