//! Busy periods: padding by a buffer and merging into a sorted,
//! non-overlapping list that free-slot checks can scan.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::expander::ExpandedEvent;
use crate::materialize::Occurrence;

/// A time interval availability computation must avoid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyBlock {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BusyBlock {
    /// Widen the block by `minutes` on both ends.
    pub fn padded(self, minutes: u32) -> Self {
        let pad = Duration::minutes(i64::from(minutes));
        Self {
            start: self.start - pad,
            end: self.end + pad,
        }
    }

    /// Half-open overlap: `start < self.end && end > self.start`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end && end > self.start
    }
}

impl From<&ExpandedEvent> for BusyBlock {
    fn from(e: &ExpandedEvent) -> Self {
        Self {
            start: e.start,
            end: e.end,
        }
    }
}

impl From<&Occurrence> for BusyBlock {
    fn from(o: &Occurrence) -> Self {
        Self {
            start: o.start(),
            end: o.end(),
        }
    }
}

/// Merge overlapping or adjacent busy periods.
///
/// Returns a sorted, non-overlapping list.
pub fn merge_busy_periods(blocks: &[BusyBlock]) -> Vec<BusyBlock> {
    let mut intervals: Vec<BusyBlock> = blocks.iter().filter(|b| b.start < b.end).copied().collect();

    // Sort by start time (then by end time for stability).
    intervals.sort_by_key(|b| (b.start, b.end));

    let mut merged: Vec<BusyBlock> = Vec::with_capacity(intervals.len());
    for block in intervals {
        if let Some(last) = merged.last_mut() {
            if block.start <= last.end {
                // Overlapping or adjacent: extend the current interval.
                last.end = last.end.max(block.end);
                continue;
            }
        }
        merged.push(block);
    }

    merged
}

/// Whether `[start, end)` overlaps none of the merged periods.
pub fn is_free(merged: &[BusyBlock], start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    // First period ending after `start`; earlier ones cannot overlap.
    let first = merged.partition_point(|b| b.end <= start);
    merged.get(first).is_none_or(|b| !b.overlaps(start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn block(sh: u32, sm: u32, eh: u32, em: u32) -> BusyBlock {
        BusyBlock {
            start: Utc.with_ymd_and_hms(2026, 3, 2, sh, sm, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 3, 2, eh, em, 0).unwrap(),
        }
    }

    #[test]
    fn merges_overlapping_and_adjacent() {
        let merged = merge_busy_periods(&[block(11, 0, 12, 0), block(9, 0, 10, 0), block(10, 0, 10, 30), block(9, 30, 9, 45)]);
        assert_eq!(merged, vec![block(9, 0, 10, 30), block(11, 0, 12, 0)]);
    }

    #[test]
    fn padding_widens_both_ends() {
        assert_eq!(block(10, 0, 11, 0).padded(15), block(9, 45, 11, 15));
    }

    #[test]
    fn free_check_uses_half_open_intervals() {
        let merged = merge_busy_periods(&[block(10, 0, 11, 0), block(13, 0, 14, 0)]);
        assert!(is_free(&merged, block(9, 30, 10, 0).start, block(9, 30, 10, 0).end));
        assert!(!is_free(&merged, block(9, 45, 10, 15).start, block(9, 45, 10, 15).end));
        assert!(is_free(&merged, block(11, 0, 11, 30).start, block(11, 0, 11, 30).end));
        assert!(!is_free(&merged, block(12, 30, 13, 30).start, block(12, 30, 13, 30).end));
        assert!(is_free(&merged, block(14, 0, 15, 0).start, block(14, 0, 15, 0).end));
    }
}
