//! Archive window model: how far back a channel can be rewound.
//!
//! `Unknown` windows get a fallback span (7 days unless configured) and the
//! span is enforced.  `Unbounded` windows still show the fallback span in the
//! picker but never reject a candidate.

use chrono::{DateTime, Duration, Local};

use crate::protocol::{ArchiveLimit, ArchiveWindow};

/// Span used for windows whose limit the provider didn't report.
pub const DEFAULT_SPAN_HOURS: u32 = 7 * 24;

/// Effective lookback of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveSpan {
    Hours(u32),
    /// No upper bound on lookback.
    Unbounded,
}

impl ArchiveSpan {
    /// Hours to lay out in the picker.  Unbounded spans borrow the fallback.
    pub fn display_hours(self, fallback_hours: u32) -> u32 {
        match self {
            ArchiveSpan::Hours(h) => h,
            ArchiveSpan::Unbounded => fallback_hours,
        }
    }
}

/// Archive rules with a configurable fallback span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchivePolicy {
    pub fallback_hours: u32,
}

impl Default for ArchivePolicy {
    fn default() -> Self {
        Self {
            fallback_hours: DEFAULT_SPAN_HOURS,
        }
    }
}

impl ArchivePolicy {
    pub fn new(fallback_hours: u32) -> Self {
        Self { fallback_hours }
    }

    pub fn effective_span_hours(&self, window: &ArchiveWindow) -> ArchiveSpan {
        match window.limit {
            ArchiveLimit::Bounded(h) => ArchiveSpan::Hours(h),
            ArchiveLimit::Unknown => ArchiveSpan::Hours(self.fallback_hours),
            ArchiveLimit::Unbounded => ArchiveSpan::Unbounded,
        }
    }

    /// Earliest rewindable instant, or `None` when unbounded.  A span reaching
    /// past the earliest representable instant is treated as unbounded.
    pub fn earliest_instant(
        &self,
        window: &ArchiveWindow,
        now: DateTime<Local>,
    ) -> Option<DateTime<Local>> {
        match self.effective_span_hours(window) {
            ArchiveSpan::Hours(h) => now.checked_sub_signed(Duration::hours(i64::from(h))),
            ArchiveSpan::Unbounded => None,
        }
    }

    /// True iff the window has a limit and `candidate` falls before it.
    pub fn is_out_of_range(
        &self,
        window: &ArchiveWindow,
        candidate: DateTime<Local>,
        now: DateTime<Local>,
    ) -> bool {
        match self.earliest_instant(window, now) {
            Some(earliest) => candidate < earliest,
            None => false,
        }
    }
}

/// [`ArchivePolicy::effective_span_hours`] with the default fallback.
pub fn effective_span_hours(window: &ArchiveWindow) -> ArchiveSpan {
    ArchivePolicy::default().effective_span_hours(window)
}

/// [`ArchivePolicy::is_out_of_range`] with the default fallback.
pub fn is_out_of_range(
    window: &ArchiveWindow,
    candidate: DateTime<Local>,
    now: DateTime<Local>,
) -> bool {
    ArchivePolicy::default().is_out_of_range(window, candidate, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 6, 20, 15, 30, 0).unwrap()
    }

    #[test]
    fn test_effective_span_tri_state() {
        assert_eq!(
            effective_span_hours(&ArchiveWindow::new(ArchiveLimit::Bounded(48))),
            ArchiveSpan::Hours(48)
        );
        assert_eq!(
            effective_span_hours(&ArchiveWindow::from_hours_back(0)),
            ArchiveSpan::Hours(168)
        );
        assert_eq!(
            effective_span_hours(&ArchiveWindow::new(ArchiveLimit::Unbounded)),
            ArchiveSpan::Unbounded
        );
    }

    #[test]
    fn test_bounded_48h_edges() {
        let w = ArchiveWindow::from_hours_back(48);
        let t = now();
        assert!(!is_out_of_range(&w, t - Duration::hours(47), t));
        assert!(!is_out_of_range(&w, t - Duration::hours(48), t));
        assert!(is_out_of_range(&w, t - Duration::hours(49), t));
    }

    #[test]
    fn test_future_candidates_never_out_of_range() {
        let t = now();
        for hours in [0u32, 1, 24, 48, 168, 720] {
            let w = ArchiveWindow::from_hours_back(hours);
            assert!(!is_out_of_range(&w, t, t));
            assert!(!is_out_of_range(&w, t + Duration::minutes(5), t));
        }
    }

    #[test]
    fn test_unbounded_never_rejects() {
        let w = ArchiveWindow::new(ArchiveLimit::Unbounded);
        let t = now();
        assert!(!is_out_of_range(&w, t - Duration::days(3650), t));
        assert!(ArchivePolicy::default().earliest_instant(&w, t).is_none());
    }

    #[test]
    fn test_unknown_enforces_fallback() {
        let w = ArchiveWindow::new(ArchiveLimit::Unknown);
        let t = now();
        assert!(!is_out_of_range(&w, t - Duration::hours(167), t));
        assert!(is_out_of_range(&w, t - Duration::hours(169), t));

        let policy = ArchivePolicy::new(24);
        assert!(policy.is_out_of_range(&w, t - Duration::hours(25), t));
    }

    #[test]
    fn test_huge_bounded_window_does_not_overflow() {
        let w = ArchiveWindow::new(ArchiveLimit::Bounded(u32::MAX));
        assert_eq!(ArchivePolicy::default().earliest_instant(&w, now()), None);
        assert!(!is_out_of_range(&w, now(), now()));
        assert!(!is_out_of_range(&w, now() - Duration::days(3650), now()));
    }

    #[test]
    fn test_display_hours() {
        assert_eq!(ArchiveSpan::Hours(12).display_hours(168), 12);
        assert_eq!(ArchiveSpan::Unbounded.display_hours(168), 168);
    }
}
