//! Rewind time picker: day/hour/minute columns over an archive window.
//!
//! The day domain is rebuilt from a fresh `now` every time the picker opens.
//! Column moves clamp at both ends; nothing here wraps.

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Timelike};
use tv_proto::archive::ArchivePolicy;
use tv_proto::protocol::{ArchiveLimit, ArchiveWindow};

pub const MAX_HOUR: usize = 23;
pub const MAX_MINUTE: usize = 59;

/// One selectable calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayEntry {
    pub label: String,
    pub day_start: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerColumn {
    Day,
    Hour,
    Minute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSelection {
    pub day_index: usize,
    pub hour: usize,
    pub minute: usize,
}

/// Local midnight of `date`.  Zones that skip midnight on a DST change start
/// the day at the first instant that exists.
fn day_start(date: NaiveDate) -> Option<DateTime<Local>> {
    (0..3).find_map(|h| {
        let naive = date.and_hms_opt(h, 0, 0)?;
        Local.from_local_datetime(&naive).earliest()
    })
}

fn day_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "Today".to_string()
    } else if today.pred_opt() == Some(date) {
        "Yesterday".to_string()
    } else {
        date.format("%d/%m").to_string()
    }
}

/// Longest span the picker lays out.  Archive older than this is not offered.
pub const MAX_DOMAIN_HOURS: u32 = 366 * 24;

/// Days from `floor_day(now - span)` to `floor_day(now)` inclusive, oldest
/// first.  A window bounded at zero hours has no archive and yields nothing;
/// that empty domain is what puts the picker in its "no selectable time" state.
pub fn build_day_domain(
    window: &ArchiveWindow,
    policy: &ArchivePolicy,
    now: DateTime<Local>,
) -> Vec<DayEntry> {
    if window.limit == ArchiveLimit::Bounded(0) {
        return Vec::new();
    }
    let hours = policy
        .effective_span_hours(window)
        .display_hours(policy.fallback_hours)
        .min(MAX_DOMAIN_HOURS);
    let today = now.date_naive();
    let mut date = now
        .checked_sub_signed(Duration::hours(i64::from(hours)))
        .map_or(today, |start| start.date_naive());

    let mut domain = Vec::new();
    while date <= today {
        if let Some(start) = day_start(date) {
            domain.push(DayEntry {
                label: day_label(date, today),
                day_start: start,
            });
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }
    domain
}

/// Anchored at now: last day, current hour and minute.
pub fn initial_selection(domain: &[DayEntry], now: DateTime<Local>) -> Option<TimeSelection> {
    if domain.is_empty() {
        return None;
    }
    Some(TimeSelection {
        day_index: domain.len() - 1,
        hour: now.hour() as usize,
        minute: now.minute() as usize,
    })
}

/// `current + delta` clamped to `[0, max]`.
pub fn move_index(current: usize, delta: i32, max: usize) -> usize {
    let target = current as i64 + i64::from(delta);
    target.clamp(0, max as i64) as usize
}

/// The selected day at `hour:minute:00`.
pub fn resolve_timestamp(
    domain: &[DayEntry],
    day_index: usize,
    hour: usize,
    minute: usize,
) -> Option<DateTime<Local>> {
    let entry = domain.get(day_index)?;
    let naive = entry
        .day_start
        .date_naive()
        .and_hms_opt(hour as u32, minute as u32, 0)?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            // wall-clock time skipped by a DST jump
            Some(entry.day_start + Duration::hours(hour as i64) + Duration::minutes(minute as i64))
        })
}

/// An empty domain, or a selection that resolves to nothing, counts as out of
/// range so that confirmation stays disabled.
pub fn is_selection_out_of_range(
    policy: &ArchivePolicy,
    window: &ArchiveWindow,
    domain: &[DayEntry],
    selection: TimeSelection,
    now: DateTime<Local>,
) -> bool {
    match resolve_timestamp(domain, selection.day_index, selection.hour, selection.minute) {
        Some(candidate) => policy.is_out_of_range(window, candidate, now),
        None => true,
    }
}

/// Picker state for one opening of the rewind overlay.
#[derive(Debug, Clone)]
pub struct TimePicker {
    window: ArchiveWindow,
    policy: ArchivePolicy,
    now: DateTime<Local>,
    domain: Vec<DayEntry>,
    selection: Option<TimeSelection>,
}

impl TimePicker {
    pub fn open(window: ArchiveWindow, policy: ArchivePolicy, now: DateTime<Local>) -> Self {
        let domain = build_day_domain(&window, &policy, now);
        let selection = initial_selection(&domain, now);
        Self {
            window,
            policy,
            now,
            domain,
            selection,
        }
    }

    pub fn domain(&self) -> &[DayEntry] {
        &self.domain
    }

    /// `None` in the degenerate no-selectable-time state.
    pub fn selection(&self) -> Option<TimeSelection> {
        self.selection
    }

    pub fn is_empty(&self) -> bool {
        self.selection.is_none()
    }

    pub fn now(&self) -> DateTime<Local> {
        self.now
    }

    pub fn window(&self) -> ArchiveWindow {
        self.window
    }

    pub fn max_index(&self, column: PickerColumn) -> usize {
        match column {
            PickerColumn::Day => self.domain.len().saturating_sub(1),
            PickerColumn::Hour => MAX_HOUR,
            PickerColumn::Minute => MAX_MINUTE,
        }
    }

    /// Move one column and return its new index.  No-op when empty.
    pub fn move_column(&mut self, column: PickerColumn, delta: i32) -> usize {
        let max = self.max_index(column);
        let Some(sel) = self.selection.as_mut() else {
            return 0;
        };
        let slot = match column {
            PickerColumn::Day => &mut sel.day_index,
            PickerColumn::Hour => &mut sel.hour,
            PickerColumn::Minute => &mut sel.minute,
        };
        *slot = move_index(*slot, delta, max);
        *slot
    }

    pub fn selected_instant(&self) -> Option<DateTime<Local>> {
        let sel = self.selection?;
        resolve_timestamp(&self.domain, sel.day_index, sel.hour, sel.minute)
    }

    pub fn is_out_of_range(&self) -> bool {
        match self.selection {
            Some(sel) => {
                is_selection_out_of_range(&self.policy, &self.window, &self.domain, sel, self.now)
            }
            None => true,
        }
    }

    pub fn can_confirm(&self) -> bool {
        !self.is_empty() && !self.is_out_of_range()
    }
}
