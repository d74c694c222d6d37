//! Schedule model: airing status and progress of a program at an instant.
//!
//! Everything here is a pure function over immutable [`Program`] values.
//! A program airs on the half-open interval `[start, end)`, so two adjacent
//! programs never both report airing at their shared boundary.

use chrono::{DateTime, Local};

use crate::protocol::Program;

/// True when `start <= now < end`.
pub fn is_airing(program: &Program, now: DateTime<Local>) -> bool {
    program.start() <= now && now < program.end()
}

/// Fraction of the program elapsed at `now`, clamped to `[0, 1]`.
pub fn progress(program: &Program, now: DateTime<Local>) -> f64 {
    if now < program.start() {
        return 0.0;
    }
    if now >= program.end() {
        return 1.0;
    }
    let total = (program.end() - program.start()).num_milliseconds();
    if total <= 0 {
        return 1.0;
    }
    let elapsed = (now - program.start()).num_milliseconds();
    (elapsed as f64 / total as f64).clamp(0.0, 1.0)
}

/// Whole minutes between start and end (truncated).
pub fn duration_minutes(program: &Program) -> i64 {
    (program.end() - program.start()).num_minutes()
}

/// The program airing at `now`, if any.  `programs` must be sorted by start.
pub fn program_at(programs: &[Program], now: DateTime<Local>) -> Option<&Program> {
    // First program that ends after `now`; it airs iff it has also started.
    let idx = programs.partition_point(|p| p.end() <= now);
    programs.get(idx).filter(|p| is_airing(p, now))
}

/// Up to `limit` programs starting at or after `now`.
pub fn upcoming(programs: &[Program], now: DateTime<Local>, limit: usize) -> Vec<&Program> {
    let idx = programs.partition_point(|p| p.start() < now);
    programs[idx..].iter().take(limit).collect()
}

/// Sort by start and drop any program that overlaps the one before it.
///
/// Returns the number of programs dropped.
pub fn normalize(programs: &mut Vec<Program>) -> usize {
    programs.sort_by_key(|p| p.start());
    let before = programs.len();
    let mut last_end: Option<DateTime<Local>> = None;
    programs.retain(|p| match last_end {
        Some(end) if p.start() < end => false,
        _ => {
            last_end = Some(p.end());
            true
        }
    });
    before - programs.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 14, h, m, 0).unwrap()
    }

    fn prog(id: &str, start: DateTime<Local>, end: DateTime<Local>) -> Program {
        Program::new(id, id, "", start, end, "ch").unwrap()
    }

    #[test]
    fn test_airing_is_half_open() {
        let p = prog("news", at(18, 0), at(19, 0));
        assert!(is_airing(&p, at(18, 0)));
        assert!(is_airing(&p, at(18, 59)));
        assert!(!is_airing(&p, at(19, 0)));
        assert!(!is_airing(&p, at(17, 59)));
    }

    #[test]
    fn test_adjacent_programs_never_both_airing() {
        let a = prog("a", at(18, 0), at(19, 0));
        let b = prog("b", at(19, 0), at(20, 0));
        let boundary = at(19, 0);
        assert!(!is_airing(&a, boundary));
        assert!(is_airing(&b, boundary));
    }

    #[test]
    fn test_progress_clamps_and_is_monotonic() {
        let p = prog("film", at(20, 0), at(22, 0));
        assert_eq!(progress(&p, at(19, 0)), 0.0);
        assert_eq!(progress(&p, at(20, 0)), 0.0);
        assert_eq!(progress(&p, at(22, 0)), 1.0);
        assert_eq!(progress(&p, at(23, 0)), 1.0);
        assert!((progress(&p, at(21, 0)) - 0.5).abs() < 1e-9);

        let mut last = 0.0;
        let mut t = at(20, 0);
        while t <= at(22, 0) {
            let v = progress(&p, t);
            assert!(v >= last, "progress went backwards at {t}");
            last = v;
            t += Duration::minutes(7);
        }
    }

    #[test]
    fn test_duration_minutes() {
        let p = prog("short", at(9, 0), at(9, 45));
        assert_eq!(duration_minutes(&p), 45);
    }

    #[test]
    fn test_program_at_finds_current() {
        let programs = vec![
            prog("a", at(6, 0), at(7, 0)),
            prog("b", at(7, 0), at(8, 30)),
            prog("c", at(9, 0), at(10, 0)),
        ];
        assert_eq!(program_at(&programs, at(7, 0)).map(|p| p.id()), Some("b"));
        assert_eq!(program_at(&programs, at(6, 30)).map(|p| p.id()), Some("a"));
        // gap between b and c
        assert!(program_at(&programs, at(8, 45)).is_none());
        assert!(program_at(&programs, at(5, 0)).is_none());
        assert!(program_at(&programs, at(10, 0)).is_none());
    }

    #[test]
    fn test_upcoming_skips_started() {
        let programs = vec![
            prog("a", at(6, 0), at(7, 0)),
            prog("b", at(7, 0), at(8, 0)),
            prog("c", at(8, 0), at(9, 0)),
        ];
        let next: Vec<_> = upcoming(&programs, at(6, 30), 5)
            .into_iter()
            .map(|p| p.id())
            .collect();
        assert_eq!(next, vec!["b", "c"]);
    }

    #[test]
    fn test_normalize_drops_overlaps() {
        let mut programs = vec![
            prog("late", at(9, 0), at(10, 0)),
            prog("early", at(7, 0), at(8, 0)),
            prog("clash", at(7, 30), at(8, 30)),
        ];
        assert_eq!(normalize(&mut programs), 1);
        let ids: Vec<_> = programs.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }
}
