//! Pending-intent tracking for channel switches.
//!
//! A switch is requested, the stream URL is fetched in the background, and
//! the result comes back some time later, possibly after newer switches.
//! Each request gets a sequence number; only the completion carrying the
//! newest sequence number *and* the intended value may be applied.
//!
//! # States
//! ```text
//!  Confirmed(T)        : nothing in flight; T is what is playing
//!  Pending { .. }      : request `seq` in flight towards `intended`
//!  Failed { .. }       : newest request failed; `confirmed` keeps playing
//! ```

use crate::error::PlaybackError;

#[derive(Debug, Clone, PartialEq)]
pub enum IntentState<T: Clone + PartialEq> {
    Confirmed(T),
    Pending { intended: T, confirmed: T, seq: u64 },
    Failed { intended: T, confirmed: T },
}

impl<T: Clone + PartialEq> IntentState<T> {
    pub fn new(value: T) -> Self {
        Self::Confirmed(value)
    }

    /// The value most recently asked for.
    pub fn intended(&self) -> &T {
        match self {
            Self::Confirmed(v) => v,
            Self::Pending { intended, .. } | Self::Failed { intended, .. } => intended,
        }
    }

    /// The value actually in effect.
    pub fn confirmed(&self) -> &T {
        match self {
            Self::Confirmed(v) => v,
            Self::Pending { confirmed, .. } | Self::Failed { confirmed, .. } => confirmed,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Issues sequence numbers and decides which completions are stale.
#[derive(Debug, Clone)]
pub struct IntentTracker<T: Clone + PartialEq> {
    state: IntentState<T>,
    next_seq: u64,
}

impl<T: Clone + PartialEq + std::fmt::Debug> IntentTracker<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: IntentState::new(value),
            next_seq: 1,
        }
    }

    pub fn state(&self) -> &IntentState<T> {
        &self.state
    }

    /// Start a request.  Any request still in flight is superseded.
    pub fn begin(&mut self, intended: T) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let confirmed = self.state.confirmed().clone();
        self.state = IntentState::Pending {
            intended,
            confirmed,
            seq,
        };
        seq
    }

    /// True iff `(seq, value)` identifies the request currently in flight.
    pub fn is_current(&self, seq: u64, value: &T) -> bool {
        matches!(&self.state, IntentState::Pending { intended, seq: s, .. } if *s == seq && intended == value)
    }

    /// Apply a successful completion, or report it stale.
    pub fn confirm(&mut self, seq: u64, value: T, stale: impl FnOnce() -> PlaybackError) -> Result<(), PlaybackError> {
        if !self.is_current(seq, &value) {
            return Err(stale());
        }
        self.state = IntentState::Confirmed(value);
        Ok(())
    }

    /// Record a failed completion, or report it stale.  The confirmed value
    /// is left untouched.
    pub fn fail(&mut self, seq: u64, value: T, stale: impl FnOnce() -> PlaybackError) -> Result<(), PlaybackError> {
        if !self.is_current(seq, &value) {
            return Err(stale());
        }
        let confirmed = self.state.confirmed().clone();
        self.state = IntentState::Failed {
            intended: value,
            confirmed,
        };
        Ok(())
    }

    /// Drop whatever is in flight; later completions become stale.
    pub fn cancel(&mut self) {
        let confirmed = self.state.confirmed().clone();
        self.state = IntentState::Confirmed(confirmed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stale(id: &str) -> impl FnOnce() -> PlaybackError + '_ {
        move || PlaybackError::StaleResponse {
            channel_id: id.to_string(),
        }
    }

    #[test]
    fn test_newer_request_supersedes() {
        let mut t = IntentTracker::new(None::<String>);
        let five = t.begin(Some("5".into()));
        let seven = t.begin(Some("7".into()));
        assert!(t.fail(five, Some("5".into()), stale("5")).is_err());
        assert!(t.confirm(five, Some("5".into()), stale("5")).is_err());
        assert!(t.state().is_pending());
        assert!(t.confirm(seven, Some("7".into()), stale("7")).is_ok());
        assert_eq!(t.state(), &IntentState::Confirmed(Some("7".into())));
    }

    #[test]
    fn test_same_channel_rerequest_uses_fresh_seq() {
        let mut t = IntentTracker::new(None::<String>);
        let first = t.begin(Some("5".into()));
        let second = t.begin(Some("5".into()));
        assert!(!t.is_current(first, &Some("5".into())));
        assert!(t.is_current(second, &Some("5".into())));
    }

    #[test]
    fn test_failure_keeps_confirmed_value() {
        let mut t = IntentTracker::new(Some("1".to_string()));
        let seq = t.begin(Some("2".into()));
        t.fail(seq, Some("2".into()), stale("2")).unwrap();
        assert!(t.state().is_failed());
        assert_eq!(t.state().confirmed(), &Some("1".to_string()));
        assert_eq!(t.state().intended(), &Some("2".to_string()));
    }

    #[test]
    fn test_cancel_makes_inflight_stale() {
        let mut t = IntentTracker::new(None::<String>);
        let seq = t.begin(Some("3".into()));
        t.cancel();
        assert_eq!(
            t.confirm(seq, Some("3".into()), stale("3")),
            Err(PlaybackError::StaleResponse {
                channel_id: "3".into()
            })
        );
    }
}
