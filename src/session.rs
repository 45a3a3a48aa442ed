//! Session lifecycle tracking
//!
//! A session is the span between the app gaining focus and losing it. The host
//! shell forwards its visibility/unload notifications as [`SessionSignal`]s;
//! the tracker turns them into `session_start` / `session_end` events.

use crate::store::EventStore;
use crate::types::{Event, EventMetadata, EventType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Platform lifecycle notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionSignal {
    /// Page became visible / app resumed
    FocusGained,
    /// Page hidden or navigated away
    FocusLost,
    /// Process or tab is going away
    Shutdown,
}

/// Tracker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active { started_at: DateTime<Utc> },
}

/// Per-user session bracket state machine
#[derive(Debug, Clone)]
pub struct SessionTracker {
    user_id: String,
    state: SessionState,
}

impl SessionTracker {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            state: SessionState::Idle,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active { .. })
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            SessionState::Active { started_at } => Some(started_at),
            SessionState::Idle => None,
        }
    }

    /// Open a bracket. No-op (returns `None`) if one is already open.
    pub fn begin(&mut self, store: &EventStore, now: DateTime<Utc>) -> Option<Event> {
        if self.is_active() {
            debug!(user_id = %self.user_id, "Session already active, ignoring begin");
            return None;
        }

        let event = store.append(
            &self.user_id,
            EventType::SessionStart,
            now,
            EventMetadata::new(),
            None,
        );
        self.state = SessionState::Active { started_at: now };
        Some(event)
    }

    /// Close the open bracket. No-op (returns `None`) when idle, so duplicate
    /// unload signals never produce a second `session_end`.
    pub fn suspend(&mut self, store: &EventStore, now: DateTime<Utc>) -> Option<Event> {
        let SessionState::Active { started_at } = self.state else {
            debug!(user_id = %self.user_id, "No active session, ignoring suspend");
            return None;
        };

        let duration = (now - started_at).num_seconds().max(0) as u64;
        let event = store.append(
            &self.user_id,
            EventType::SessionEnd,
            now,
            EventMetadata::new(),
            Some(duration),
        );
        self.state = SessionState::Idle;
        debug!(user_id = %self.user_id, duration, "Session closed");
        Some(event)
    }

    /// Dispatch a platform signal
    pub fn handle(
        &mut self,
        signal: SessionSignal,
        store: &EventStore,
        now: DateTime<Utc>,
    ) -> Option<Event> {
        match signal {
            SessionSignal::FocusGained => self.begin(store, now),
            SessionSignal::FocusLost | SessionSignal::Shutdown => self.suspend(store, now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn store() -> EventStore {
        EventStore::new(Arc::new(MemoryStore::new()))
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    #[test]
    fn test_begin_and_suspend_bracket() {
        let store = store();
        let mut tracker = SessionTracker::new("u1");

        let start = tracker.begin(&store, t0()).unwrap();
        assert_eq!(start.event_type, EventType::SessionStart);
        assert_eq!(tracker.started_at(), Some(t0()));

        let end = tracker.suspend(&store, t0() + Duration::seconds(125)).unwrap();
        assert_eq!(end.event_type, EventType::SessionEnd);
        assert_eq!(end.duration, Some(125));
        assert_eq!(tracker.state(), SessionState::Idle);
        assert_eq!(store.len("u1"), 2);
    }

    #[test]
    fn test_duplicate_suspend_is_noop() {
        let store = store();
        let mut tracker = SessionTracker::new("u1");
        tracker.begin(&store, t0());
        assert!(tracker.suspend(&store, t0() + Duration::seconds(10)).is_some());
        assert!(tracker.suspend(&store, t0() + Duration::seconds(11)).is_none());

        let ends = store
            .snapshot("u1", None)
            .into_iter()
            .filter(|e| e.event_type == EventType::SessionEnd)
            .count();
        assert_eq!(ends, 1);
    }

    #[test]
    fn test_suspend_without_begin_is_noop() {
        let store = store();
        let mut tracker = SessionTracker::new("u1");
        assert!(tracker.suspend(&store, t0()).is_none());
        assert_eq!(store.len("u1"), 0);
    }

    #[test]
    fn test_double_begin_keeps_single_bracket() {
        let store = store();
        let mut tracker = SessionTracker::new("u1");
        tracker.begin(&store, t0());
        assert!(tracker.begin(&store, t0() + Duration::seconds(5)).is_none());
        assert_eq!(tracker.started_at(), Some(t0()));
        assert_eq!(store.len("u1"), 1);
    }

    #[test]
    fn test_clock_skew_clamps_duration() {
        let store = store();
        let mut tracker = SessionTracker::new("u1");
        tracker.begin(&store, t0());
        let end = tracker.suspend(&store, t0() - Duration::seconds(30)).unwrap();
        assert_eq!(end.duration, Some(0));
    }

    #[test]
    fn test_visibility_cycle_opens_new_bracket() {
        let store = store();
        let mut tracker = SessionTracker::new("u1");

        tracker.handle(SessionSignal::FocusGained, &store, t0());
        tracker.handle(SessionSignal::FocusLost, &store, t0() + Duration::minutes(5));
        tracker.handle(SessionSignal::FocusGained, &store, t0() + Duration::minutes(20));
        tracker.handle(SessionSignal::Shutdown, &store, t0() + Duration::minutes(30));
        tracker.handle(SessionSignal::Shutdown, &store, t0() + Duration::minutes(30));

        let durations: Vec<Option<u64>> = store
            .snapshot("u1", None)
            .iter()
            .map(|e| e.duration)
            .collect();
        assert_eq!(durations, vec![None, Some(300), None, Some(600)]);
    }
}
