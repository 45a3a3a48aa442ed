//! Insight pipeline orchestration
//!
//! [`InsightProcessor`] is the public entry point: it records events, tracks
//! sessions and turns a user's event log into metrics, insights and reports.

use crate::config::PulseConfig;
use crate::error::{InsightError, Result};
use crate::insights::{InsightEngine, InsightInputs, InsightNotifier, LogNotifier};
use crate::mood::MoodAnalyzer;
use crate::patterns::PatternAnalyzer;
use crate::report::ReportEncoder;
use crate::session::{SessionSignal, SessionTracker};
use crate::store::{
    EventStore, FileStore, KeyValueStore, MemoryStore, DEFAULT_MAX_EVENTS, DEFAULT_RETENTION_DAYS,
};
use crate::types::{
    ConsistencyAnalysis, EngagementPattern, Event, EventType, Insight, MoodAnalytics, MoodEntry,
    NewEvent, Priority, QuizPerformance,
};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Storage key for the last generated insight set
pub fn insights_key(user_id: &str) -> String {
    format!("insights:{user_id}")
}

/// Storage key for dismissed insight ids
pub fn dismissed_key(user_id: &str) -> String {
    format!("dismissed:{user_id}")
}

/// Parse a JSON array of events and produce a report for `user_id`
/// (stateless, one-shot).
///
/// Events for other users are accepted but do not appear in the report.
///
/// # Example
/// ```ignore
/// let report_json = events_to_report(events_json, "learner-1", now)?;
/// ```
pub fn events_to_report(
    events_json: &str,
    user_id: &str,
    now: DateTime<FixedOffset>,
) -> Result<String> {
    // Stage 1: Parse and validate events
    let events = parse_new_events(events_json)?;

    // Stage 2: Load them into a fresh in-memory processor
    let processor = InsightProcessor::in_memory().with_utc_offset(now.timezone());
    for event in events {
        processor.record(event);
    }

    // Stage 3: Derive, generate and encode
    processor.report(user_id, now.with_timezone(&Utc))
}

/// Parse a JSON array of new events, rejecting the batch if any is invalid
pub fn parse_new_events(events_json: &str) -> Result<Vec<NewEvent>> {
    let events: Vec<NewEvent> = serde_json::from_str(events_json)
        .map_err(|e| InsightError::ParseError(format!("invalid events array: {e}")))?;
    for (index, event) in events.iter().enumerate() {
        event
            .validate()
            .map_err(|e| InsightError::InvalidEvent(format!("event {index}: {e}")))?;
    }
    Ok(events)
}

/// Stateful processor over a persistent event log.
///
/// Safe to share across threads behind an `Arc`.
pub struct InsightProcessor {
    backend: Arc<dyn KeyValueStore>,
    events: EventStore,
    /// Per-user trackers; the map lock is only held to look a tracker up
    trackers: Mutex<HashMap<String, Arc<Mutex<SessionTracker>>>>,
    /// Serializes read-modify-write of `dismissed:{user}` sets
    dismissals: Mutex<()>,
    notifier: Arc<dyn InsightNotifier>,
    encoder: ReportEncoder,
    offset: FixedOffset,
    retention_days: i64,
    notify_high_priority: bool,
}

impl InsightProcessor {
    /// Create a processor over `backend` with default settings (UTC, 90-day
    /// retention, 1000 events per user)
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self::with_max_events(backend, DEFAULT_MAX_EVENTS)
    }

    fn with_max_events(backend: Arc<dyn KeyValueStore>, max_events: usize) -> Self {
        Self {
            events: EventStore::with_max_events(backend.clone(), max_events),
            backend,
            trackers: Mutex::new(HashMap::new()),
            dismissals: Mutex::new(()),
            notifier: Arc::new(LogNotifier),
            encoder: ReportEncoder::new(),
            offset: Utc.fix(),
            retention_days: DEFAULT_RETENTION_DAYS,
            notify_high_priority: true,
        }
    }

    /// Processor backed by a [`MemoryStore`]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Create a processor over `backend` using `config`
    pub fn with_config(backend: Arc<dyn KeyValueStore>, config: &PulseConfig) -> Result<Self> {
        config.validate()?;
        let mut processor = Self::with_max_events(backend, config.max_events_per_user);
        processor.offset = config.utc_offset()?;
        processor.retention_days = config.retention_days;
        processor.notify_high_priority = config.notify_high_priority;
        Ok(processor)
    }

    /// Open a [`FileStore`] in the configured data directory
    pub fn from_config(config: &PulseConfig) -> Result<Self> {
        let data_dir = config.data_dir();
        let store = FileStore::open(&data_dir)?;
        info!(data_dir = %data_dir.display(), "Opened file store");
        Self::with_config(Arc::new(store), config)
    }

    /// Replace the high-priority notifier
    pub fn with_notifier(mut self, notifier: Arc<dyn InsightNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Set the learner's UTC offset
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn utc_offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn retention_days(&self) -> i64 {
        self.retention_days
    }

    pub fn event_store(&self) -> &EventStore {
        &self.events
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    /// Validate and record an event
    pub fn track_event(&self, event: NewEvent) -> Result<Event> {
        event.validate().map_err(InsightError::InvalidEvent)?;
        Ok(self.record(event))
    }

    /// Parse a single event from JSON and record it
    pub fn track_event_json(&self, event_json: &str) -> Result<Event> {
        let event: NewEvent = serde_json::from_str(event_json)
            .map_err(|e| InsightError::ParseError(format!("invalid event: {e}")))?;
        self.track_event(event)
    }

    /// Record every event of a JSON array; nothing is recorded if any is invalid
    pub fn import_events(&self, events_json: &str) -> Result<usize> {
        let events = parse_new_events(events_json)?;
        let count = events.len();
        for event in events {
            self.record(event);
        }
        info!(count, "Imported events");
        Ok(count)
    }

    /// Record a mood check-in as a `mood_log` event
    pub fn track_mood(&self, user_id: &str, entry: MoodEntry) -> Result<Event> {
        self.track_event(NewEvent {
            user_id: user_id.to_string(),
            event_type: EventType::MoodLog,
            timestamp: entry.timestamp,
            metadata: entry.to_metadata(),
            duration: None,
        })
    }

    fn record(&self, event: NewEvent) -> Event {
        self.events.append(
            &event.user_id,
            event.event_type,
            event.timestamp,
            event.metadata,
            event.duration,
        )
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Open a session for `user_id`; `None` if one is already open
    pub fn begin_session(&self, user_id: &str, now: DateTime<Utc>) -> Option<Event> {
        self.with_tracker(user_id, |tracker, events| tracker.begin(events, now))
    }

    /// Close the open session for `user_id`; `None` if none is open
    pub fn suspend_session(&self, user_id: &str, now: DateTime<Utc>) -> Option<Event> {
        self.with_tracker(user_id, |tracker, events| tracker.suspend(events, now))
    }

    /// Forward a platform lifecycle signal
    pub fn handle_signal(
        &self,
        user_id: &str,
        signal: SessionSignal,
        now: DateTime<Utc>,
    ) -> Option<Event> {
        self.with_tracker(user_id, |tracker, events| tracker.handle(signal, events, now))
    }

    pub fn is_session_active(&self, user_id: &str) -> bool {
        let tracker = self.trackers.lock().get(user_id).cloned();
        tracker.is_some_and(|tracker| tracker.lock().is_active())
    }

    /// Run `f` on the user's tracker. Only that user's tracker stays locked
    /// while the transition appends (and persists) its event.
    fn with_tracker<T>(
        &self,
        user_id: &str,
        f: impl FnOnce(&mut SessionTracker, &EventStore) -> T,
    ) -> T {
        let tracker = Arc::clone(
            self.trackers
                .lock()
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(SessionTracker::new(user_id)))),
        );
        let mut tracker = tracker.lock();
        f(&mut tracker, &self.events)
    }

    // ------------------------------------------------------------------
    // Analysis
    // ------------------------------------------------------------------

    /// Ordered copy of a user's events, optionally from `since` on
    pub fn snapshot(&self, user_id: &str, since: Option<DateTime<Utc>>) -> Vec<Event> {
        self.events.snapshot(user_id, since)
    }

    pub fn engagement_pattern(&self, user_id: &str, now: DateTime<Utc>) -> EngagementPattern {
        PatternAnalyzer::engagement(&self.snapshot(user_id, None), self.local(now))
    }

    pub fn consistency_analysis(&self, user_id: &str, now: DateTime<Utc>) -> ConsistencyAnalysis {
        PatternAnalyzer::consistency(&self.snapshot(user_id, None), self.local(now))
    }

    pub fn mood_analytics(&self, user_id: &str) -> MoodAnalytics {
        MoodAnalyzer::analyze(&self.snapshot(user_id, None))
    }

    pub fn quiz_performance(&self, user_id: &str, now: DateTime<Utc>) -> QuizPerformance {
        PatternAnalyzer::quiz_performance(&self.snapshot(user_id, None), self.local(now))
    }

    /// Generate, filter, cache and dispatch insights for `user_id`
    pub fn generate_insights(&self, user_id: &str, now: DateTime<Utc>) -> Vec<Insight> {
        // Stage 1: Snapshot the log once so every metric sees the same events
        let events = self.snapshot(user_id, None);

        // Stage 2: Derive metrics
        let inputs = self.derive(&events, now);

        // Stage 3: Run rules and drop dismissed insights
        let insights = self.visible_insights(user_id, &inputs, now);

        // Stage 4: Cache and notify
        self.cache_insights(user_id, &insights);
        self.dispatch(user_id, &insights);
        insights
    }

    /// The last generated insight set; empty if none is cached or it is unreadable
    pub fn cached_insights(&self, user_id: &str) -> Vec<Insight> {
        match self.backend.load(&insights_key(user_id)) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(user_id, error = %e, "Discarding malformed cached insights");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(user_id, error = %e, "Failed to read cached insights");
                Vec::new()
            }
        }
    }

    /// Build the full report for `user_id` as JSON
    pub fn report(&self, user_id: &str, now: DateTime<Utc>) -> Result<String> {
        let events = self.snapshot(user_id, None);
        let inputs = self.derive(&events, now);
        let insights = self.visible_insights(user_id, &inputs, now);
        self.cache_insights(user_id, &insights);
        self.dispatch(user_id, &insights);

        self.encoder
            .encode_to_json(user_id, self.local(now), inputs, insights)
    }

    fn derive(&self, events: &[Event], now: DateTime<Utc>) -> InsightInputs {
        let local_now = self.local(now);
        InsightInputs {
            events: events.len(),
            engagement: PatternAnalyzer::engagement(events, local_now),
            consistency: PatternAnalyzer::consistency(events, local_now),
            mood: MoodAnalyzer::analyze(events),
            quiz: PatternAnalyzer::quiz_performance(events, local_now),
        }
    }

    fn visible_insights(
        &self,
        user_id: &str,
        inputs: &InsightInputs,
        now: DateTime<Utc>,
    ) -> Vec<Insight> {
        let dismissed = self.dismissed_insights(user_id);
        let mut insights = InsightEngine::generate(inputs, now);
        insights.retain(|insight| !dismissed.contains(&insight.id));
        debug!(user_id, count = insights.len(), "Generated insights");
        insights
    }

    fn cache_insights(&self, user_id: &str, insights: &[Insight]) {
        let json = match serde_json::to_string(insights) {
            Ok(json) => json,
            Err(e) => {
                warn!(user_id, error = %e, "Failed to serialize insights");
                return;
            }
        };
        if let Err(e) = self.backend.save(&insights_key(user_id), &json) {
            warn!(user_id, error = %e, "Failed to cache insights");
        }
    }

    fn dispatch(&self, user_id: &str, insights: &[Insight]) {
        if !self.notify_high_priority {
            return;
        }
        for insight in insights.iter().filter(|i| i.priority == Priority::High) {
            self.notifier.notify(user_id, insight);
        }
    }

    fn local(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        now.with_timezone(&self.offset)
    }

    // ------------------------------------------------------------------
    // Dismissal
    // ------------------------------------------------------------------

    /// Ids the user has dismissed
    pub fn dismissed_insights(&self, user_id: &str) -> BTreeSet<String> {
        match self.backend.load(&dismissed_key(user_id)) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(user_id, error = %e, "Discarding malformed dismissal list");
                BTreeSet::new()
            }),
            Ok(None) => BTreeSet::new(),
            Err(e) => {
                warn!(user_id, error = %e, "Failed to read dismissal list");
                BTreeSet::new()
            }
        }
    }

    /// Hide `insight_id` from future results. Returns false if it was already hidden.
    pub fn dismiss_insight(&self, user_id: &str, insight_id: &str) -> bool {
        let _guard = self.dismissals.lock();
        let mut dismissed = self.dismissed_insights(user_id);
        if !dismissed.insert(insight_id.to_string()) {
            return false;
        }

        match serde_json::to_string(&dismissed) {
            Ok(json) => {
                if let Err(e) = self.backend.save(&dismissed_key(user_id), &json) {
                    warn!(user_id, error = %e, "Failed to persist dismissal");
                }
            }
            Err(e) => warn!(user_id, error = %e, "Failed to serialize dismissal list"),
        }
        info!(user_id, insight_id, "Insight dismissed");
        true
    }

    /// Clear every dismissal for `user_id`
    pub fn restore_insights(&self, user_id: &str) {
        let _guard = self.dismissals.lock();
        if let Err(e) = self.backend.remove(&dismissed_key(user_id)) {
            warn!(user_id, error = %e, "Failed to clear dismissal list");
        }
    }

    // ------------------------------------------------------------------
    // Retention
    // ------------------------------------------------------------------

    /// Apply the retention window to every user, including ones only on disk
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        self.events.prune(self.retention_days, now)
    }

    /// Apply the retention window to one user, loading it if needed
    pub fn prune_user(&self, user_id: &str, now: DateTime<Utc>) -> usize {
        self.events.prune_user(user_id, self.retention_days, now)
    }

    /// Forget everything about `user_id`: events, cached insights,
    /// dismissals and session state
    pub fn reset(&self, user_id: &str) {
        self.events.clear(user_id);
        self.trackers.lock().remove(user_id);
        let _guard = self.dismissals.lock();
        for key in [insights_key(user_id), dismissed_key(user_id)] {
            if let Err(e) = self.backend.remove(&key) {
                warn!(user_id, key = %key, error = %e, "Failed to remove stored state");
            }
        }
        info!(user_id, "User state reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventMetadata, MoodLabel, TimeOfDay, WeeklyTrend};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 20, 15, 0, 0).unwrap()
    }

    fn at_hour(days_ago: i64, hour: u32) -> DateTime<Utc> {
        let date = now().date_naive() - Duration::days(days_ago);
        Utc.from_utc_datetime(&date.and_hms_opt(hour, 0, 0).unwrap())
    }

    fn new_event(user_id: &str, event_type: EventType, timestamp: DateTime<Utc>) -> NewEvent {
        NewEvent {
            user_id: user_id.to_string(),
            event_type,
            timestamp,
            metadata: EventMetadata::new(),
            duration: None,
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<String>>,
    }

    impl InsightNotifier for RecordingNotifier {
        fn notify(&self, _user_id: &str, insight: &Insight) {
            self.seen.lock().push(insight.id.clone());
        }
    }

    /// Daily quizzes for the last `days` days, ending today
    fn quiz_streak(processor: &InsightProcessor, user_id: &str, days: i64) {
        for day in 0..days {
            let mut event = new_event(
                user_id,
                EventType::QuizAttempt,
                now() - Duration::days(day) - Duration::hours(1),
            );
            event.metadata = EventMetadata::new().with_score(90.0).with_subject("math");
            processor.track_event(event).unwrap();
        }
    }

    #[test]
    fn test_track_event_rejects_invalid() {
        let processor = InsightProcessor::in_memory();
        let mut event = new_event("", EventType::Click, now());
        assert!(matches!(
            processor.track_event(event.clone()),
            Err(InsightError::InvalidEvent(_))
        ));

        event.user_id = "u1".to_string();
        event.duration = Some(10);
        assert!(processor.track_event(event).is_err());
        assert!(processor.snapshot("u1", None).is_empty());
    }

    #[test]
    fn test_track_event_json() {
        let processor = InsightProcessor::in_memory();
        let event = processor
            .track_event_json(
                r#"{"user_id":"u1","event_type":"quiz_attempt","timestamp":"2024-03-20T10:00:00Z","metadata":{"score":72}}"#,
            )
            .unwrap();
        assert_eq!(event.metadata.score(), Some(72.0));
        assert!(matches!(
            processor.track_event_json("{not json"),
            Err(InsightError::ParseError(_))
        ));
    }

    #[test]
    fn test_import_is_all_or_nothing() {
        let processor = InsightProcessor::in_memory();
        let bad = r#"[
            {"user_id":"u1","event_type":"click","timestamp":"2024-03-20T10:00:00Z"},
            {"user_id":"u1","event_type":"click","timestamp":"2024-03-20T10:01:00Z","duration":5}
        ]"#;
        assert!(processor.import_events(bad).is_err());
        assert!(processor.snapshot("u1", None).is_empty());

        let good = r#"[
            {"user_id":"u1","event_type":"click","timestamp":"2024-03-20T10:00:00Z"},
            {"user_id":"u1","event_type":"session_end","timestamp":"2024-03-20T10:01:00Z","duration":5}
        ]"#;
        assert_eq!(processor.import_events(good).unwrap(), 2);
    }

    #[test]
    fn test_track_mood_records_mood_log() {
        let processor = InsightProcessor::in_memory();
        let entry = MoodEntry {
            timestamp: now(),
            mood: MoodLabel::Frustrated,
            energy: Some(2),
            confidence: None,
            note: None,
        };
        let event = processor.track_mood("u1", entry).unwrap();
        assert_eq!(event.event_type, EventType::MoodLog);

        let analytics = processor.mood_analytics("u1");
        assert_eq!(analytics.entries, 1);
        assert_eq!(analytics.average_mood, 1.0);
        assert_eq!(analytics.energy_levels, vec![2]);
    }

    #[test]
    fn test_sessions_are_tracked_per_user() {
        let processor = InsightProcessor::in_memory();
        assert!(processor.begin_session("u1", now()).is_some());
        assert!(processor.begin_session("u2", now()).is_some());
        assert!(processor.begin_session("u1", now()).is_none());
        assert!(processor.is_session_active("u1"));

        let end = processor
            .handle_signal("u1", SessionSignal::FocusLost, now() + Duration::minutes(3))
            .unwrap();
        assert_eq!(end.duration, Some(180));
        assert!(!processor.is_session_active("u1"));
        assert!(processor.is_session_active("u2"));
        assert!(processor
            .suspend_session("u1", now() + Duration::minutes(4))
            .is_none());
    }

    #[test]
    fn test_empty_user_has_no_insights() {
        let processor = InsightProcessor::in_memory();
        let engagement = processor.engagement_pattern("nobody", now());
        assert_eq!(engagement.login_frequency, 0.0);
        assert_eq!(engagement.most_active_time_of_day, TimeOfDay::Morning);
        assert!(processor.generate_insights("nobody", now()).is_empty());
    }

    #[test]
    fn test_generate_insights_end_to_end() {
        let notifier = Arc::new(RecordingNotifier::default());
        let processor = InsightProcessor::in_memory().with_notifier(notifier.clone());
        quiz_streak(&processor, "u1", 8);
        for day in [1, 2, 3] {
            let start = at_hour(day, 19);
            processor.begin_session("u1", start);
            processor.suspend_session("u1", start + Duration::minutes(30));
        }

        let engagement = processor.engagement_pattern("u1", now());
        assert_eq!(engagement.most_active_time_of_day, TimeOfDay::Evening);
        assert_eq!(engagement.weekly_trend, WeeklyTrend::Stable);
        assert_eq!(engagement.average_session_duration, 1800.0);

        let insights = processor.generate_insights("u1", now());
        let ids: Vec<&str> = insights.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "streak-celebration",
                "low-consistency",
                "quiz-performance-high",
                "time-of-day-evening"
            ]
        );
        assert_eq!(*notifier.seen.lock(), vec!["streak-celebration".to_string()]);
        assert_eq!(processor.cached_insights("u1"), insights);
    }

    #[test]
    fn test_dismissed_insights_are_filtered() {
        let processor = InsightProcessor::in_memory();
        quiz_streak(&processor, "u1", 7);
        assert!(processor
            .generate_insights("u1", now())
            .iter()
            .any(|i| i.id == "streak-celebration"));

        assert!(processor.dismiss_insight("u1", "streak-celebration"));
        assert!(!processor.dismiss_insight("u1", "streak-celebration"));
        assert!(processor
            .generate_insights("u1", now())
            .iter()
            .all(|i| i.id != "streak-celebration"));

        processor.restore_insights("u1");
        assert!(processor.dismissed_insights("u1").is_empty());
        assert!(processor
            .generate_insights("u1", now())
            .iter()
            .any(|i| i.id == "streak-celebration"));
    }

    #[test]
    fn test_notifications_can_be_disabled() {
        let notifier = Arc::new(RecordingNotifier::default());
        let config = PulseConfig {
            notify_high_priority: false,
            ..PulseConfig::default()
        };
        let processor = InsightProcessor::with_config(Arc::new(MemoryStore::new()), &config)
            .unwrap()
            .with_notifier(notifier.clone());
        quiz_streak(&processor, "u1", 7);
        processor.generate_insights("u1", now());
        assert!(notifier.seen.lock().is_empty());
    }

    #[test]
    fn test_config_caps_events_per_user() {
        let config = PulseConfig {
            max_events_per_user: 3,
            ..PulseConfig::default()
        };
        let processor =
            InsightProcessor::with_config(Arc::new(MemoryStore::new()), &config).unwrap();
        assert_eq!(processor.event_store().max_events(), 3);
        for hour in 0..5 {
            processor
                .track_event(new_event("u1", EventType::Click, at_hour(1, hour)))
                .unwrap();
        }

        let events = processor.snapshot("u1", None);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].timestamp, at_hour(1, 2));
    }

    #[test]
    fn test_malformed_cache_reads_as_empty() {
        let backend = Arc::new(MemoryStore::new());
        backend.save(&insights_key("u1"), "[{oops").unwrap();
        backend.save(&dismissed_key("u1"), "42").unwrap();
        let processor = InsightProcessor::new(backend);
        assert!(processor.cached_insights("u1").is_empty());
        assert!(processor.dismissed_insights("u1").is_empty());
    }

    #[test]
    fn test_config_offset_moves_day_boundary() {
        let config = PulseConfig {
            utc_offset_minutes: 10 * 60,
            ..PulseConfig::default()
        };
        let processor =
            InsightProcessor::with_config(Arc::new(MemoryStore::new()), &config).unwrap();
        // 14:30 UTC is 00:30 the next day at +10:00
        let late = Utc.with_ymd_and_hms(2024, 3, 19, 14, 30, 0).unwrap();
        processor
            .track_event(new_event("u1", EventType::QuizAttempt, late))
            .unwrap();

        // 00:30 UTC on the 20th: a UTC day boundary would put the quiz yesterday
        let consistency = processor.consistency_analysis("u1", late + Duration::hours(10));
        assert_eq!(consistency.current_streak, 1);
        assert_eq!(processor.utc_offset().local_minus_utc(), 36_000);
    }

    #[test]
    fn test_prune_and_reset() {
        let config = PulseConfig {
            retention_days: 30,
            ..PulseConfig::default()
        };
        let processor =
            InsightProcessor::with_config(Arc::new(MemoryStore::new()), &config).unwrap();
        processor
            .track_event(new_event("u1", EventType::Click, now() - Duration::days(40)))
            .unwrap();
        processor
            .track_event(new_event("u1", EventType::Click, now() - Duration::days(1)))
            .unwrap();

        assert_eq!(processor.prune(now()), 1);
        assert_eq!(processor.prune_user("u1", now()), 0);
        assert_eq!(processor.snapshot("u1", None).len(), 1);

        processor.generate_insights("u1", now());
        processor.dismiss_insight("u1", "low-consistency");
        processor.begin_session("u1", now());
        processor.reset("u1");
        assert!(processor.snapshot("u1", None).is_empty());
        assert!(processor.cached_insights("u1").is_empty());
        assert!(processor.dismissed_insights("u1").is_empty());
        assert!(!processor.is_session_active("u1"));
    }

    #[test]
    fn test_report_json() {
        let processor = InsightProcessor::in_memory();
        quiz_streak(&processor, "u1", 2);
        let json = processor.report("u1", now()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["provenance"]["user_id"], "u1");
        assert_eq!(value["quality"]["events_considered"], 2);
        assert_eq!(value["consistency"]["current_streak"], 2);
    }

    #[test]
    fn test_events_to_report_is_stateless() {
        let events = r#"[
            {"user_id":"u1","event_type":"session_start","timestamp":"2024-03-19T08:00:00Z"},
            {"user_id":"u1","event_type":"session_end","timestamp":"2024-03-19T08:20:00Z","duration":1200},
            {"user_id":"u2","event_type":"session_start","timestamp":"2024-03-19T22:00:00Z"}
        ]"#;
        let now = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 20, 15, 0, 0)
            .unwrap();

        let json = events_to_report(events, "u1", now).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["engagement"]["total_sessions"], 1);
        assert_eq!(value["engagement"]["average_session_duration"], 1200.0);
        assert_eq!(value["engagement"]["most_active_time_of_day"], "morning");

        assert!(events_to_report("{}", "u1", now).is_err());
    }
}
