//! Core data types
//!
//! This module defines the behavioral events that flow into the engine and the
//! derived structures (patterns, consistency, mood, insights) that flow out.

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Behavioral event types captured from the learning app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageView,
    SessionStart,
    SessionEnd,
    Click,
    Scroll,
    QuizAttempt,
    MoodLog,
    AchievementEarned,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PageView => "page_view",
            EventType::SessionStart => "session_start",
            EventType::SessionEnd => "session_end",
            EventType::Click => "click",
            EventType::Scroll => "scroll",
            EventType::QuizAttempt => "quiz_attempt",
            EventType::MoodLog => "mood_log",
            EventType::AchievementEarned => "achievement_earned",
        }
    }

    /// All event types, in declaration order
    pub fn all() -> [EventType; 8] {
        [
            EventType::PageView,
            EventType::SessionStart,
            EventType::SessionEnd,
            EventType::Click,
            EventType::Scroll,
            EventType::QuizAttempt,
            EventType::MoodLog,
            EventType::AchievementEarned,
        ]
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::all()
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown event type: {s}"))
    }
}

/// Self-reported mood label
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodLabel {
    Excited,
    Happy,
    Okay,
    Tired,
    Frustrated,
    Confused,
    Sad,
    /// Labels the engine does not recognize are kept verbatim
    #[serde(untagged)]
    Other(String),
}

/// Ordinal used when no mood data (or an unrecognized label) is available
pub const NEUTRAL_MOOD: f64 = 3.0;

impl MoodLabel {
    /// Parse a label, falling back to [`MoodLabel::Other`]
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "excited" => MoodLabel::Excited,
            "happy" => MoodLabel::Happy,
            "okay" | "ok" => MoodLabel::Okay,
            "tired" => MoodLabel::Tired,
            "frustrated" => MoodLabel::Frustrated,
            "confused" => MoodLabel::Confused,
            "sad" => MoodLabel::Sad,
            _ => MoodLabel::Other(label.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MoodLabel::Excited => "excited",
            MoodLabel::Happy => "happy",
            MoodLabel::Okay => "okay",
            MoodLabel::Tired => "tired",
            MoodLabel::Frustrated => "frustrated",
            MoodLabel::Confused => "confused",
            MoodLabel::Sad => "sad",
            MoodLabel::Other(label) => label.as_str(),
        }
    }

    /// Fixed 1-5 ordinal for the label
    pub fn ordinal(&self) -> f64 {
        match self {
            MoodLabel::Excited => 5.0,
            MoodLabel::Happy => 4.0,
            MoodLabel::Okay => 3.0,
            MoodLabel::Tired => 2.0,
            MoodLabel::Frustrated | MoodLabel::Confused | MoodLabel::Sad => 1.0,
            MoodLabel::Other(_) => NEUTRAL_MOOD,
        }
    }
}

/// Open metadata map attached to an event.
///
/// Recognized keys (all optional):
/// - `score`: quiz score, number (0-100)
/// - `subject`, `difficulty`, `page`, `achievement`, `note`: strings
/// - `mood`: mood label string
/// - `energy`, `confidence`: integers on a 1-5 scale
///
/// Accessors return `None` for missing or wrongly-typed values. Unknown keys
/// are preserved as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventMetadata(BTreeMap<String, Value>);

impl EventMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an arbitrary key
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn with_score(self, score: f64) -> Self {
        self.with("score", score)
    }

    pub fn with_subject(self, subject: &str) -> Self {
        self.with("subject", subject)
    }

    pub fn with_mood(self, mood: &MoodLabel) -> Self {
        self.with("mood", mood.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    fn str_value(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn score(&self) -> Option<f64> {
        self.0
            .get("score")
            .and_then(Value::as_f64)
            .filter(|s| s.is_finite())
    }

    pub fn subject(&self) -> Option<&str> {
        self.str_value("subject").filter(|s| !s.trim().is_empty())
    }

    pub fn difficulty(&self) -> Option<&str> {
        self.str_value("difficulty")
    }

    pub fn page(&self) -> Option<&str> {
        self.str_value("page")
    }

    pub fn note(&self) -> Option<&str> {
        self.str_value("note")
    }

    pub fn mood(&self) -> Option<MoodLabel> {
        self.str_value("mood").map(MoodLabel::parse)
    }

    pub fn energy(&self) -> Option<u8> {
        self.scale_value("energy")
    }

    pub fn confidence(&self) -> Option<u8> {
        self.scale_value("confidence")
    }

    /// Read a 1-5 scale value, clamping out-of-range numbers
    fn scale_value(&self, key: &str) -> Option<u8> {
        self.0
            .get(key)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
            .map(|v| v.round().clamp(1.0, 5.0) as u8)
    }
}

impl From<BTreeMap<String, Value>> for EventMetadata {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

/// A behavioral event. Immutable once appended to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier
    pub id: String,
    /// Per-user insertion index, breaks timestamp ties
    pub sequence: u64,
    /// Owner of the event
    pub user_id: String,
    /// Event type
    pub event_type: EventType,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// Session duration in whole seconds (session_end only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    /// Type-specific metadata
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl Event {
    /// Ordering key within a user's log
    pub fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.timestamp, self.sequence)
    }
}

/// Caller-supplied event before the store assigns identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub user_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: EventMetadata,
    #[serde(default)]
    pub duration: Option<u64>,
}

impl NewEvent {
    /// Reject events the engine cannot attribute
    pub fn validate(&self) -> Result<(), String> {
        if self.user_id.trim().is_empty() {
            return Err("user_id must not be empty".to_string());
        }
        if self.duration.is_some() && self.event_type != EventType::SessionEnd {
            return Err(format!(
                "duration is only valid on session_end, got {}",
                self.event_type
            ));
        }
        Ok(())
    }
}

/// A view over a `mood_log` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodEntry {
    pub timestamp: DateTime<Utc>,
    pub mood: MoodLabel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl MoodEntry {
    /// Build an entry from a `mood_log` event carrying a `mood` key
    pub fn from_event(event: &Event) -> Option<Self> {
        if event.event_type != EventType::MoodLog {
            return None;
        }
        let mood = event.metadata.mood()?;
        Some(Self {
            timestamp: event.timestamp,
            mood,
            energy: event.metadata.energy(),
            confidence: event.metadata.confidence(),
            note: event.metadata.note().map(str::to_string),
        })
    }

    /// Metadata map for recording this entry as an event
    pub fn to_metadata(&self) -> EventMetadata {
        let mut metadata = EventMetadata::new().with_mood(&self.mood);
        if let Some(energy) = self.energy {
            metadata = metadata.with("energy", energy.clamp(1, 5));
        }
        if let Some(confidence) = self.confidence {
            metadata = metadata.with("confidence", confidence.clamp(1, 5));
        }
        if let Some(note) = &self.note {
            metadata = metadata.with("note", note.as_str());
        }
        metadata
    }
}

/// Week-over-week direction of session counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeeklyTrend {
    Increasing,
    Decreasing,
    Stable,
}

/// Time-of-day buckets for session starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    /// 06:00-11:59
    Morning,
    /// 12:00-16:59
    Afternoon,
    /// 17:00-20:59
    Evening,
    /// 21:00-05:59
    Night,
}

impl TimeOfDay {
    /// Classify a local hour (0-23)
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            6..=11 => Self::Morning,
            12..=16 => Self::Afternoon,
            17..=20 => Self::Evening,
            _ => Self::Night,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::Night => "night",
        }
    }

    /// Buckets in tie-break order
    pub fn all() -> [TimeOfDay; 4] {
        [Self::Morning, Self::Afternoon, Self::Evening, Self::Night]
    }
}

/// Engagement metrics derived from session events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementPattern {
    /// Distinct days with a session start / window days
    pub login_frequency: f64,
    /// Mean session_end duration in seconds
    pub average_session_duration: f64,
    /// Local date -> session start count
    pub daily_engagement: BTreeMap<NaiveDate, u32>,
    pub weekly_trend: WeeklyTrend,
    pub most_active_time_of_day: TimeOfDay,
    /// Session starts inside the window
    pub total_sessions: u32,
    /// Local hour with the most session starts
    pub peak_hour: Option<u32>,
}

/// Activity on one day of the week within the window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekdayActivity {
    pub weekday: Weekday,
    /// Number of active dates falling on this weekday
    pub active_days: u32,
    pub active: bool,
}

/// Study consistency metrics derived from quiz activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyAnalysis {
    /// 0-100
    pub consistency_score: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Distinct active days inside the window
    pub active_days: u32,
    /// Monday through Sunday
    pub weekly_pattern: Vec<WeekdayActivity>,
    /// Subject -> event count
    pub subject_consistency: BTreeMap<String, u32>,
    pub recommendations: Vec<String>,
}

/// Recent quiz results taken from the tail of the event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizPerformance {
    /// Quiz attempts inside the window
    pub attempts: u32,
    /// Scores of the most recent attempts that carry one, oldest first
    pub recent_scores: Vec<f64>,
    /// Mean of `recent_scores`
    pub recent_average: Option<f64>,
}

/// Direction of recent mood relative to earlier entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodTrend {
    Improving,
    Declining,
    Stable,
}

/// Aggregates over `mood_log` events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodAnalytics {
    pub average_mood: f64,
    pub mood_trend: MoodTrend,
    /// Reported energy values, oldest first
    pub energy_levels: Vec<u8>,
    /// Reported confidence values, oldest first
    pub confidence_levels: Vec<u8>,
    pub average_energy: Option<f64>,
    pub average_confidence: Option<f64>,
    /// Label -> count
    pub mood_distribution: BTreeMap<String, u32>,
    /// Number of mood entries considered
    pub entries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Motivation,
    Warning,
    Celebration,
    Suggestion,
}

/// Insight priority; ordering is low < medium < high
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightCategory {
    Engagement,
    Performance,
    Consistency,
    Mood,
}

/// A prioritized, human-readable observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// Stable per rule, used by consumers to deduplicate and dismiss
    pub id: String,
    #[serde(rename = "type")]
    pub insight_type: InsightType,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    pub actionable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    pub category: InsightCategory,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_event_type_serialization() {
        let json = serde_json::to_string(&EventType::QuizAttempt).unwrap();
        assert_eq!(json, "\"quiz_attempt\"");

        let parsed: EventType = serde_json::from_str("\"achievement_earned\"").unwrap();
        assert_eq!(parsed, EventType::AchievementEarned);
        assert_eq!("mood_log".parse::<EventType>(), Ok(EventType::MoodLog));
        assert!("logout".parse::<EventType>().is_err());
    }

    #[test]
    fn test_mood_label_ordinals() {
        assert_eq!(MoodLabel::parse("excited").ordinal(), 5.0);
        assert_eq!(MoodLabel::parse("Happy").ordinal(), 4.0);
        assert_eq!(MoodLabel::parse("okay").ordinal(), 3.0);
        assert_eq!(MoodLabel::parse("tired").ordinal(), 2.0);
        assert_eq!(MoodLabel::parse("frustrated").ordinal(), 1.0);
        assert_eq!(MoodLabel::parse("confused").ordinal(), 1.0);
        assert_eq!(MoodLabel::parse("sad").ordinal(), 1.0);

        let other = MoodLabel::parse("meh");
        assert_eq!(other, MoodLabel::Other("meh".to_string()));
        assert_eq!(other.ordinal(), NEUTRAL_MOOD);
    }

    #[test]
    fn test_unknown_mood_label_deserializes() {
        let label: MoodLabel = serde_json::from_str("\"curious\"").unwrap();
        assert_eq!(label, MoodLabel::Other("curious".to_string()));
        let label: MoodLabel = serde_json::from_str("\"tired\"").unwrap();
        assert_eq!(label, MoodLabel::Tired);
    }

    #[test]
    fn test_metadata_accessors_tolerate_bad_types() {
        let metadata: EventMetadata = serde_json::from_str(
            r#"{"score": "ninety", "subject": 42, "energy": 9, "confidence": 0.2, "extra": true}"#,
        )
        .unwrap();

        assert_eq!(metadata.score(), None);
        assert_eq!(metadata.subject(), None);
        assert_eq!(metadata.energy(), Some(5));
        assert_eq!(metadata.confidence(), Some(1));
        assert_eq!(metadata.get("extra"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_event_deserialization_without_metadata() {
        let json = r#"{
            "id": "evt-1",
            "sequence": 3,
            "user_id": "learner-1",
            "event_type": "page_view",
            "timestamp": "2024-01-15T14:00:00Z"
        }"#;

        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, EventType::PageView);
        assert!(event.metadata.is_empty());
        assert!(event.duration.is_none());
    }

    #[test]
    fn test_mood_entry_from_event() {
        let event = Event {
            id: "evt-1".to_string(),
            sequence: 0,
            user_id: "learner-1".to_string(),
            event_type: EventType::MoodLog,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap(),
            duration: None,
            metadata: EventMetadata::new()
                .with("mood", "happy")
                .with("energy", 4)
                .with("note", "good sleep"),
        };

        let entry = MoodEntry::from_event(&event).unwrap();
        assert_eq!(entry.mood, MoodLabel::Happy);
        assert_eq!(entry.energy, Some(4));
        assert_eq!(entry.confidence, None);
        assert_eq!(entry.note.as_deref(), Some("good sleep"));
    }

    #[test]
    fn test_new_event_validation() {
        let mut event = NewEvent {
            user_id: "learner-1".to_string(),
            event_type: EventType::Click,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap(),
            metadata: EventMetadata::new(),
            duration: Some(30),
        };
        assert!(event.validate().is_err());

        event.event_type = EventType::SessionEnd;
        assert!(event.validate().is_ok());

        event.user_id = "  ".to_string();
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn test_time_of_day_buckets() {
        assert_eq!(TimeOfDay::from_hour(6), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(11), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(12), TimeOfDay::Afternoon);
        assert_eq!(TimeOfDay::from_hour(17), TimeOfDay::Evening);
        assert_eq!(TimeOfDay::from_hour(21), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(3), TimeOfDay::Night);
    }

    #[test]
    fn test_insight_type_field_rename() {
        let insight = Insight {
            id: "low-consistency".to_string(),
            insight_type: InsightType::Motivation,
            priority: Priority::Medium,
            title: "t".to_string(),
            message: "m".to_string(),
            actionable: true,
            suggested_action: None,
            category: InsightCategory::Consistency,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap(),
        };
        let value = serde_json::to_value(&insight).unwrap();
        assert_eq!(value["type"], "motivation");
        assert_eq!(value["priority"], "medium");
        assert!(value.get("suggested_action").is_none());
    }
}
