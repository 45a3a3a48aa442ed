//! Rule-based insight generation
//!
//! Each rule looks at the derived metrics and emits at most one [`Insight`]
//! with a stable id. Rules run in a fixed order; the result is sorted by
//! priority (stable, so rule order is kept within a priority) and
//! deduplicated by id.

use crate::types::{
    ConsistencyAnalysis, EngagementPattern, Insight, InsightCategory, InsightType, MoodAnalytics,
    MoodTrend, Priority, QuizPerformance, TimeOfDay, WeeklyTrend,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::info;

/// Streak length that earns a celebration
pub const STREAK_CELEBRATION_DAYS: u32 = 7;

/// Consistency score below which the learner gets a nudge
pub const LOW_CONSISTENCY_SCORE: u32 = 30;

/// Average mood ordinal below which mood is considered low
pub const LOW_MOOD_THRESHOLD: f64 = 2.5;

/// Scores needed among the recent attempts before performance is judged
pub const MIN_QUIZ_SAMPLE: usize = 3;

pub const LOW_QUIZ_AVERAGE: f64 = 60.0;
pub const HIGH_QUIZ_AVERAGE: f64 = 85.0;

/// Everything the rules look at
#[derive(Debug, Clone)]
pub struct InsightInputs {
    /// Events in the snapshot the metrics were derived from
    pub events: usize,
    pub engagement: EngagementPattern,
    pub consistency: ConsistencyAnalysis,
    pub mood: MoodAnalytics,
    pub quiz: QuizPerformance,
}

/// Side channel for high-priority insights
pub trait InsightNotifier: Send + Sync {
    fn notify(&self, user_id: &str, insight: &Insight);
}

/// Emits notifications as `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl InsightNotifier for LogNotifier {
    fn notify(&self, user_id: &str, insight: &Insight) {
        info!(
            user_id,
            insight_id = %insight.id,
            title = %insight.title,
            "High-priority insight"
        );
    }
}

/// Drops every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl InsightNotifier for NoopNotifier {
    fn notify(&self, _user_id: &str, _insight: &Insight) {}
}

/// Runs the insight rules
pub struct InsightEngine;

impl InsightEngine {
    /// Generate insights for the given metrics
    ///
    /// `now` stamps every insight so identical inputs give identical output.
    pub fn generate(inputs: &InsightInputs, now: DateTime<Utc>) -> Vec<Insight> {
        let candidates = [
            engagement_declining(&inputs.engagement, now),
            engagement_rising(&inputs.engagement, now),
            streak_celebration(&inputs.consistency, now),
            low_consistency(&inputs.consistency, inputs.events, now),
            mood_low(&inputs.mood, now),
            mood_declining(&inputs.mood, now),
            quiz_performance_low(&inputs.quiz, now),
            quiz_performance_high(&inputs.quiz, now),
            time_of_day(&inputs.engagement, now),
        ];

        let mut insights: Vec<Insight> = candidates.into_iter().flatten().collect();
        insights.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut seen = HashSet::new();
        insights.retain(|insight| seen.insert(insight.id.clone()));
        insights
    }
}

struct Draft {
    id: String,
    insight_type: InsightType,
    priority: Priority,
    category: InsightCategory,
    title: &'static str,
    message: String,
    suggested_action: Option<&'static str>,
}

impl Draft {
    fn stamp(self, now: DateTime<Utc>) -> Insight {
        Insight {
            id: self.id,
            insight_type: self.insight_type,
            priority: self.priority,
            title: self.title.to_string(),
            message: self.message,
            actionable: self.suggested_action.is_some(),
            suggested_action: self.suggested_action.map(str::to_string),
            category: self.category,
            timestamp: now,
        }
    }
}

fn engagement_declining(engagement: &EngagementPattern, now: DateTime<Utc>) -> Option<Insight> {
    if engagement.weekly_trend != WeeklyTrend::Decreasing {
        return None;
    }
    Some(
        Draft {
            id: "engagement-declining".to_string(),
            insight_type: InsightType::Warning,
            priority: Priority::High,
            category: InsightCategory::Engagement,
            title: "Study time is dropping",
            message: "You started fewer study sessions this week than last week.".to_string(),
            suggested_action: Some("Schedule a short session today to get back on track."),
        }
        .stamp(now),
    )
}

fn engagement_rising(engagement: &EngagementPattern, now: DateTime<Utc>) -> Option<Insight> {
    if engagement.weekly_trend != WeeklyTrend::Increasing {
        return None;
    }
    Some(
        Draft {
            id: "engagement-rising".to_string(),
            insight_type: InsightType::Celebration,
            priority: Priority::Medium,
            category: InsightCategory::Engagement,
            title: "Momentum is building",
            message: "You studied more often this week than last week. Keep it up!".to_string(),
            suggested_action: None,
        }
        .stamp(now),
    )
}

fn streak_celebration(consistency: &ConsistencyAnalysis, now: DateTime<Utc>) -> Option<Insight> {
    if consistency.current_streak < STREAK_CELEBRATION_DAYS {
        return None;
    }
    Some(
        Draft {
            id: "streak-celebration".to_string(),
            insight_type: InsightType::Celebration,
            priority: Priority::High,
            category: InsightCategory::Consistency,
            title: "Streak unlocked",
            message: format!(
                "You have practiced {} days in a row.",
                consistency.current_streak
            ),
            suggested_action: None,
        }
        .stamp(now),
    )
}

/// Only for learners with some recorded history
fn low_consistency(
    consistency: &ConsistencyAnalysis,
    events: usize,
    now: DateTime<Utc>,
) -> Option<Insight> {
    if events == 0 || consistency.consistency_score >= LOW_CONSISTENCY_SCORE {
        return None;
    }
    Some(
        Draft {
            id: "low-consistency".to_string(),
            insight_type: InsightType::Motivation,
            priority: Priority::Medium,
            category: InsightCategory::Consistency,
            title: "Small steps add up",
            message: format!(
                "You practiced on {} of the last 30 days.",
                consistency.active_days
            ),
            suggested_action: Some("Set a daily reminder for a 10-minute quiz."),
        }
        .stamp(now),
    )
}

fn mood_low(mood: &MoodAnalytics, now: DateTime<Utc>) -> Option<Insight> {
    if mood.entries == 0 || mood.average_mood >= LOW_MOOD_THRESHOLD {
        return None;
    }
    Some(
        Draft {
            id: "mood-low".to_string(),
            insight_type: InsightType::Warning,
            priority: Priority::High,
            category: InsightCategory::Mood,
            title: "Rough patch",
            message: "Your recent check-ins suggest you are feeling low while studying."
                .to_string(),
            suggested_action: Some("Take a break, or switch to a lighter topic for a while."),
        }
        .stamp(now),
    )
}

fn mood_declining(mood: &MoodAnalytics, now: DateTime<Utc>) -> Option<Insight> {
    if mood.mood_trend != MoodTrend::Declining {
        return None;
    }
    Some(
        Draft {
            id: "mood-declining".to_string(),
            insight_type: InsightType::Suggestion,
            priority: Priority::Medium,
            category: InsightCategory::Mood,
            title: "Mood is trending down",
            message: "Your recent mood check-ins are lower than before.".to_string(),
            suggested_action: Some("Try shorter sessions with more frequent breaks."),
        }
        .stamp(now),
    )
}

/// Mean of the recent scores when enough of them are present
fn sampled_average(quiz: &QuizPerformance) -> Option<f64> {
    if quiz.recent_scores.len() < MIN_QUIZ_SAMPLE {
        return None;
    }
    quiz.recent_average
}

fn quiz_performance_low(quiz: &QuizPerformance, now: DateTime<Utc>) -> Option<Insight> {
    let average = sampled_average(quiz).filter(|avg| *avg < LOW_QUIZ_AVERAGE)?;
    Some(
        Draft {
            id: "quiz-performance-low".to_string(),
            insight_type: InsightType::Suggestion,
            priority: Priority::Medium,
            category: InsightCategory::Performance,
            title: "Quizzes feel tough",
            message: format!("Your recent quiz average is {average:.0}%."),
            suggested_action: Some("Review the material once more before your next attempt."),
        }
        .stamp(now),
    )
}

fn quiz_performance_high(quiz: &QuizPerformance, now: DateTime<Utc>) -> Option<Insight> {
    let average = sampled_average(quiz).filter(|avg| *avg >= HIGH_QUIZ_AVERAGE)?;
    Some(
        Draft {
            id: "quiz-performance-high".to_string(),
            insight_type: InsightType::Celebration,
            priority: Priority::Low,
            category: InsightCategory::Performance,
            title: "Acing it",
            message: format!("Your recent quiz average is {average:.0}%."),
            suggested_action: None,
        }
        .stamp(now),
    )
}

fn time_of_day(engagement: &EngagementPattern, now: DateTime<Utc>) -> Option<Insight> {
    if engagement.total_sessions == 0 {
        return None;
    }
    let bucket = engagement.most_active_time_of_day;
    let suggested_action = match bucket {
        TimeOfDay::Morning => "Plan your hardest topics for the morning.",
        TimeOfDay::Afternoon => "Block an afternoon slot in your calendar for study.",
        TimeOfDay::Evening => "Keep a regular evening study slot.",
        TimeOfDay::Night => "Late sessions work for you, but protect your sleep.",
    };
    Some(
        Draft {
            id: format!("time-of-day-{}", bucket.as_str()),
            insight_type: InsightType::Suggestion,
            priority: Priority::Low,
            category: InsightCategory::Engagement,
            title: "Your best study time",
            message: format!("You study most often in the {}.", bucket.as_str()),
            suggested_action: Some(suggested_action),
        }
        .stamp(now),
    )
}
