//! Engagement and consistency derivation
//!
//! Pure functions over an event snapshot. `now` carries the user's UTC offset,
//! which defines calendar days and hours of day.

use crate::types::{
    ConsistencyAnalysis, EngagementPattern, Event, EventType, QuizPerformance, TimeOfDay,
    WeekdayActivity, WeeklyTrend,
};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Timelike, Utc, Weekday};
use std::collections::{BTreeMap, BTreeSet};

/// Trailing analysis window in days
pub const ANALYSIS_WINDOW_DAYS: i64 = 30;

/// Maximum days walked back when counting the current streak
pub const STREAK_LOOKBACK_DAYS: i64 = 30;

/// Relative change needed before a weekly trend is reported
const TREND_DEADBAND: f64 = 0.1;

/// Number of scored quiz attempts considered recent
pub const RECENT_QUIZ_SAMPLE: usize = 10;

/// Subject bucket for events without a `subject`
pub const UNKNOWN_SUBJECT: &str = "unknown";

pub const RECOMMEND_MICRO_SESSIONS: &str =
    "Try short daily study sessions of 10-15 minutes to build a steadier routine.";
pub const RECOMMEND_NEW_STREAK: &str =
    "Complete a quiz today to start a new learning streak.";
pub const RECOMMEND_EXPLORE_SUBJECTS: &str =
    "You have been focusing on a single subject. Explore another one to broaden your skills.";

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Derives engagement and consistency metrics from an event snapshot
pub struct PatternAnalyzer;

impl PatternAnalyzer {
    /// Session-based engagement over the trailing window
    ///
    /// The window is the last 30 local calendar days including today, so
    /// `login_frequency` never exceeds 1.0.
    pub fn engagement(events: &[Event], now: DateTime<FixedOffset>) -> EngagementPattern {
        let offset = now.timezone();
        let now_utc = now.with_timezone(&Utc);
        let window_first = now.date_naive() - Duration::days(ANALYSIS_WINDOW_DAYS - 1);

        let in_window: Vec<&Event> = events
            .iter()
            .filter(|e| {
                e.timestamp <= now_utc
                    && e.timestamp.with_timezone(&offset).date_naive() >= window_first
            })
            .collect();

        let starts: Vec<DateTime<Utc>> = in_window
            .iter()
            .filter(|e| e.event_type == EventType::SessionStart)
            .map(|e| e.timestamp)
            .collect();

        let mut daily_engagement: BTreeMap<NaiveDate, u32> = BTreeMap::new();
        let mut hourly = [0u32; 24];
        for start in &starts {
            let local = start.with_timezone(&offset);
            *daily_engagement.entry(local.date_naive()).or_insert(0) += 1;
            hourly[local.hour() as usize] += 1;
        }

        let durations: Vec<u64> = in_window
            .iter()
            .filter(|e| e.event_type == EventType::SessionEnd)
            .filter_map(|e| e.duration)
            .collect();

        let current_week = starts
            .iter()
            .filter(|t| **t > now_utc - Duration::days(7))
            .count() as u32;
        let prior_week = starts
            .iter()
            .filter(|t| **t > now_utc - Duration::days(14) && **t <= now_utc - Duration::days(7))
            .count() as u32;

        EngagementPattern {
            login_frequency: daily_engagement.len() as f64 / ANALYSIS_WINDOW_DAYS as f64,
            average_session_duration: mean_duration(&durations),
            daily_engagement,
            weekly_trend: compute_weekly_trend(current_week, prior_week),
            most_active_time_of_day: most_active_bucket(&hourly),
            total_sessions: starts.len() as u32,
            peak_hour: peak_hour(&hourly),
        }
    }

    /// Quiz-based study consistency
    ///
    /// Only `quiz_attempt` events mark a day as active; session events feed
    /// [`PatternAnalyzer::engagement`] instead.
    pub fn consistency(events: &[Event], now: DateTime<FixedOffset>) -> ConsistencyAnalysis {
        let offset = now.timezone();
        let now_utc = now.with_timezone(&Utc);
        let today = now.date_naive();
        let window_first = today - Duration::days(ANALYSIS_WINDOW_DAYS - 1);

        let quizzes: Vec<(NaiveDate, &Event)> = events
            .iter()
            .filter(|e| e.event_type == EventType::QuizAttempt && e.timestamp <= now_utc)
            .map(|e| (e.timestamp.with_timezone(&offset).date_naive(), e))
            .collect();

        let active_dates: BTreeSet<NaiveDate> = quizzes.iter().map(|(date, _)| *date).collect();
        let window_dates: BTreeSet<NaiveDate> =
            active_dates.range(window_first..=today).copied().collect();

        let mut subject_consistency: BTreeMap<String, u32> = BTreeMap::new();
        for (date, event) in &quizzes {
            if *date < window_first {
                continue;
            }
            let subject = event.metadata.subject().unwrap_or(UNKNOWN_SUBJECT);
            *subject_consistency.entry(subject.to_string()).or_insert(0) += 1;
        }

        let active_days = window_dates.len() as u32;
        let consistency_score = compute_consistency_score(active_days);
        let current_streak = compute_current_streak(&active_dates, today);
        let longest_streak = compute_longest_streak(&active_dates);
        let recommendations =
            build_recommendations(consistency_score, current_streak, &subject_consistency);

        ConsistencyAnalysis {
            consistency_score,
            current_streak,
            longest_streak,
            active_days,
            weekly_pattern: weekly_pattern(&window_dates),
            subject_consistency,
            recommendations,
        }
    }

    /// Quiz attempts in the window and the scores of the last ten attempts
    pub fn quiz_performance(events: &[Event], now: DateTime<FixedOffset>) -> QuizPerformance {
        let now_utc = now.with_timezone(&Utc);
        let window_start = now_utc - Duration::days(ANALYSIS_WINDOW_DAYS);

        let quizzes: Vec<&Event> = events
            .iter()
            .filter(|e| e.event_type == EventType::QuizAttempt && e.timestamp <= now_utc)
            .collect();

        let attempts = quizzes
            .iter()
            .filter(|e| e.timestamp > window_start)
            .count() as u32;

        let tail = &quizzes[quizzes.len().saturating_sub(RECENT_QUIZ_SAMPLE)..];
        let recent_scores: Vec<f64> = tail.iter().filter_map(|e| e.metadata.score()).collect();
        let recent_average = if recent_scores.is_empty() {
            None
        } else {
            Some(recent_scores.iter().sum::<f64>() / recent_scores.len() as f64)
        };

        QuizPerformance {
            attempts,
            recent_scores,
            recent_average,
        }
    }
}

fn mean_duration(durations: &[u64]) -> f64 {
    if durations.is_empty() {
        return 0.0;
    }
    durations.iter().sum::<u64>() as f64 / durations.len() as f64
}

/// Compare this week's session starts against last week's
///
/// Increasing above +10%, decreasing below -10%. A prior week with no
/// sessions gives no baseline and is reported as stable.
fn compute_weekly_trend(current: u32, prior: u32) -> WeeklyTrend {
    if prior == 0 {
        return WeeklyTrend::Stable;
    }
    let current = current as f64;
    let prior = prior as f64;
    if current > prior * (1.0 + TREND_DEADBAND) {
        WeeklyTrend::Increasing
    } else if current < prior * (1.0 - TREND_DEADBAND) {
        WeeklyTrend::Decreasing
    } else {
        WeeklyTrend::Stable
    }
}

/// Bucket with the most starts; ties resolve morning → afternoon → evening → night
fn most_active_bucket(hourly: &[u32; 24]) -> TimeOfDay {
    let mut best = TimeOfDay::Morning;
    let mut best_count = 0;
    for bucket in TimeOfDay::all() {
        let count: u32 = (0..24u32)
            .filter(|h| TimeOfDay::from_hour(*h) == bucket)
            .map(|h| hourly[h as usize])
            .sum();
        if count > best_count {
            best = bucket;
            best_count = count;
        }
    }
    best
}

fn peak_hour(hourly: &[u32; 24]) -> Option<u32> {
    let max = *hourly.iter().max()?;
    if max == 0 {
        return None;
    }
    hourly.iter().position(|&c| c == max).map(|h| h as u32)
}

/// Formula: `round(100 * active_days / window_days)`, capped at 100
fn compute_consistency_score(active_days: u32) -> u32 {
    let score = (100.0 * active_days as f64 / ANALYSIS_WINDOW_DAYS as f64).round() as u32;
    score.min(100)
}

/// Consecutive active days ending today, stopping at the first gap
fn compute_current_streak(active: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut streak = 0;
    for offset in 0..STREAK_LOOKBACK_DAYS {
        if active.contains(&(today - Duration::days(offset))) {
            streak += 1;
        } else {
            break;
        }
    }
    streak
}

/// Longest run of calendar-consecutive active days
fn compute_longest_streak(active: &BTreeSet<NaiveDate>) -> u32 {
    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;

    for &date in active {
        run = match previous {
            Some(prev) if date - prev == Duration::days(1) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(date);
    }
    longest
}

fn weekly_pattern(window_dates: &BTreeSet<NaiveDate>) -> Vec<WeekdayActivity> {
    WEEK.iter()
        .map(|&weekday| {
            let active_days = window_dates
                .iter()
                .filter(|d| d.weekday() == weekday)
                .count() as u32;
            WeekdayActivity {
                weekday,
                active_days,
                active: active_days > 0,
            }
        })
        .collect()
}

/// Independent threshold rules, in declaration order
fn build_recommendations(
    consistency_score: u32,
    current_streak: u32,
    subjects: &BTreeMap<String, u32>,
) -> Vec<String> {
    let mut recommendations = Vec::new();
    if consistency_score < 50 {
        recommendations.push(RECOMMEND_MICRO_SESSIONS.to_string());
    }
    if current_streak == 0 {
        recommendations.push(RECOMMEND_NEW_STREAK.to_string());
    }
    if subjects.len() == 1 {
        recommendations.push(RECOMMEND_EXPLORE_SUBJECTS.to_string());
    }
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventMetadata;
    use chrono::TimeZone;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    /// 2024-03-20 15:00 UTC, a Wednesday
    fn now() -> DateTime<FixedOffset> {
        utc().with_ymd_and_hms(2024, 3, 20, 15, 0, 0).unwrap()
    }

    fn event(event_type: EventType, timestamp: DateTime<Utc>, seq: u64) -> Event {
        Event {
            id: format!("evt-{seq}"),
            sequence: seq,
            user_id: "u1".to_string(),
            event_type,
            timestamp,
            duration: None,
            metadata: EventMetadata::new(),
        }
    }

    fn days_ago(days: i64, hour: u32) -> DateTime<Utc> {
        let date = now().date_naive() - Duration::days(days);
        Utc.from_utc_datetime(&date.and_hms_opt(hour, 0, 0).unwrap())
    }

    fn quizzes_on(days: &[i64]) -> Vec<Event> {
        days.iter()
            .enumerate()
            .map(|(i, d)| event(EventType::QuizAttempt, days_ago(*d, 10), i as u64))
            .collect()
    }

    fn starts(days_and_hours: &[(i64, u32)]) -> Vec<Event> {
        days_and_hours
            .iter()
            .enumerate()
            .map(|(i, (d, h))| event(EventType::SessionStart, days_ago(*d, *h), i as u64))
            .collect()
    }

    #[test]
    fn test_empty_history_defaults() {
        let engagement = PatternAnalyzer::engagement(&[], now());
        assert_eq!(engagement.login_frequency, 0.0);
        assert_eq!(engagement.average_session_duration, 0.0);
        assert_eq!(engagement.weekly_trend, WeeklyTrend::Stable);
        assert_eq!(engagement.most_active_time_of_day, TimeOfDay::Morning);
        assert_eq!(engagement.peak_hour, None);
        assert!(engagement.daily_engagement.is_empty());

        let consistency = PatternAnalyzer::consistency(&[], now());
        assert_eq!(consistency.consistency_score, 0);
        assert_eq!(consistency.current_streak, 0);
        assert_eq!(consistency.longest_streak, 0);
        assert_eq!(
            consistency.recommendations,
            vec![RECOMMEND_MICRO_SESSIONS.to_string(), RECOMMEND_NEW_STREAK.to_string()]
        );
    }

    #[test]
    fn test_login_frequency_counts_distinct_days() {
        let events = starts(&[(0, 9), (0, 14), (1, 9), (5, 20), (45, 9)]);
        let engagement = PatternAnalyzer::engagement(&events, now());

        assert!((engagement.login_frequency - 3.0 / 30.0).abs() < 1e-9);
        assert_eq!(engagement.total_sessions, 4);
        assert_eq!(engagement.daily_engagement.values().copied().collect::<Vec<_>>(), vec![1, 1, 2]);
    }

    #[test]
    fn test_login_frequency_bounded_by_calendar_window() {
        // Today at 09:00 plus 16:00 on each of the previous 30 days: the
        // oldest start is inside 30 x 24h but on a 31st calendar date
        let mut days: Vec<(i64, u32)> = vec![(0, 9)];
        days.extend((1..=30).map(|d| (d, 16)));
        let engagement = PatternAnalyzer::engagement(&starts(&days), now());

        assert_eq!(engagement.login_frequency, 1.0);
        assert_eq!(engagement.daily_engagement.len(), 30);
        assert_eq!(engagement.total_sessions, 30);
        let first = now().date_naive() - Duration::days(29);
        assert_eq!(engagement.daily_engagement.keys().next(), Some(&first));
    }

    #[test]
    fn test_average_session_duration() {
        let mut events = Vec::new();
        for (i, secs) in [600u64, 1200, 300].iter().enumerate() {
            let mut end = event(EventType::SessionEnd, days_ago(i as i64, 12), i as u64);
            end.duration = Some(*secs);
            events.push(end);
        }
        let mut old = event(EventType::SessionEnd, days_ago(60, 12), 9);
        old.duration = Some(100_000);
        events.push(old);

        let engagement = PatternAnalyzer::engagement(&events, now());
        assert!((engagement.average_session_duration - 700.0).abs() < 1e-9);
    }

    #[test]
    fn test_weekly_trend_thresholds() {
        assert_eq!(compute_weekly_trend(0, 0), WeeklyTrend::Stable);
        assert_eq!(compute_weekly_trend(4, 0), WeeklyTrend::Stable);
        assert_eq!(compute_weekly_trend(5, 2), WeeklyTrend::Increasing);
        assert_eq!(compute_weekly_trend(5, 10), WeeklyTrend::Decreasing);
        assert_eq!(compute_weekly_trend(11, 10), WeeklyTrend::Stable);
        assert_eq!(compute_weekly_trend(9, 10), WeeklyTrend::Stable);
        assert_eq!(compute_weekly_trend(12, 10), WeeklyTrend::Increasing);
    }

    #[test]
    fn test_weekly_trend_from_events() {
        // 1 session this week, 3 the week before
        let events = starts(&[(1, 9), (8, 9), (9, 9), (10, 9)]);
        let engagement = PatternAnalyzer::engagement(&events, now());
        assert_eq!(engagement.weekly_trend, WeeklyTrend::Decreasing);
    }

    #[test]
    fn test_most_active_time_of_day_ties_prefer_earlier_bucket() {
        let tie = starts(&[(1, 8), (2, 19)]);
        assert_eq!(
            PatternAnalyzer::engagement(&tie, now()).most_active_time_of_day,
            TimeOfDay::Morning
        );

        let evening = starts(&[(1, 8), (2, 19), (3, 18)]);
        let engagement = PatternAnalyzer::engagement(&evening, now());
        assert_eq!(engagement.most_active_time_of_day, TimeOfDay::Evening);
        assert_eq!(engagement.peak_hour, Some(8));

        let night = starts(&[(1, 23), (2, 2)]);
        assert_eq!(
            PatternAnalyzer::engagement(&night, now()).most_active_time_of_day,
            TimeOfDay::Night
        );
    }

    #[test]
    fn test_local_offset_shifts_day_and_hour() {
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let local_now = now().with_timezone(&plus_two);
        // 2024-03-18 23:30 UTC is 01:30 on the 19th at +02:00
        let late = Utc.with_ymd_and_hms(2024, 3, 18, 23, 30, 0).unwrap();
        let events = vec![event(EventType::SessionStart, late, 0)];

        let engagement = PatternAnalyzer::engagement(&events, local_now);
        let day = NaiveDate::from_ymd_opt(2024, 3, 19).unwrap();
        assert_eq!(engagement.daily_engagement.get(&day), Some(&1));
        assert_eq!(engagement.most_active_time_of_day, TimeOfDay::Night);
    }

    #[test]
    fn test_current_streak_stops_at_gap() {
        let events = quizzes_on(&[0, 1, 2, 4, 5]);
        let consistency = PatternAnalyzer::consistency(&events, now());
        assert_eq!(consistency.current_streak, 3);
    }

    #[test]
    fn test_current_streak_zero_without_quiz_today() {
        let events = quizzes_on(&[1, 2, 3]);
        let consistency = PatternAnalyzer::consistency(&events, now());
        assert_eq!(consistency.current_streak, 0);
        assert_eq!(consistency.longest_streak, 3);
    }

    #[test]
    fn test_current_streak_capped_at_lookback() {
        let days: Vec<i64> = (0..45).collect();
        let consistency = PatternAnalyzer::consistency(&quizzes_on(&days), now());
        assert_eq!(consistency.current_streak, 30);
        assert_eq!(consistency.longest_streak, 45);
        assert_eq!(consistency.consistency_score, 100);
    }

    #[test]
    fn test_longest_streak_ignores_non_adjacent_days() {
        // D, D+1, D+2, D+5
        let events = quizzes_on(&[10, 9, 8, 5]);
        let consistency = PatternAnalyzer::consistency(&events, now());
        assert_eq!(consistency.longest_streak, 3);
    }

    #[test]
    fn test_consistency_score_rounding_and_bounds() {
        assert_eq!(compute_consistency_score(0), 0);
        assert_eq!(compute_consistency_score(1), 3);
        assert_eq!(compute_consistency_score(15), 50);
        assert_eq!(compute_consistency_score(30), 100);
        assert_eq!(compute_consistency_score(31), 100);
    }

    #[test]
    fn test_consistency_ignores_session_events() {
        let events = starts(&[(0, 9), (1, 9), (2, 9)]);
        let consistency = PatternAnalyzer::consistency(&events, now());
        assert_eq!(consistency.active_days, 0);
        assert_eq!(consistency.current_streak, 0);
    }

    #[test]
    fn test_subject_consistency_and_recommendations() {
        let mut events = quizzes_on(&[0, 1]);
        events[0].metadata = EventMetadata::new().with_subject("math");
        events[1].metadata = EventMetadata::new().with_subject("math");
        let single = PatternAnalyzer::consistency(&events, now());
        assert_eq!(single.subject_consistency.get("math"), Some(&2));
        assert_eq!(
            single.recommendations,
            vec![
                RECOMMEND_MICRO_SESSIONS.to_string(),
                RECOMMEND_EXPLORE_SUBJECTS.to_string()
            ]
        );

        events.push(event(EventType::QuizAttempt, days_ago(2, 10), 7));
        let mixed = PatternAnalyzer::consistency(&events, now());
        assert_eq!(mixed.subject_consistency.get(UNKNOWN_SUBJECT), Some(&1));
        assert!(!mixed.recommendations.contains(&RECOMMEND_EXPLORE_SUBJECTS.to_string()));
    }

    #[test]
    fn test_weekly_pattern_marks_active_weekdays() {
        // now is a Wednesday; 0 and 7 days ago are both Wednesdays, 1 is Tuesday
        let events = quizzes_on(&[0, 1, 7]);
        let consistency = PatternAnalyzer::consistency(&events, now());

        assert_eq!(consistency.weekly_pattern.len(), 7);
        let wednesday = &consistency.weekly_pattern[2];
        assert_eq!(wednesday.weekday, Weekday::Wed);
        assert_eq!(wednesday.active_days, 2);
        assert!(consistency.weekly_pattern[1].active);
        assert!(!consistency.weekly_pattern[0].active);
    }

    #[test]
    fn test_future_events_are_ignored() {
        let future = Utc.with_ymd_and_hms(2024, 3, 25, 9, 0, 0).unwrap();
        let events = vec![
            event(EventType::QuizAttempt, future, 0),
            event(EventType::SessionStart, future, 1),
        ];
        assert_eq!(PatternAnalyzer::consistency(&events, now()).active_days, 0);
        assert_eq!(PatternAnalyzer::engagement(&events, now()).total_sessions, 0);
    }

    #[test]
    fn test_quiz_performance_uses_latest_attempts() {
        let mut events = Vec::new();
        for i in 0..12u64 {
            let mut quiz = event(EventType::QuizAttempt, days_ago(12 - i as i64, 10), i);
            quiz.metadata = EventMetadata::new().with_score(if i < 2 { 0.0 } else { 80.0 });
            events.push(quiz);
        }
        events.push(event(EventType::QuizAttempt, days_ago(0, 11), 99));

        let performance = PatternAnalyzer::quiz_performance(&events, now());
        assert_eq!(performance.attempts, 13);
        // last ten attempts: nine scored at 80, one without a score
        assert_eq!(performance.recent_scores, vec![80.0; 9]);
        assert_eq!(performance.recent_average, Some(80.0));
    }
}
