//! Mood analytics over `mood_log` events

use crate::types::{Event, MoodAnalytics, MoodEntry, MoodTrend, NEUTRAL_MOOD};
use std::collections::BTreeMap;

/// Entries in each of the recent and older trend groups
pub const MOOD_TREND_SAMPLE: usize = 10;

/// Relative change needed before a mood trend is reported
const TREND_DEADBAND: f64 = 0.1;

/// Aggregates mood entries into [`MoodAnalytics`]
pub struct MoodAnalyzer;

impl MoodAnalyzer {
    /// Analyze every `mood_log` event in the slice, in log order
    pub fn analyze(events: &[Event]) -> MoodAnalytics {
        let entries: Vec<MoodEntry> = events.iter().filter_map(MoodEntry::from_event).collect();
        Self::analyze_entries(&entries)
    }

    pub fn analyze_entries(entries: &[MoodEntry]) -> MoodAnalytics {
        let ordinals: Vec<f64> = entries.iter().map(|e| e.mood.ordinal()).collect();

        let mut mood_distribution: BTreeMap<String, u32> = BTreeMap::new();
        for entry in entries {
            *mood_distribution
                .entry(entry.mood.as_str().to_string())
                .or_insert(0) += 1;
        }

        let energy_levels: Vec<u8> = entries.iter().filter_map(|e| e.energy).collect();
        let confidence_levels: Vec<u8> = entries.iter().filter_map(|e| e.confidence).collect();

        MoodAnalytics {
            average_mood: mean_or_neutral(&ordinals),
            mood_trend: compute_mood_trend(&ordinals),
            average_energy: mean_scale(&energy_levels),
            average_confidence: mean_scale(&confidence_levels),
            energy_levels,
            confidence_levels,
            mood_distribution,
            entries: entries.len() as u32,
        }
    }
}

fn mean_or_neutral(values: &[f64]) -> f64 {
    if values.is_empty() {
        return NEUTRAL_MOOD;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn mean_scale(values: &[u8]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64)
}

/// Compare the last 10 ordinals against the (up to) 10 before them
///
/// An empty group counts as neutral. Improving above `older * 1.1`,
/// declining below `older * 0.9`.
fn compute_mood_trend(ordinals: &[f64]) -> MoodTrend {
    let split = ordinals.len().saturating_sub(MOOD_TREND_SAMPLE);
    let recent = &ordinals[split..];
    let older = &ordinals[split.saturating_sub(MOOD_TREND_SAMPLE)..split];

    let recent_mean = mean_or_neutral(recent);
    let older_mean = mean_or_neutral(older);

    if recent_mean > older_mean * (1.0 + TREND_DEADBAND) {
        MoodTrend::Improving
    } else if recent_mean < older_mean * (1.0 - TREND_DEADBAND) {
        MoodTrend::Declining
    } else {
        MoodTrend::Stable
    }
}
