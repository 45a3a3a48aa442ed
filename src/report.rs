//! Insight report encoder
//!
//! Bundles derived metrics and generated insights into a single JSON document.

use crate::error::{InsightError, Result};
use crate::insights::InsightInputs;
use crate::patterns::ANALYSIS_WINDOW_DAYS;
use crate::types::{
    ConsistencyAnalysis, EngagementPattern, Insight, MoodAnalytics, QuizPerformance,
};
use crate::{PRODUCER_NAME, PULSE_VERSION};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current report schema version
pub const REPORT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProvenance {
    pub user_id: String,
    pub window_start_utc: DateTime<Utc>,
    pub window_end_utc: DateTime<Utc>,
    pub utc_offset_minutes: i32,
    pub computed_at_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportQuality {
    /// Events in the snapshot the report was derived from
    pub events_considered: usize,
    /// Sparse-data markers, e.g. `no_sessions`
    pub flags: Vec<String>,
}

/// Full insight report for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightReport {
    pub report_version: String,
    pub producer: ReportProducer,
    pub provenance: ReportProvenance,
    pub quality: ReportQuality,
    pub engagement: EngagementPattern,
    pub consistency: ConsistencyAnalysis,
    pub mood: MoodAnalytics,
    pub quiz: QuizPerformance,
    pub insights: Vec<Insight>,
}

/// Report encoder
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Assemble a report from derived metrics
    pub fn encode(
        &self,
        user_id: &str,
        now: DateTime<FixedOffset>,
        inputs: InsightInputs,
        insights: Vec<Insight>,
    ) -> InsightReport {
        let now_utc = now.with_timezone(&Utc);

        let producer = ReportProducer {
            name: PRODUCER_NAME.to_string(),
            version: PULSE_VERSION.to_string(),
            instance_id: self.instance_id.clone(),
        };

        let provenance = ReportProvenance {
            user_id: user_id.to_string(),
            window_start_utc: now_utc - Duration::days(ANALYSIS_WINDOW_DAYS),
            window_end_utc: now_utc,
            utc_offset_minutes: now.offset().local_minus_utc() / 60,
            computed_at_utc: now_utc,
        };

        let quality = ReportQuality {
            events_considered: inputs.events,
            flags: quality_flags(&inputs),
        };

        InsightReport {
            report_version: REPORT_VERSION.to_string(),
            producer,
            provenance,
            quality,
            engagement: inputs.engagement,
            consistency: inputs.consistency,
            mood: inputs.mood,
            quiz: inputs.quiz,
            insights,
        }
    }

    /// Encode to JSON string
    pub fn encode_to_json(
        &self,
        user_id: &str,
        now: DateTime<FixedOffset>,
        inputs: InsightInputs,
        insights: Vec<Insight>,
    ) -> Result<String> {
        let report = self.encode(user_id, now, inputs, insights);
        serde_json::to_string_pretty(&report).map_err(InsightError::JsonError)
    }
}

fn quality_flags(inputs: &InsightInputs) -> Vec<String> {
    let mut flags = Vec::new();
    if inputs.engagement.total_sessions == 0 {
        flags.push("no_sessions".to_string());
    }
    if inputs.consistency.active_days == 0 {
        flags.push("no_quiz_activity".to_string());
    }
    if inputs.mood.entries == 0 {
        flags.push("no_mood_data".to_string());
    }
    flags
}
