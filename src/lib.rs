//! Study Pulse - On-device behavioral telemetry and insight engine for learning apps
//!
//! Pulse turns a learner's raw activity (page views, sessions, quizzes, mood
//! check-ins) into engagement metrics and prioritized insights through a
//! deterministic pipeline: event capture → windowed pattern analysis → mood
//! analytics → rule-based insights → report encoding.
//!
//! ## Modules
//!
//! - **Capture**: [`store`] keeps the per-user event log, [`session`] brackets
//!   study sessions from platform lifecycle signals
//! - **Analysis**: [`patterns`] and [`mood`] derive metrics, [`insights`] turns
//!   them into insights
//! - **Orchestration**: [`processor`] ties it together, [`report`] encodes output

pub mod config;
pub mod error;
pub mod insights;
pub mod logging;
pub mod mood;
pub mod patterns;
pub mod processor;
pub mod report;
pub mod session;
pub mod store;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::PulseConfig;
pub use error::{InsightError, StoreError};
pub use insights::{InsightEngine, InsightNotifier, LogNotifier, NoopNotifier};
pub use mood::MoodAnalyzer;
pub use patterns::PatternAnalyzer;
pub use processor::{events_to_report, InsightProcessor};
pub use report::{InsightReport, ReportEncoder};
pub use session::{SessionSignal, SessionTracker};

/// Library version embedded in every report
pub const PULSE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "study-pulse";
