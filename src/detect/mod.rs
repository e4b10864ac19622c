//! Anomaly detection over reconstructed activities.
//!
//! Two checks live here: a per-activity IQR outlier test against peers that
//! share the activity name and resource, and a per-resource comparison of a
//! recent window against its historical baseline. Both report statistically
//! empty situations as data rather than errors.

pub mod activity;
pub mod stats;
pub mod utilization;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use activity::{check_activity, detect_anomalies, ActivityBaseline, ActivityFinding, AnomalyReport};
pub use utilization::{check_utilization, utilization_by_resource, UtilizationResult};

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("insufficient baseline data: need {needed} samples, have {have}")]
    InsufficientBaseline { needed: usize, have: usize },
}

/// Outcome of a single statistical check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckStatus {
    Normal,
    Anomalous,
    /// Too few comparison samples to judge.
    InsufficientData,
    /// The subject has no usable duration.
    NoDuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

/// What was expected versus what was observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub expected: f64,
    pub actual: f64,
    pub deviation_percent: f64,
    pub direction: Direction,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

/// Verdict for one activity against its comparison population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub status: CheckStatus,
    pub is_anomaly: bool,
    /// Absolute z-score when anomalous, otherwise 0.
    pub score: f64,
    pub reason: String,
    pub threshold: Option<Threshold>,
}

impl AnomalyResult {
    pub fn insufficient_data(needed: usize, have: usize) -> Self {
        Self {
            status: CheckStatus::InsufficientData,
            is_anomaly: false,
            score: 0.0,
            reason: format!("insufficient data: need {needed} comparison samples, have {have}"),
            threshold: None,
        }
    }

    pub fn no_duration() -> Self {
        Self {
            status: CheckStatus::NoDuration,
            is_anomaly: false,
            score: 0.0,
            reason: "duration unknown".to_string(),
            threshold: None,
        }
    }
}

/// Signed percentage deviation of `actual` from `expected`; 0 when expected is 0.
pub(crate) fn deviation_percent(actual: f64, expected: f64) -> f64 {
    if expected == 0.0 {
        0.0
    } else {
        (actual - expected) / expected * 100.0
    }
}
