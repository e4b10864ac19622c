//! Equipment utilization: recent per-resource average duration versus baseline.

use crate::config::UtilizationConfig;
use crate::detect::stats::Samples;
use crate::detect::CheckStatus;
use crate::reconstruct::Activity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Absorbs float error so a ratio of exactly 1.2 trips a 0.2 threshold.
const RATIO_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationResult {
    pub resource: String,
    pub status: CheckStatus,
    pub is_anomaly: bool,
    /// recent average / baseline average.
    pub performance_ratio: Option<f64>,
    /// baseline average / recent average, as a percentage.
    pub efficiency_percent: Option<f64>,
    pub recent_average_seconds: Option<f64>,
    pub baseline_average_seconds: Option<f64>,
    pub recent_samples: usize,
    pub baseline_samples: usize,
    pub reason: String,
}

fn durations_for(resource: &str, activities: &[&Activity]) -> Samples {
    Samples::new(
        activities
            .iter()
            .filter(|a| a.resource == resource)
            .filter_map(|a| a.positive_duration())
            .collect(),
    )
}

/// Compare a resource's recent average duration against its baseline.
///
/// Both sets are restricted to `resource` and to positive durations.
pub fn check_utilization(
    resource: &str,
    recent: &[&Activity],
    baseline: &[&Activity],
    cfg: &UtilizationConfig,
) -> UtilizationResult {
    let recent = durations_for(resource, recent);
    let baseline = durations_for(resource, baseline);

    let mut result = UtilizationResult {
        resource: resource.to_string(),
        status: CheckStatus::InsufficientData,
        is_anomaly: false,
        performance_ratio: None,
        efficiency_percent: None,
        recent_average_seconds: None,
        baseline_average_seconds: None,
        recent_samples: recent.len(),
        baseline_samples: baseline.len(),
        reason: String::new(),
    };

    if recent.len() < cfg.min_recent_samples || baseline.len() < cfg.min_baseline_samples {
        result.reason = format!(
            "insufficient data: need {} recent and {} baseline samples, have {} and {}",
            cfg.min_recent_samples,
            cfg.min_baseline_samples,
            recent.len(),
            baseline.len()
        );
        return result;
    }

    let recent_avg = recent.mean();
    let baseline_avg = baseline.mean();
    result.recent_average_seconds = Some(recent_avg);
    result.baseline_average_seconds = Some(baseline_avg);

    let ratio = recent_avg / baseline_avg;
    let efficiency = baseline_avg / recent_avg * 100.0;
    result.performance_ratio = Some(ratio);
    result.efficiency_percent = Some(efficiency);

    let deviation = (ratio - 1.0).abs();
    if deviation + RATIO_TOLERANCE >= cfg.deviation_threshold {
        result.status = CheckStatus::Anomalous;
        result.is_anomaly = true;
        let pace = if ratio > 1.0 { "slower" } else { "faster" };
        result.reason = format!(
            "{} is running {:.1}% {} than baseline ({:.1}s vs {:.1}s), operating at {:.1}% efficiency",
            resource,
            deviation * 100.0,
            pace,
            recent_avg,
            baseline_avg,
            efficiency
        );
    } else {
        result.status = CheckStatus::Normal;
        result.reason = format!(
            "{} within tolerance: ratio {:.2}, {:.1}% efficiency",
            resource, ratio, efficiency
        );
    }
    result
}

/// Run the utilization check for every resource.
///
/// The recent window is the last `recent_window_hours` before the latest
/// activity timestamp in the set; everything earlier is baseline. A window
/// reaching past the representable time range covers every activity.
pub fn utilization_by_resource(activities: &[Activity], cfg: &UtilizationConfig) -> Vec<UtilizationResult> {
    let Some(latest) = activities.iter().filter_map(Activity::reference_time).max() else {
        return Vec::new();
    };
    let cutoff = chrono::TimeDelta::try_hours(cfg.recent_window_hours)
        .and_then(|window| latest.checked_sub_signed(window));

    let mut by_resource: BTreeMap<&str, (Vec<&Activity>, Vec<&Activity>)> = BTreeMap::new();
    for a in activities {
        let Some(t) = a.reference_time() else { continue };
        let entry = by_resource.entry(a.resource.as_str()).or_default();
        if cutoff.map_or(true, |c| t >= c) {
            entry.0.push(a);
        } else {
            entry.1.push(a);
        }
    }

    by_resource
        .into_iter()
        .map(|(resource, (recent, baseline))| {
            let r = check_utilization(resource, &recent, &baseline, cfg);
            debug!(%resource, status = ?r.status, ratio = ?r.performance_ratio, "utilization check");
            r
        })
        .collect()
}
