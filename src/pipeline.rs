//! One-shot analysis run: reconstruct, scope, then fan out to every analyzer.

use crate::bottleneck::{identify_bottlenecks, BottleneckReport};
use crate::config::AnalysisConfig;
use crate::detect::{detect_anomalies, utilization_by_resource, AnomalyReport, UtilizationResult};
use crate::events::RawEvent;
use crate::failures::{categorize_failures, FailureReport};
use crate::reconstruct::{reconstruct, Reconstruction};
use crate::temporal::{analyze_temporal, TemporalPatterns};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Everything one run produces. Plain data, safe to serialize or persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub event_count: usize,
    pub reconstruction: Reconstruction,
    pub anomalies: AnomalyReport,
    pub utilization: Vec<UtilizationResult>,
    pub temporal: TemporalPatterns,
    pub bottlenecks: BottleneckReport,
    pub failures: FailureReport,
}

/// Reconstruct and apply the configured scope. Anomaly flags are set.
pub fn prepare(events: &[RawEvent], cfg: &AnalysisConfig) -> (Reconstruction, AnomalyReport) {
    let mut reconstruction = cfg.scope.apply_to_reconstruction(reconstruct(events));
    let anomalies = detect_anomalies(&mut reconstruction.activities, &cfg.anomaly);
    reconstruction.refresh_case_counts();
    (reconstruction, anomalies)
}

/// Run the full pipeline over a fixed event snapshot.
pub fn analyze(events: &[RawEvent], cfg: &AnalysisConfig) -> AnalysisReport {
    let run_id = Uuid::new_v4();
    info!(%run_id, events = events.len(), "starting analysis run");

    let (reconstruction, anomalies) = prepare(events, cfg);
    let activities = &reconstruction.activities;

    let utilization = utilization_by_resource(activities, &cfg.utilization);
    let temporal = analyze_temporal(activities);
    let bottlenecks = identify_bottlenecks(activities, &cfg.bottleneck);
    let failures = categorize_failures(activities, &cfg.failures);

    info!(
        %run_id,
        activities = activities.len(),
        cases = reconstruction.cases.len(),
        anomalies = anomalies.anomalous,
        bottlenecks = bottlenecks.wait.len(),
        failures = failures.total_failures,
        "analysis run complete"
    );

    AnalysisReport {
        run_id,
        generated_at: Utc::now(),
        event_count: events.len(),
        reconstruction,
        anomalies,
        utilization,
        temporal,
        bottlenecks,
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Outcome, Transition};
    use crate::reconstruct::ActivityStatus;
    use crate::scope::ScopeFilter;
    use chrono::TimeZone;

    fn event(case: &str, act: &str, t: Transition, secs: i64, outcome: Option<Outcome>) -> RawEvent {
        RawEvent {
            case_id: case.into(),
            activity: act.into(),
            resource: Some(format!("/st/{act}")),
            transition: t,
            outcome,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + chrono::Duration::seconds(secs),
            instance: None,
            planned_duration: None,
            service_duration: None,
            failure_description: None,
        }
    }

    fn small_log() -> Vec<RawEvent> {
        let mut events = Vec::new();
        for (i, case) in ["c1", "c2", "c3"].iter().enumerate() {
            let base = i as i64 * 1000;
            events.push(event(case, "a", Transition::Start, base, None));
            let outcome = if *case == "c2" { Outcome::Failure } else { Outcome::Success };
            events.push(event(case, "a", Transition::Complete, base + 30, Some(outcome)));
        }
        events
    }

    #[test]
    fn test_analyze_small_log() {
        let report = analyze(&small_log(), &AnalysisConfig::default());
        assert_eq!(report.event_count, 6);
        assert_eq!(report.reconstruction.activities.len(), 3);
        assert_eq!(report.reconstruction.cases.len(), 3);
        // Three samples are below the comparison minimum.
        assert_eq!(report.anomalies.insufficient_data, 3);
        assert_eq!(report.failures.total_failures, 1);
        assert_eq!(report.temporal.total_failures(), 1);
        assert_eq!(report.bottlenecks.processing.len(), 1);
        assert!(serde_json::to_string(&report).is_ok());
    }

    #[test]
    fn test_scope_filter_applies() {
        let mut cfg = AnalysisConfig::default();
        cfg.scope = ScopeFilter {
            status_in: Some(vec![ActivityStatus::Failed]),
            ..Default::default()
        };
        let report = analyze(&small_log(), &cfg);
        assert_eq!(report.reconstruction.activities.len(), 1);
        assert_eq!(report.reconstruction.cases.len(), 1);
        assert_eq!(report.reconstruction.cases[0].case_id, "c2");
    }
}
