use crate::config::AnomalyConfig;
use crate::detect::stats::Samples;
use crate::detect::{deviation_percent, AnomalyResult, CheckStatus, DetectError, Direction, Threshold};
use crate::reconstruct::{Activity, ActivityKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// IQR bounds and moments of one (activity, resource) population.
#[derive(Debug, Clone)]
pub struct ActivityBaseline {
    pub q1: f64,
    pub q3: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub sample_count: usize,
    samples: Samples,
    min_samples: usize,
}

impl ActivityBaseline {
    /// Build bounds from positive durations. Non-positive or unknown durations
    /// are not comparison samples.
    pub fn from_durations(
        durations: impl IntoIterator<Item = f64>,
        cfg: &AnomalyConfig,
    ) -> Result<Self, DetectError> {
        let samples = Samples::new(durations.into_iter().filter(|d| *d > 0.0).collect());
        if samples.len() < cfg.min_comparison_samples {
            return Err(DetectError::InsufficientBaseline {
                needed: cfg.min_comparison_samples,
                have: samples.len(),
            });
        }
        let (q1, q3) = samples.quartiles().ok_or(DetectError::InsufficientBaseline {
            needed: cfg.min_comparison_samples,
            have: 0,
        })?;
        let iqr = q3 - q1;
        Ok(Self {
            q1,
            q3,
            lower_bound: q1 - cfg.iqr_multiplier * iqr,
            upper_bound: q3 + cfg.iqr_multiplier * iqr,
            mean: samples.mean(),
            std_dev: samples.std_dev(),
            sample_count: samples.len(),
            samples,
            min_samples: cfg.min_comparison_samples,
        })
    }

    /// Judge one duration against the bounds.
    pub fn evaluate(&self, duration: Option<f64>) -> AnomalyResult {
        let Some(actual) = duration.filter(|d| *d > 0.0) else {
            return AnomalyResult::no_duration();
        };

        let direction = if actual > self.upper_bound {
            Direction::Above
        } else if actual < self.lower_bound {
            Direction::Below
        } else {
            return AnomalyResult {
                status: CheckStatus::Normal,
                is_anomaly: false,
                score: 0.0,
                reason: format!(
                    "duration {:.1}s within expected range [{:.1}s, {:.1}s]",
                    actual, self.lower_bound, self.upper_bound
                ),
                threshold: None,
            };
        };

        let z = match self.samples.z_score(actual, self.min_samples) {
            Ok(z) => z,
            Err(DetectError::InsufficientBaseline { needed, have }) => {
                return AnomalyResult::insufficient_data(needed, have);
            }
        };
        let deviation = deviation_percent(actual, self.mean);
        let reason = match direction {
            Direction::Above => format!(
                "duration {:.1}s is {:.1}% above the expected {:.1}s (upper bound {:.1}s, z={:.2})",
                actual,
                deviation.abs(),
                self.mean,
                self.upper_bound,
                z
            ),
            Direction::Below => format!(
                "duration {:.1}s is {:.1}% below the expected {:.1}s (lower bound {:.1}s, z={:.2})",
                actual,
                deviation.abs(),
                self.mean,
                self.lower_bound,
                z
            ),
        };

        AnomalyResult {
            status: CheckStatus::Anomalous,
            is_anomaly: true,
            score: z.abs(),
            reason,
            threshold: Some(Threshold {
                expected: self.mean,
                actual,
                deviation_percent: deviation,
                direction,
                lower_bound: self.lower_bound,
                upper_bound: self.upper_bound,
            }),
        }
    }
}

/// Check one activity against a comparison population.
///
/// Population entries for a different activity name or resource are ignored.
pub fn check_activity(subject: &Activity, population: &[Activity], cfg: &AnomalyConfig) -> AnomalyResult {
    let peers = population
        .iter()
        .filter(|a| a.activity == subject.activity && a.resource == subject.resource)
        .filter_map(Activity::positive_duration);
    match ActivityBaseline::from_durations(peers, cfg) {
        Ok(baseline) => baseline.evaluate(subject.actual_duration_seconds),
        Err(DetectError::InsufficientBaseline { needed, have }) => {
            AnomalyResult::insufficient_data(needed, have)
        }
    }
}

/// A flagged activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityFinding {
    pub key: ActivityKey,
    pub resource: String,
    pub result: AnomalyResult,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub checked: usize,
    pub anomalous: usize,
    pub insufficient_data: usize,
    pub no_duration: usize,
    /// Anomalous activities, highest score first.
    pub findings: Vec<ActivityFinding>,
}

/// Flag outliers across an activity set, grouping peers by (activity, resource).
///
/// Sets `is_anomaly`/`anomaly_score` on every activity; non-anomalous ones are
/// reset to false/0.
pub fn detect_anomalies(activities: &mut [Activity], cfg: &AnomalyConfig) -> AnomalyReport {
    let mut groups: BTreeMap<(String, String), Vec<usize>> = BTreeMap::new();
    for (i, a) in activities.iter().enumerate() {
        groups
            .entry((a.activity.clone(), a.resource.clone()))
            .or_default()
            .push(i);
    }

    let mut report = AnomalyReport::default();
    for ((activity, resource), members) in groups {
        let baseline = ActivityBaseline::from_durations(
            members.iter().filter_map(|&i| activities[i].positive_duration()),
            cfg,
        );
        if let Ok(b) = &baseline {
            debug!(%activity, %resource, q1 = b.q1, q3 = b.q3, samples = b.sample_count, "activity baseline");
        }

        for i in members {
            let result = match &baseline {
                Ok(b) => b.evaluate(activities[i].actual_duration_seconds),
                Err(DetectError::InsufficientBaseline { needed, have }) => {
                    AnomalyResult::insufficient_data(*needed, *have)
                }
            };
            report.checked += 1;
            match result.status {
                CheckStatus::Anomalous => report.anomalous += 1,
                CheckStatus::InsufficientData => report.insufficient_data += 1,
                CheckStatus::NoDuration => report.no_duration += 1,
                CheckStatus::Normal => {}
            }

            let a = &mut activities[i];
            a.is_anomaly = result.is_anomaly;
            a.anomaly_score = result.score;
            if result.is_anomaly {
                report.findings.push(ActivityFinding {
                    key: a.key(),
                    resource: a.resource.clone(),
                    result,
                });
            }
        }
    }

    report.findings.sort_by(|x, y| {
        y.result
            .score
            .total_cmp(&x.result.score)
            .then_with(|| x.key.cmp(&y.key))
    });
    info!(
        checked = report.checked,
        anomalous = report.anomalous,
        insufficient = report.insufficient_data,
        "anomaly detection complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconstruct::{ActivityStatus, Discriminator};

    fn activity(case: &str, duration: Option<f64>) -> Activity {
        Activity {
            case_id: case.into(),
            activity: "punch".into(),
            instance: Discriminator::Derived(0),
            resource: "/pm/punch_gill".into(),
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            planned_duration_seconds: None,
            actual_duration_seconds: duration,
            status: ActivityStatus::Success,
            failure_description: None,
            is_anomaly: false,
            anomaly_score: 0.0,
        }
    }

    fn population() -> Vec<Activity> {
        let mut pop: Vec<Activity> = (0..20)
            .map(|i| activity(&format!("c{i}"), Some(10.0 + i as f64 * 10.0 / 19.0)))
            .collect();
        pop.push(activity("outlier", Some(1000.0)));
        pop
    }

    #[test]
    fn test_iqr_flags_only_outlier() {
        let cfg = AnomalyConfig::default();
        let pop = population();
        for a in &pop[..20] {
            let r = check_activity(a, &pop, &cfg);
            assert_eq!(r.status, CheckStatus::Normal, "{}", r.reason);
        }
        let r = check_activity(&pop[20], &pop, &cfg);
        assert!(r.is_anomaly);
        assert!(r.score > 3.0);
        assert!(r.reason.contains("above"));
        let t = r.threshold.unwrap();
        assert_eq!(t.direction, Direction::Above);
        assert_eq!(t.actual, 1000.0);
    }

    #[test]
    fn test_score_is_population_z_score() {
        let cfg = AnomalyConfig::default();
        let durations: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).chain([400.0]).collect();
        let baseline = ActivityBaseline::from_durations(durations.clone(), &cfg).unwrap();
        let r = baseline.evaluate(Some(400.0));
        assert!(r.is_anomaly);
        let expected = Samples::new(durations).z_score(400.0, 1).unwrap();
        assert!((r.score - expected).abs() < 1e-12);
        assert!(r.reason.contains(&format!("z={expected:.2}")));
    }

    #[test]
    fn test_low_outlier_reports_below() {
        let cfg = AnomalyConfig::default();
        let mut pop: Vec<Activity> = (0..10).map(|i| activity(&format!("c{i}"), Some(100.0 + i as f64))).collect();
        pop.push(activity("fast", Some(1.0)));
        let r = check_activity(&pop[10], &pop, &cfg);
        assert!(r.is_anomaly);
        assert!(r.reason.contains("below"));
        assert!(r.threshold.unwrap().deviation_percent < 0.0);
    }

    #[test]
    fn test_insufficient_data() {
        let cfg = AnomalyConfig::default();
        let mut pop: Vec<Activity> = (0..4).map(|i| activity(&format!("c{i}"), Some(10.0))).collect();
        // Zero and unknown durations are not comparison samples.
        pop.push(activity("zero", Some(0.0)));
        pop.push(activity("none", None));
        let r = check_activity(&pop[0], &pop, &cfg);
        assert_eq!(r.status, CheckStatus::InsufficientData);
        assert!(!r.is_anomaly);
        assert!(r.reason.contains("need 5"));
    }

    #[test]
    fn test_other_resources_are_not_peers() {
        let cfg = AnomalyConfig::default();
        let mut pop = population();
        for a in pop.iter_mut().take(18) {
            a.resource = "/pm/other".into();
        }
        let r = check_activity(&pop[20], &pop, &cfg);
        assert_eq!(r.status, CheckStatus::InsufficientData);
    }

    #[test]
    fn test_detect_anomalies_annotates_in_place() {
        let cfg = AnomalyConfig::default();
        let mut acts = population();
        acts.push(activity("unknown", None));
        let report = detect_anomalies(&mut acts, &cfg);
        assert_eq!(report.checked, 22);
        assert_eq!(report.anomalous, 1);
        assert_eq!(report.no_duration, 1);
        assert_eq!(report.findings[0].key.case_id, "outlier");
        assert!(acts[20].is_anomaly);
        assert!(acts[20].anomaly_score > 0.0);
        assert!(acts[..20].iter().all(|a| !a.is_anomaly && a.anomaly_score == 0.0));
    }
}
