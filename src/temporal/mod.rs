//! Temporal aggregation of failures and anomalies.

use crate::reconstruct::Activity;
use chrono::{NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Failure and anomaly histograms built in one pass over an activity set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporalPatterns {
    /// Failed activities per UTC hour of day.
    pub failures_by_hour: [u32; 24],
    pub failures_by_day: BTreeMap<NaiveDate, u32>,
    pub failures_by_resource: BTreeMap<String, u32>,
    pub anomalies_by_day: BTreeMap<NaiveDate, u32>,
    /// Failed or anomalous activities with no timestamp at all.
    pub undated: u32,
}

impl TemporalPatterns {
    pub fn total_failures(&self) -> u32 {
        self.failures_by_resource.values().sum()
    }

    /// Hour with the most failures; earliest hour wins ties.
    pub fn peak_failure_hour(&self) -> Option<(u32, u32)> {
        self.failures_by_hour
            .iter()
            .enumerate()
            .filter(|(_, n)| **n > 0)
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(h, &n)| (h as u32, n))
    }

    /// Resource with the most failures; lexicographically first wins ties.
    pub fn top_failure_resource(&self) -> Option<(&str, u32)> {
        self.failures_by_resource
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(r, &n)| (r.as_str(), n))
    }
}

/// Bucket failed activities by hour, day and resource, and anomalous
/// activities by day. Activities are dated by their latest lifecycle timestamp.
pub fn analyze_temporal(activities: &[Activity]) -> TemporalPatterns {
    let mut p = TemporalPatterns::default();
    for a in activities {
        if !a.is_failed() && !a.is_anomaly {
            continue;
        }
        let when = a.reference_time();
        if when.is_none() {
            p.undated += 1;
        }
        if a.is_failed() {
            *p.failures_by_resource.entry(a.resource.clone()).or_default() += 1;
            if let Some(t) = when {
                p.failures_by_hour[t.hour() as usize] += 1;
                *p.failures_by_day.entry(t.date_naive()).or_default() += 1;
            }
        }
        if a.is_anomaly {
            if let Some(t) = when {
                *p.anomalies_by_day.entry(t.date_naive()).or_default() += 1;
            }
        }
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconstruct::{ActivityStatus, Discriminator};
    use chrono::{TimeZone, Utc};

    fn activity(resource: &str, status: ActivityStatus, anomaly: bool, day: u32, hour: u32) -> Activity {
        Activity {
            case_id: format!("c{day}{hour}"),
            activity: "a".into(),
            instance: Discriminator::Derived(0),
            resource: resource.into(),
            scheduled_at: None,
            started_at: None,
            completed_at: Some(Utc.with_ymd_and_hms(2024, 3, day, hour, 30, 0).unwrap()),
            planned_duration_seconds: None,
            actual_duration_seconds: None,
            status,
            failure_description: None,
            is_anomaly: anomaly,
            anomaly_score: 0.0,
        }
    }

    #[test]
    fn test_buckets() {
        let acts = vec![
            activity("/pm/punch", ActivityStatus::Failed, false, 1, 10),
            activity("/pm/punch", ActivityStatus::Failed, true, 1, 10),
            activity("/ov/oven", ActivityStatus::Failed, false, 2, 14),
            activity("/ov/oven", ActivityStatus::Success, true, 2, 9),
            activity("/ov/oven", ActivityStatus::Success, false, 3, 9),
        ];
        let p = analyze_temporal(&acts);
        assert_eq!(p.failures_by_hour[10], 2);
        assert_eq!(p.failures_by_hour[14], 1);
        assert_eq!(p.failures_by_hour.iter().sum::<u32>(), 3);
        assert_eq!(p.total_failures(), 3);
        let d1 = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert_eq!(p.failures_by_day[&d1], 2);
        assert_eq!(p.anomalies_by_day[&d1], 1);
        assert_eq!(p.anomalies_by_day[&d2], 1);
        assert_eq!(p.failures_by_resource["/pm/punch"], 2);
        assert_eq!(p.peak_failure_hour(), Some((10, 2)));
        assert_eq!(p.top_failure_resource(), Some(("/pm/punch", 2)));
    }

    #[test]
    fn test_undated_failure_still_counted_by_resource() {
        let mut a = activity("/pm/punch", ActivityStatus::Failed, false, 1, 1);
        a.completed_at = None;
        let p = analyze_temporal(&[a]);
        assert_eq!(p.undated, 1);
        assert_eq!(p.failures_by_resource["/pm/punch"], 1);
        assert!(p.failures_by_day.is_empty());
        assert_eq!(p.peak_failure_hour(), None);
    }
}
