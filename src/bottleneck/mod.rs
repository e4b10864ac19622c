//! Bottleneck identification per resource.
//!
//! Two views are produced and kept separate: queuing (the gap between one
//! activity completing on a resource and the next one starting there) and
//! processing time (mean actual duration on the resource).

use crate::config::BottleneckConfig;
use crate::reconstruct::Activity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// Tier a mean time in seconds; both bounds are inclusive.
pub fn classify(seconds: f64, high: f64, medium: f64) -> Severity {
    if seconds >= high {
        Severity::High
    } else if seconds >= medium {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// A resource whose mean queuing time exceeds the wait threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    pub resource: String,
    /// Most frequent activity on the resource.
    pub activity: String,
    pub average_wait_seconds: f64,
    pub max_wait_seconds: f64,
    pub wait_samples: usize,
    pub estimated_queue_length: u32,
    pub severity: Severity,
}

/// Mean processing time on one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingProfile {
    pub resource: String,
    pub activity: String,
    pub average_processing_seconds: f64,
    pub max_processing_seconds: f64,
    pub samples: usize,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BottleneckReport {
    /// Sorted by mean wait, longest first.
    pub wait: Vec<Bottleneck>,
    /// Sorted by mean processing time, longest first.
    pub processing: Vec<ProcessingProfile>,
}

fn by_resource(activities: &[Activity]) -> BTreeMap<&str, Vec<&Activity>> {
    let mut map: BTreeMap<&str, Vec<&Activity>> = BTreeMap::new();
    for a in activities {
        map.entry(a.resource.as_str()).or_default().push(a);
    }
    map
}

/// Most frequent activity name; lexicographically first on ties.
fn representative_activity(acts: &[&Activity]) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for a in acts {
        *counts.entry(a.activity.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
        .map(|(name, _)| name.to_string())
        .unwrap_or_default()
}

/// Positive gaps between consecutive activities on one resource.
///
/// Activities need both a start and a completion; they are ordered by
/// scheduled time, falling back to start time.
pub fn wait_times(acts: &[&Activity]) -> Vec<f64> {
    let mut timed: Vec<&Activity> = acts
        .iter()
        .copied()
        .filter(|a| a.started_at.is_some() && a.completed_at.is_some())
        .collect();
    timed.sort_by(|a, b| {
        a.scheduled_at
            .or(a.started_at)
            .cmp(&b.scheduled_at.or(b.started_at))
            .then(a.started_at.cmp(&b.started_at))
            .then_with(|| a.key().cmp(&b.key()))
    });

    timed
        .windows(2)
        .filter_map(|pair| {
            let prev_done = pair[0].completed_at?;
            let next_start = pair[1].started_at?;
            let wait = (next_start - prev_done).num_milliseconds() as f64 / 1000.0;
            (wait > 0.0).then_some(wait)
        })
        .collect()
}

/// Resources whose mean wait time exceeds `wait_threshold_seconds`.
pub fn wait_time_bottlenecks(activities: &[Activity], cfg: &BottleneckConfig) -> Vec<Bottleneck> {
    let mut out: Vec<Bottleneck> = by_resource(activities)
        .into_iter()
        .filter_map(|(resource, acts)| {
            let waits = wait_times(&acts);
            if waits.is_empty() {
                return None;
            }
            let mean = waits.iter().sum::<f64>() / waits.len() as f64;
            if mean <= cfg.wait_threshold_seconds {
                return None;
            }
            Some(Bottleneck {
                resource: resource.to_string(),
                activity: representative_activity(&acts),
                average_wait_seconds: mean,
                max_wait_seconds: waits.iter().copied().fold(0.0, f64::max),
                wait_samples: waits.len(),
                estimated_queue_length: (mean / 60.0).ceil() as u32,
                severity: classify(
                    mean,
                    cfg.high_severity_threshold_seconds,
                    cfg.medium_severity_threshold_seconds,
                ),
            })
        })
        .collect();
    out.sort_by(|a, b| {
        b.average_wait_seconds
            .total_cmp(&a.average_wait_seconds)
            .then_with(|| a.resource.cmp(&b.resource))
    });
    out
}

/// Mean processing time for every resource with at least one positive duration.
pub fn processing_time_profiles(activities: &[Activity], cfg: &BottleneckConfig) -> Vec<ProcessingProfile> {
    let mut out: Vec<ProcessingProfile> = by_resource(activities)
        .into_iter()
        .filter_map(|(resource, acts)| {
            let durations: Vec<f64> = acts.iter().filter_map(|a| a.positive_duration()).collect();
            if durations.is_empty() {
                return None;
            }
            let mean = durations.iter().sum::<f64>() / durations.len() as f64;
            Some(ProcessingProfile {
                resource: resource.to_string(),
                activity: representative_activity(&acts),
                average_processing_seconds: mean,
                max_processing_seconds: durations.iter().copied().fold(0.0, f64::max),
                samples: durations.len(),
                severity: classify(
                    mean,
                    cfg.processing_high_threshold_seconds,
                    cfg.processing_medium_threshold_seconds,
                ),
            })
        })
        .collect();
    out.sort_by(|a, b| {
        b.average_processing_seconds
            .total_cmp(&a.average_processing_seconds)
            .then_with(|| a.resource.cmp(&b.resource))
    });
    out
}

pub fn identify_bottlenecks(activities: &[Activity], cfg: &BottleneckConfig) -> BottleneckReport {
    let report = BottleneckReport {
        wait: wait_time_bottlenecks(activities, cfg),
        processing: processing_time_profiles(activities, cfg),
    };
    info!(
        wait_bottlenecks = report.wait.len(),
        profiled_resources = report.processing.len(),
        "bottleneck identification complete"
    );
    report
}
