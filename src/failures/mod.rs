//! Failure cause categorization.
//!
//! Failure descriptions are mapped onto a fixed taxonomy by the ordered rules
//! in [`rules`]. When no failure in the set carries a description, failures
//! are grouped by (activity, resource) instead and labelled as symptoms, so
//! callers can tell a known root cause from a mere location.

pub mod rules;

use crate::config::FailureConfig;
use crate::events::{Outcome, RawEvent, Transition};
use crate::reconstruct::{Activity, UNKNOWN_RESOURCE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

pub use rules::classify;

/// Which flavour of unsatisfied operational condition was reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionScope {
    Warehouse,
    Tag,
    General,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FailureCategory {
    InventoryMissingWorkpiece,
    NetworkConnectionRefused,
    SensorLightBarrierMissingDetection,
    SensorLightBarrierFalseDetection,
    IdentificationTagReadFailure,
    EquipmentNotReady,
    InvalidParameterValue,
    OperationTimeout,
    UnsatisfiedCondition { scope: ConditionScope },
    /// No rule matched; keyed by a prefix of the raw text.
    Unclassified { prefix: String },
    /// No description available; keyed by where the failure happened.
    Symptom { activity: String, resource: String },
}

/// How much a category says about the cause of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Evidence {
    RootCause,
    Unclassified,
    Symptom,
}

impl FailureCategory {
    pub fn label(&self) -> String {
        match self {
            FailureCategory::InventoryMissingWorkpiece => "inventory-missing-workpiece".into(),
            FailureCategory::NetworkConnectionRefused => "network-connection-refused".into(),
            FailureCategory::SensorLightBarrierMissingDetection => {
                "sensor-light-barrier-missing-detection".into()
            }
            FailureCategory::SensorLightBarrierFalseDetection => {
                "sensor-light-barrier-false-detection".into()
            }
            FailureCategory::IdentificationTagReadFailure => "identification-tag-read-failure".into(),
            FailureCategory::EquipmentNotReady => "equipment-not-ready".into(),
            FailureCategory::InvalidParameterValue => "invalid-parameter-value".into(),
            FailureCategory::OperationTimeout => "operation-timeout".into(),
            FailureCategory::UnsatisfiedCondition { scope } => match scope {
                ConditionScope::General => "unsatisfied-operational-condition".into(),
                ConditionScope::Warehouse => "unsatisfied-operational-condition/warehouse".into(),
                ConditionScope::Tag => "unsatisfied-operational-condition/tag".into(),
            },
            FailureCategory::Unclassified { prefix } => format!("unclassified: {prefix}"),
            FailureCategory::Symptom { activity, resource } => {
                format!("symptom: {activity} @ {resource}")
            }
        }
    }

    pub fn evidence(&self) -> Evidence {
        match self {
            FailureCategory::Unclassified { .. } => Evidence::Unclassified,
            FailureCategory::Symptom { .. } => Evidence::Symptom,
            _ => Evidence::RootCause,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CategorizationMode {
    /// Categories come from failure descriptions.
    RootCause,
    /// No descriptions anywhere; grouped by (activity, resource).
    Symptom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailurePattern {
    pub category: FailureCategory,
    pub label: String,
    pub evidence: Evidence,
    pub count: usize,
    pub percentage: f64,
    pub affected_cases: Vec<String>,
    pub affected_resources: Vec<String>,
    pub example_cases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub mode: CategorizationMode,
    /// Failures counted across `patterns`; the pattern counts sum to this.
    pub total_failures: usize,
    /// Failures left out in root-cause mode because they had no description.
    pub undescribed_failures: usize,
    /// Sorted by count, largest first.
    pub patterns: Vec<FailurePattern>,
}

/// One failed execution, whatever it was read from.
struct FailureRecord<'a> {
    case_id: &'a str,
    activity: &'a str,
    resource: &'a str,
    description: Option<&'a str>,
}

#[derive(Default)]
struct Bucket<'a> {
    count: usize,
    cases: BTreeSet<&'a str>,
    resources: BTreeSet<&'a str>,
    examples: Vec<&'a str>,
}

/// Categorize every failed activity.
pub fn categorize_failures(activities: &[Activity], cfg: &FailureConfig) -> FailureReport {
    let records = activities.iter().filter(|a| a.is_failed()).map(|a| FailureRecord {
        case_id: &a.case_id,
        activity: &a.activity,
        resource: &a.resource,
        description: a.failure_description.as_deref(),
    });
    categorize(records.collect(), cfg)
}

/// Categorize failed `complete` events directly, without reconstruction.
pub fn categorize_failed_events(events: &[RawEvent], cfg: &FailureConfig) -> FailureReport {
    let records = events
        .iter()
        .filter(|e| e.transition == Transition::Complete && e.outcome == Some(Outcome::Failure))
        .map(|e| FailureRecord {
            case_id: &e.case_id,
            activity: &e.activity,
            resource: e.resource.as_deref().unwrap_or(UNKNOWN_RESOURCE),
            description: e.failure_description.as_deref(),
        });
    categorize(records.collect(), cfg)
}

fn categorize(records: Vec<FailureRecord<'_>>, cfg: &FailureConfig) -> FailureReport {
    let described = records.iter().filter(|r| r.description.is_some()).count();
    let mode = if described > 0 {
        CategorizationMode::RootCause
    } else {
        CategorizationMode::Symptom
    };

    let mut buckets: BTreeMap<FailureCategory, Bucket<'_>> = BTreeMap::new();
    let mut total = 0usize;
    for r in &records {
        let category = match (mode, r.description) {
            (CategorizationMode::RootCause, Some(text)) => {
                rules::classify(text, cfg.unclassified_prefix_chars)
            }
            (CategorizationMode::RootCause, None) => continue,
            (CategorizationMode::Symptom, _) => FailureCategory::Symptom {
                activity: r.activity.to_string(),
                resource: r.resource.to_string(),
            },
        };
        total += 1;
        let b = buckets.entry(category).or_default();
        b.count += 1;
        b.cases.insert(r.case_id);
        b.resources.insert(r.resource);
        if b.examples.len() < cfg.max_examples_per_pattern && !b.examples.contains(&r.case_id) {
            b.examples.push(r.case_id);
        }
    }

    let mut patterns: Vec<FailurePattern> = buckets
        .into_iter()
        .map(|(category, b)| FailurePattern {
            label: category.label(),
            evidence: category.evidence(),
            count: b.count,
            percentage: if total == 0 {
                0.0
            } else {
                b.count as f64 / total as f64 * 100.0
            },
            affected_cases: b.cases.into_iter().map(String::from).collect(),
            affected_resources: b.resources.into_iter().map(String::from).collect(),
            example_cases: b.examples.into_iter().map(String::from).collect(),
            category,
        })
        .collect();
    patterns.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));

    info!(
        mode = ?mode,
        failures = total,
        categories = patterns.len(),
        "failure categorization complete"
    );
    FailureReport {
        mode,
        total_failures: total,
        undescribed_failures: match mode {
            CategorizationMode::RootCause => records.len() - described,
            CategorizationMode::Symptom => 0,
        },
        patterns,
    }
}
