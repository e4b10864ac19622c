//! Event reconstruction: merges lifecycle transitions into Activity and Case records.
//!
//! Events are walked in timestamp order. Each one is routed to an activity
//! instance identified by an [`ActivityKey`]; the instance accumulates its
//! scheduled/start/complete timestamps, outcome and durations. Cases are
//! finalized from the reconstructed activities, never from raw counters.

pub mod duration;

use crate::events::{Outcome, RawEvent, Transition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

pub use duration::parse_duration_seconds;

/// Resource assigned to an activity only when no event of the instance names one.
pub const UNKNOWN_RESOURCE: &str = "unknown-resource";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityStatus {
    InProgress,
    Success,
    Failed,
    /// Completed without a reported outcome.
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseStatus {
    InProgress,
    Success,
    Failed,
}

/// Distinguishes repeated executions of the same activity within one case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Discriminator {
    /// Sequence number supplied by the source.
    Sequence(u64),
    /// Ordinal derived from the order in which lifecycles open.
    Derived(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActivityKey {
    pub case_id: String,
    pub activity: String,
    pub instance: Discriminator,
}

/// One execution of an activity within a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub case_id: String,
    pub activity: String,
    pub instance: Discriminator,
    pub resource: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub planned_duration_seconds: Option<f64>,
    pub actual_duration_seconds: Option<f64>,
    pub status: ActivityStatus,
    pub failure_description: Option<String>,
    pub is_anomaly: bool,
    pub anomaly_score: f64,
}

impl Activity {
    pub fn key(&self) -> ActivityKey {
        ActivityKey {
            case_id: self.case_id.clone(),
            activity: self.activity.clone(),
            instance: self.instance,
        }
    }

    /// Latest known lifecycle timestamp: complete, else start, else scheduled.
    pub fn reference_time(&self) -> Option<DateTime<Utc>> {
        self.completed_at.or(self.started_at).or(self.scheduled_at)
    }

    /// Earliest known lifecycle timestamp.
    pub fn first_seen(&self) -> Option<DateTime<Utc>> {
        self.scheduled_at.or(self.started_at).or(self.completed_at)
    }

    /// Actual duration when known and strictly positive.
    pub fn positive_duration(&self) -> Option<f64> {
        self.actual_duration_seconds.filter(|d| *d > 0.0)
    }

    pub fn is_failed(&self) -> bool {
        self.status == ActivityStatus::Failed
    }
}

/// One end-to-end process instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub case_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: CaseStatus,
    pub activity_count: usize,
    pub failure_count: usize,
    pub anomaly_count: usize,
    pub total_duration_seconds: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reconstruction {
    pub activities: Vec<Activity>,
    pub cases: Vec<Case>,
}

impl Reconstruction {
    /// Recompute per-case counters from the current activity set.
    ///
    /// Must be called again after anomaly flags change.
    pub fn refresh_case_counts(&mut self) {
        let mut tallies: HashMap<&str, (usize, usize, usize)> = HashMap::new();
        for a in &self.activities {
            let t = tallies.entry(a.case_id.as_str()).or_default();
            t.0 += 1;
            if a.is_failed() {
                t.1 += 1;
            }
            if a.is_anomaly {
                t.2 += 1;
            }
        }
        for case in &mut self.cases {
            let (activities, failures, anomalies) =
                tallies.get(case.case_id.as_str()).copied().unwrap_or_default();
            case.activity_count = activities;
            case.failure_count = failures;
            case.anomaly_count = anomalies;
            case.total_duration_seconds = case
                .end_time
                .map(|end| seconds_between(case.start_time, end))
                .filter(|d| *d >= 0.0);
        }
    }

    /// Activities belonging to one case, in reconstruction order.
    pub fn activities_for_case<'a>(&'a self, case_id: &'a str) -> impl Iterator<Item = &'a Activity> + 'a {
        self.activities.iter().filter(move |a| a.case_id == case_id)
    }
}

struct Draft {
    activity: Activity,
    resource: Option<String>,
}

/// Derived instances of one (case, activity), oldest first. Only instances
/// without a complete stay pending.
#[derive(Default)]
struct OpenInstances {
    next_ordinal: u32,
    pending: Vec<usize>,
}

struct CaseDraft {
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    status: CaseStatus,
}

/// Rebuild activities and cases from an unordered event set.
///
/// Pure: the same event set always yields the same output.
pub fn reconstruct(events: &[RawEvent]) -> Reconstruction {
    let mut ordered: Vec<&RawEvent> = events.iter().collect();
    ordered.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then(a.transition.cmp(&b.transition))
            .then_with(|| a.case_id.cmp(&b.case_id))
            .then_with(|| a.activity.cmp(&b.activity))
            .then(a.instance.cmp(&b.instance))
            .then(a.outcome.cmp(&b.outcome))
            .then_with(|| a.resource.cmp(&b.resource))
            .then_with(|| a.failure_description.cmp(&b.failure_description))
            .then_with(|| a.planned_duration.cmp(&b.planned_duration))
            .then_with(|| a.service_duration.cmp(&b.service_duration))
    });

    let mut arena: Vec<Draft> = Vec::new();
    let mut index: HashMap<ActivityKey, usize> = HashMap::new();
    let mut open: HashMap<(&str, &str), OpenInstances> = HashMap::new();
    let mut cases: BTreeMap<&str, CaseDraft> = BTreeMap::new();

    for event in ordered {
        let slot = match event.instance {
            Some(seq) => {
                let key = ActivityKey {
                    case_id: event.case_id.clone(),
                    activity: event.activity.clone(),
                    instance: Discriminator::Sequence(seq),
                };
                *index.entry(key).or_insert_with(|| {
                    arena.push(new_draft(event, Discriminator::Sequence(seq)));
                    arena.len() - 1
                })
            }
            None => {
                let lane = open
                    .entry((event.case_id.as_str(), event.activity.as_str()))
                    .or_default();
                let pending = lane
                    .pending
                    .iter()
                    .position(|&idx| accepts(&arena[idx].activity, event.transition));
                let idx = match pending {
                    Some(pos) => lane.pending[pos],
                    None => {
                        let instance = Discriminator::Derived(lane.next_ordinal);
                        lane.next_ordinal += 1;
                        arena.push(new_draft(event, instance));
                        let idx = arena.len() - 1;
                        lane.pending.push(idx);
                        idx
                    }
                };
                if event.transition == Transition::Complete {
                    lane.pending.retain(|&pending| pending != idx);
                }
                idx
            }
        };
        apply_transition(&mut arena[slot], event);

        let case = cases.entry(event.case_id.as_str()).or_insert(CaseDraft {
            start_time: event.timestamp,
            end_time: None,
            status: CaseStatus::InProgress,
        });
        case.start_time = case.start_time.min(event.timestamp);
        if event.transition == Transition::Complete {
            case.end_time = Some(case.end_time.map_or(event.timestamp, |t| t.max(event.timestamp)));
            match event.outcome {
                Some(Outcome::Success) => case.status = CaseStatus::Success,
                Some(Outcome::Failure) => case.status = CaseStatus::Failed,
                _ => {}
            }
        }
    }

    let activities: Vec<Activity> = arena.into_iter().map(finalize_draft).collect();
    let mut cases: Vec<Case> = cases
        .into_iter()
        .map(|(case_id, d)| Case {
            case_id: case_id.to_string(),
            start_time: d.start_time,
            end_time: d.end_time,
            status: d.status,
            activity_count: 0,
            failure_count: 0,
            anomaly_count: 0,
            total_duration_seconds: None,
        })
        .collect();
    cases.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.case_id.cmp(&b.case_id)));

    let mut out = Reconstruction { activities, cases };
    out.refresh_case_counts();
    debug!(
        events = events.len(),
        activities = out.activities.len(),
        cases = out.cases.len(),
        "reconstructed event log"
    );
    out
}

/// Whether a pending instance can still take the incoming transition.
/// Transitions pair first-in first-out, so overlapping executions of the same
/// activity complete in the order they started.
fn accepts(pending: &Activity, transition: Transition) -> bool {
    match transition {
        Transition::Scheduled => {
            pending.scheduled_at.is_none()
                && pending.started_at.is_none()
                && pending.completed_at.is_none()
        }
        Transition::Start => pending.started_at.is_none() && pending.completed_at.is_none(),
        Transition::Complete => pending.completed_at.is_none(),
    }
}

fn new_draft(event: &RawEvent, instance: Discriminator) -> Draft {
    Draft {
        activity: Activity {
            case_id: event.case_id.clone(),
            activity: event.activity.clone(),
            instance,
            resource: String::new(),
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            planned_duration_seconds: None,
            actual_duration_seconds: None,
            status: ActivityStatus::InProgress,
            failure_description: None,
            is_anomaly: false,
            anomaly_score: 0.0,
        },
        resource: None,
    }
}

fn apply_transition(draft: &mut Draft, event: &RawEvent) {
    if draft.resource.is_none() {
        draft.resource = event.resource.clone();
    }
    let a = &mut draft.activity;
    if a.planned_duration_seconds.is_none() {
        a.planned_duration_seconds = event
            .planned_duration
            .as_deref()
            .and_then(parse_duration_seconds);
    }

    match event.transition {
        Transition::Scheduled => {
            a.scheduled_at.get_or_insert(event.timestamp);
        }
        Transition::Start => {
            a.started_at.get_or_insert(event.timestamp);
        }
        Transition::Complete => {
            if a.completed_at.is_some() {
                debug!(case = %a.case_id, activity = %a.activity, "duplicate complete transition ignored");
                return;
            }
            a.completed_at = Some(event.timestamp);
            a.status = match event.outcome {
                Some(Outcome::Success) => ActivityStatus::Success,
                Some(Outcome::Failure) => ActivityStatus::Failed,
                _ => ActivityStatus::Completed,
            };
            if let Some(desc) = &event.failure_description {
                a.failure_description = Some(desc.clone());
            }
            if let Some(d) = event
                .service_duration
                .as_deref()
                .and_then(parse_duration_seconds)
            {
                a.actual_duration_seconds = Some(d);
            }
        }
    }
}

fn finalize_draft(draft: Draft) -> Activity {
    let mut a = draft.activity;
    a.resource = draft
        .resource
        .unwrap_or_else(|| UNKNOWN_RESOURCE.to_string());
    if a.actual_duration_seconds.is_none() {
        if let (Some(start), Some(end)) = (a.started_at, a.completed_at) {
            let derived = seconds_between(start, end);
            if derived >= 0.0 {
                a.actual_duration_seconds = Some(derived);
            } else {
                debug!(case = %a.case_id, activity = %a.activity, "complete precedes start; duration left unknown");
            }
        }
    }
    a
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + chrono::Duration::minutes(min)
    }

    fn ev(case: &str, act: &str, t: Transition, min: i64) -> RawEvent {
        RawEvent {
            case_id: case.into(),
            activity: act.into(),
            resource: Some(format!("/st/{act}")),
            transition: t,
            outcome: None,
            timestamp: ts(min),
            instance: None,
            planned_duration: None,
            service_duration: None,
            failure_description: None,
        }
    }

    fn done(case: &str, act: &str, min: i64, outcome: Outcome) -> RawEvent {
        RawEvent {
            outcome: Some(outcome),
            ..ev(case, act, Transition::Complete, min)
        }
    }

    #[test]
    fn test_merges_lifecycle_out_of_order() {
        let events = vec![
            done("c1", "drill", 5, Outcome::Success),
            ev("c1", "drill", Transition::Scheduled, 0),
            ev("c1", "drill", Transition::Start, 2),
        ];
        let r = reconstruct(&events);
        assert_eq!(r.activities.len(), 1);
        let a = &r.activities[0];
        assert_eq!(a.scheduled_at, Some(ts(0)));
        assert_eq!(a.started_at, Some(ts(2)));
        assert_eq!(a.completed_at, Some(ts(5)));
        assert_eq!(a.actual_duration_seconds, Some(180.0));
        assert_eq!(a.status, ActivityStatus::Success);
        assert_eq!(a.resource, "/st/drill");

        let c = &r.cases[0];
        assert_eq!(c.status, CaseStatus::Success);
        assert_eq!(c.start_time, ts(0));
        assert_eq!(c.end_time, Some(ts(5)));
        assert_eq!(c.total_duration_seconds, Some(300.0));
        assert_eq!(c.activity_count, 1);
    }

    #[test]
    fn test_explicit_service_duration_wins() {
        let mut complete = done("c1", "mill", 10, Outcome::Success);
        complete.service_duration = Some("0 days 00:00:42".into());
        let events = vec![ev("c1", "mill", Transition::Start, 0), complete];
        let r = reconstruct(&events);
        assert_eq!(r.activities[0].actual_duration_seconds, Some(42.0));
    }

    #[test]
    fn test_unparsable_duration_falls_back_to_timestamps() {
        let mut complete = done("c1", "mill", 1, Outcome::Success);
        complete.service_duration = Some("n/a".into());
        let r = reconstruct(&[ev("c1", "mill", Transition::Start, 0), complete]);
        assert_eq!(r.activities[0].actual_duration_seconds, Some(60.0));
    }

    #[test]
    fn test_complete_without_start_is_valid() {
        let r = reconstruct(&[done("c1", "sort", 3, Outcome::Failure)]);
        let a = &r.activities[0];
        assert_eq!(a.actual_duration_seconds, None);
        assert_eq!(a.status, ActivityStatus::Failed);
        assert_eq!(r.cases[0].status, CaseStatus::Failed);
        assert_eq!(r.cases[0].failure_count, 1);
    }

    #[test]
    fn test_negative_derivation_is_nulled() {
        let events = vec![
            RawEvent {
                instance: Some(1),
                ..ev("c1", "oven", Transition::Start, 10)
            },
            RawEvent {
                instance: Some(1),
                ..done("c1", "oven", 4, Outcome::Success)
            },
        ];
        let r = reconstruct(&events);
        assert_eq!(r.activities.len(), 1);
        assert_eq!(r.activities[0].actual_duration_seconds, None);
    }

    #[test]
    fn test_repeated_activity_opens_new_instance() {
        let events = vec![
            ev("c1", "drill", Transition::Start, 0),
            done("c1", "drill", 1, Outcome::Failure),
            ev("c1", "drill", Transition::Start, 2),
            done("c1", "drill", 4, Outcome::Success),
        ];
        let r = reconstruct(&events);
        assert_eq!(r.activities.len(), 2);
        assert_eq!(r.activities[0].instance, Discriminator::Derived(0));
        assert_eq!(r.activities[1].instance, Discriminator::Derived(1));
        assert_eq!(r.activities[1].actual_duration_seconds, Some(120.0));
        // Last terminal transition resolves the case.
        assert_eq!(r.cases[0].status, CaseStatus::Success);
        assert_eq!(r.cases[0].failure_count, 1);
    }

    #[test]
    fn test_tied_timestamps_ignore_input_order() {
        let mut failed = done("c1", "burn", 10, Outcome::Failure);
        failed.failure_description = Some("Oven is not ready".into());
        let log = vec![
            ev("c1", "burn", Transition::Start, 0),
            failed,
            ev("c1", "burn", Transition::Start, 0),
            done("c1", "burn", 10, Outcome::Success),
        ];
        let mut rev = log.clone();
        rev.reverse();

        let r = reconstruct(&log);
        assert_eq!(r, reconstruct(&rev));
        assert_eq!(r.activities.len(), 2);
        assert!(r.activities.iter().all(|a| a.status != ActivityStatus::InProgress));
        assert!(r.activities.iter().all(|a| a.actual_duration_seconds == Some(600.0)));
        assert_eq!(r.activities[0].status, ActivityStatus::Success);
        assert_eq!(r.activities[1].status, ActivityStatus::Failed);
        assert_eq!(
            r.activities[1].failure_description.as_deref(),
            Some("Oven is not ready")
        );
        assert_eq!(r.cases[0].failure_count, 1);
    }

    #[test]
    fn test_overlapping_executions_complete_in_start_order() {
        let events = vec![
            ev("c1", "press", Transition::Start, 0),
            ev("c1", "press", Transition::Start, 1),
            done("c1", "press", 5, Outcome::Success),
            done("c1", "press", 7, Outcome::Success),
        ];
        let r = reconstruct(&events);
        assert_eq!(r.activities.len(), 2);
        assert_eq!(r.activities[0].started_at, Some(ts(0)));
        assert_eq!(r.activities[0].completed_at, Some(ts(5)));
        assert_eq!(r.activities[1].started_at, Some(ts(1)));
        assert_eq!(r.activities[1].completed_at, Some(ts(7)));
        assert_eq!(r.activities[1].actual_duration_seconds, Some(360.0));
    }

    #[test]
    fn test_schedule_during_open_execution_starts_next_instance() {
        let events = vec![
            ev("c1", "mill", Transition::Start, 0),
            ev("c1", "mill", Transition::Scheduled, 1),
            ev("c1", "mill", Transition::Start, 2),
            done("c1", "mill", 3, Outcome::Success),
            done("c1", "mill", 4, Outcome::Success),
        ];
        let r = reconstruct(&events);
        assert_eq!(r.activities.len(), 2);
        assert_eq!(r.activities[0].scheduled_at, None);
        assert_eq!(r.activities[0].completed_at, Some(ts(3)));
        assert_eq!(r.activities[1].scheduled_at, Some(ts(1)));
        assert_eq!(r.activities[1].started_at, Some(ts(2)));
        assert_eq!(r.activities[1].completed_at, Some(ts(4)));
    }

    #[test]
    fn test_failure_description_only_from_complete() {
        let mut start = ev("c1", "read_nfc", Transition::Start, 0);
        start.failure_description = Some("ignored".into());
        let mut complete = done("c1", "read_nfc", 1, Outcome::Failure);
        complete.failure_description = Some("NFC tag could not be read".into());
        let r = reconstruct(&[start.clone()]);
        assert_eq!(r.activities[0].failure_description, None);
        let r = reconstruct(&[start, complete]);
        assert_eq!(
            r.activities[0].failure_description.as_deref(),
            Some("NFC tag could not be read")
        );
    }

    #[test]
    fn test_unresolved_case_stays_in_progress() {
        let r = reconstruct(&[
            ev("c7", "a", Transition::Scheduled, 0),
            ev("c7", "a", Transition::Start, 1),
        ]);
        assert_eq!(r.activities[0].status, ActivityStatus::InProgress);
        assert_eq!(r.activities[0].actual_duration_seconds, None);
        assert_eq!(r.cases[0].status, CaseStatus::InProgress);
        assert_eq!(r.cases[0].end_time, None);
        assert_eq!(r.cases[0].total_duration_seconds, None);
    }

    #[test]
    fn test_missing_resource_uses_placeholder() {
        let mut e = ev("c1", "a", Transition::Start, 0);
        e.resource = None;
        let r = reconstruct(&[e]);
        assert_eq!(r.activities[0].resource, UNKNOWN_RESOURCE);
    }

    #[test]
    fn test_idempotent_and_order_independent() {
        let events = vec![
            ev("c2", "b", Transition::Start, 3),
            done("c1", "a", 2, Outcome::Success),
            ev("c1", "a", Transition::Start, 0),
            done("c2", "b", 6, Outcome::Failure),
        ];
        let mut reversed = events.clone();
        reversed.reverse();
        let first = reconstruct(&events);
        assert_eq!(first, reconstruct(&events));
        assert_eq!(first, reconstruct(&reversed));
    }

    #[test]
    fn test_refresh_counts_anomalies() {
        let mut r = reconstruct(&[
            ev("c1", "a", Transition::Start, 0),
            done("c1", "a", 1, Outcome::Success),
        ]);
        assert_eq!(r.cases[0].anomaly_count, 0);
        r.activities[0].is_anomaly = true;
        r.refresh_case_counts();
        assert_eq!(r.cases[0].anomaly_count, 1);
    }
}
