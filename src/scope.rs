//! Scope filter restricting an analysis run to a subset of the event log.

use crate::events::RawEvent;
use crate::reconstruct::{Activity, ActivityStatus, Reconstruction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Half-open time window `[start, end)`. Either side may be open.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| t >= s) && self.end.map_or(true, |e| t < e)
    }
}

/// Every set field must match; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeFilter {
    pub resource: Option<String>,
    pub case_ids: Option<Vec<String>>,
    pub status_in: Option<Vec<ActivityStatus>>,
    pub date_range: Option<DateRange>,
}

impl ScopeFilter {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    fn case_matches(&self, case_id: &str) -> bool {
        self.case_ids
            .as_ref()
            .map_or(true, |ids| ids.iter().any(|c| c == case_id))
    }

    /// Event-level match. `status_in` has no event-level meaning and is ignored.
    pub fn matches_event(&self, event: &RawEvent) -> bool {
        self.case_matches(&event.case_id)
            && self
                .resource
                .as_ref()
                .map_or(true, |r| event.resource.as_deref() == Some(r.as_str()))
            && self
                .date_range
                .as_ref()
                .map_or(true, |d| d.contains(event.timestamp))
    }

    /// Activity-level match; the date range applies to the first known
    /// lifecycle timestamp.
    pub fn matches_activity(&self, activity: &Activity) -> bool {
        self.case_matches(&activity.case_id)
            && self.resource.as_ref().map_or(true, |r| &activity.resource == r)
            && self
                .status_in
                .as_ref()
                .map_or(true, |s| s.contains(&activity.status))
            && self.date_range.as_ref().map_or(true, |d| {
                activity.first_seen().is_some_and(|t| d.contains(t))
            })
    }

    pub fn apply_to_events(&self, events: &[RawEvent]) -> Vec<RawEvent> {
        events.iter().filter(|e| self.matches_event(e)).cloned().collect()
    }

    /// Keep in-scope activities and the cases that still own at least one.
    /// Case counters are refreshed from the narrowed activity set.
    pub fn apply_to_reconstruction(&self, reconstruction: Reconstruction) -> Reconstruction {
        if self.is_empty() {
            return reconstruction;
        }
        let activities: Vec<Activity> = reconstruction
            .activities
            .into_iter()
            .filter(|a| self.matches_activity(a))
            .collect();
        let kept: HashSet<&str> = activities.iter().map(|a| a.case_id.as_str()).collect();
        let cases = reconstruction
            .cases
            .into_iter()
            .filter(|c| kept.contains(c.case_id.as_str()))
            .collect();
        let mut narrowed = Reconstruction { activities, cases };
        narrowed.refresh_case_counts();
        narrowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Transition;
    use crate::reconstruct::Discriminator;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap()
    }

    fn activity(case: &str, resource: &str, status: ActivityStatus, h: u32) -> Activity {
        Activity {
            case_id: case.into(),
            activity: "a".into(),
            instance: Discriminator::Derived(0),
            resource: resource.into(),
            scheduled_at: None,
            started_at: Some(at(h)),
            completed_at: None,
            planned_duration_seconds: None,
            actual_duration_seconds: None,
            status,
            failure_description: None,
            is_anomaly: false,
            anomaly_score: 0.0,
        }
    }

    #[test]
    fn test_empty_filter_matches_all() {
        let f = ScopeFilter::default();
        assert!(f.is_empty());
        assert!(f.matches_activity(&activity("c1", "r", ActivityStatus::Success, 1)));
    }

    #[test]
    fn test_combined_predicates() {
        let f = ScopeFilter {
            resource: Some("/ov/oven".into()),
            status_in: Some(vec![ActivityStatus::Failed]),
            date_range: Some(DateRange {
                start: Some(at(8)),
                end: Some(at(12)),
            }),
            ..Default::default()
        };
        assert!(f.matches_activity(&activity("c1", "/ov/oven", ActivityStatus::Failed, 9)));
        assert!(!f.matches_activity(&activity("c1", "/ov/oven", ActivityStatus::Success, 9)));
        assert!(!f.matches_activity(&activity("c1", "/ov/oven", ActivityStatus::Failed, 12)));
        assert!(!f.matches_activity(&activity("c1", "/mm/mill", ActivityStatus::Failed, 9)));
    }

    #[test]
    fn test_event_filter_by_case() {
        let f = ScopeFilter {
            case_ids: Some(vec!["c2".into()]),
            ..Default::default()
        };
        let event = RawEvent {
            case_id: "c1".into(),
            activity: "a".into(),
            resource: None,
            transition: Transition::Start,
            outcome: None,
            timestamp: at(1),
            instance: None,
            planned_duration: None,
            service_duration: None,
            failure_description: None,
        };
        assert!(!f.matches_event(&event));
        let other = RawEvent {
            case_id: "c2".into(),
            ..event.clone()
        };
        assert_eq!(f.apply_to_events(&[event, other]).len(), 1);
    }

    #[test]
    fn test_reconstruction_drops_empty_cases() {
        let r = crate::reconstruct::reconstruct(&[]);
        assert!(r.cases.is_empty());
        let f = ScopeFilter {
            resource: Some("x".into()),
            ..Default::default()
        };
        assert!(f.apply_to_reconstruction(r).activities.is_empty());
    }
}
