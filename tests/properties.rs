//! Property tests over randomly generated event logs.

use chrono::{Duration, TimeZone, Utc};
use procmine::config::AnalysisConfig;
use procmine::events::{Outcome, RawEvent, Transition};
use procmine::pipeline::analyze;
use procmine::reconstruct::reconstruct;
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_transition() -> impl Strategy<Value = Transition> {
    prop_oneof![
        Just(Transition::Scheduled),
        Just(Transition::Start),
        Just(Transition::Complete),
    ]
}

fn arb_outcome() -> impl Strategy<Value = Option<Outcome>> {
    prop_oneof![
        Just(None),
        Just(Some(Outcome::Success)),
        Just(Some(Outcome::Failure)),
        Just(Some(Outcome::InProgress)),
    ]
}

/// Event logs with unique timestamps, so any input order has one true sequence.
fn arb_log() -> impl Strategy<Value = Vec<RawEvent>> {
    arb_rows(0i64..500).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, row)| to_event(row, |offset| offset * 100 + i as i64))
            .collect()
    })
}

/// Event logs on a coarse clock, so many events share a timestamp.
fn arb_tied_log() -> impl Strategy<Value = Vec<RawEvent>> {
    arb_rows(0i64..4).prop_map(|rows| {
        rows.into_iter()
            .map(|row| to_event(row, |offset| offset * 60))
            .collect()
    })
}

type Row = (usize, usize, Option<usize>, Transition, Option<Outcome>, i64, Option<&'static str>);

fn arb_rows(offsets: std::ops::Range<i64>) -> impl Strategy<Value = Vec<Row>> {
    prop::collection::vec(
        (
            0usize..4,
            0usize..3,
            prop::option::of(0usize..3),
            arb_transition(),
            arb_outcome(),
            offsets,
            prop::option::of(Just("Operation timed out")),
        ),
        0..60,
    )
}

fn to_event(row: Row, seconds: impl Fn(i64) -> i64) -> RawEvent {
    let (case, activity, resource, transition, outcome, offset, failure) = row;
    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    RawEvent {
        case_id: format!("case-{case}"),
        activity: ["drill", "mill", "sort"][activity].to_string(),
        resource: resource.map(|r| format!("/st/{r}")),
        transition,
        outcome,
        timestamp: t0 + Duration::seconds(seconds(offset)),
        instance: None,
        planned_duration: None,
        service_duration: None,
        failure_description: failure.map(String::from),
    }
}

fn shuffled(log: impl Strategy<Value = Vec<RawEvent>>) -> impl Strategy<Value = (Vec<RawEvent>, Vec<RawEvent>)> {
    log.prop_flat_map(|log| {
        let shuffled = Just(log.clone()).prop_shuffle();
        (Just(log), shuffled)
    })
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn reconstruction_ignores_input_order((log, reordered) in shuffled(arb_log())) {
        prop_assert_eq!(reconstruct(&log), reconstruct(&reordered));
    }

    #[test]
    fn tied_timestamps_ignore_input_order((log, reordered) in shuffled(arb_tied_log())) {
        prop_assert_eq!(reconstruct(&log), reconstruct(&reordered));
    }

    #[test]
    fn durations_are_never_negative(log in arb_log()) {
        let r = reconstruct(&log);
        for a in &r.activities {
            if let Some(d) = a.actual_duration_seconds {
                prop_assert!(d >= 0.0, "negative duration {} for {:?}", d, a.key());
            }
        }
        for c in &r.cases {
            if let Some(d) = c.total_duration_seconds {
                prop_assert!(d >= 0.0);
            }
        }
    }

    #[test]
    fn every_activity_belongs_to_one_case(log in arb_log()) {
        let r = reconstruct(&log);
        let total: usize = r.cases.iter().map(|c| c.activity_count).sum();
        prop_assert_eq!(total, r.activities.len());
        for a in &r.activities {
            prop_assert_eq!(r.cases.iter().filter(|c| c.case_id == a.case_id).count(), 1);
        }
    }

    #[test]
    fn failure_patterns_cover_every_failure(log in arb_log()) {
        let report = analyze(&log, &AnalysisConfig::default());
        let failed = report.reconstruction.activities.iter().filter(|a| a.is_failed()).count();
        let counted: usize = report.failures.patterns.iter().map(|p| p.count).sum();
        prop_assert_eq!(counted, report.failures.total_failures);
        prop_assert_eq!(
            report.failures.total_failures + report.failures.undescribed_failures,
            failed
        );
    }

    #[test]
    fn analysis_is_repeatable(log in arb_log()) {
        let cfg = AnalysisConfig::default();
        let first = analyze(&log, &cfg);
        let second = analyze(&log, &cfg);
        prop_assert_eq!(first.reconstruction, second.reconstruction);
        prop_assert_eq!(first.bottlenecks, second.bottlenecks);
        prop_assert_eq!(first.failures, second.failures);
        prop_assert_eq!(first.temporal, second.temporal);
    }
}
