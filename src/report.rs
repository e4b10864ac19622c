//! Human-readable summaries for terminal output.

use crate::bottleneck::BottleneckReport;
use crate::detect::AnomalyReport;
use crate::failures::{CategorizationMode, FailureReport};
use crate::pipeline::AnalysisReport;
use crate::reconstruct::{CaseStatus, Reconstruction};
use crate::temporal::TemporalPatterns;
use std::fmt::Write;

/// Format seconds as `1h 02m`, `3m 05s` or `42.0s`.
pub fn format_seconds(secs: f64) -> String {
    if secs >= 3600.0 {
        let total = secs.round() as u64;
        format!("{}h {:02}m", total / 3600, (total % 3600) / 60)
    } else if secs >= 60.0 {
        let total = secs.round() as u64;
        format!("{}m {:02}s", total / 60, total % 60)
    } else {
        format!("{:.1}s", secs)
    }
}

pub fn format_reconstruction(r: &Reconstruction) -> String {
    let count = |s: CaseStatus| r.cases.iter().filter(|c| c.status == s).count();
    let mut out = format!(
        "{} activities across {} cases ({} success, {} failed, {} in progress)\n",
        r.activities.len(),
        r.cases.len(),
        count(CaseStatus::Success),
        count(CaseStatus::Failed),
        count(CaseStatus::InProgress),
    );
    let _ = writeln!(out, "{:<20} | {:<12} | {:>10} | {:>8} | {:>9}", "Case", "Status", "Activities", "Failures", "Duration");
    let _ = writeln!(out, "{:-<20}-|-{:-<12}-|-{:->10}-|-{:->8}-|-{:->9}", "", "", "", "", "");
    for c in &r.cases {
        let status = match c.status {
            CaseStatus::Success => "success",
            CaseStatus::Failed => "failed",
            CaseStatus::InProgress => "in-progress",
        };
        let duration = c
            .total_duration_seconds
            .map(format_seconds)
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:<20} | {:<12} | {:>10} | {:>8} | {:>9}",
            c.case_id, status, c.activity_count, c.failure_count, duration
        );
    }
    out
}

pub fn format_anomalies(report: &AnomalyReport) -> String {
    let mut out = format!(
        "{} of {} activities anomalous ({} without enough comparison data, {} without duration)\n",
        report.anomalous, report.checked, report.insufficient_data, report.no_duration
    );
    for f in &report.findings {
        let _ = writeln!(
            out,
            "  [{:.2}] {} / {} #{} on {}: {}",
            f.result.score,
            f.key.case_id,
            f.key.activity,
            instance_label(&f.key.instance),
            f.resource,
            f.result.reason
        );
    }
    out
}

fn instance_label(d: &crate::reconstruct::Discriminator) -> String {
    match d {
        crate::reconstruct::Discriminator::Sequence(n) => n.to_string(),
        crate::reconstruct::Discriminator::Derived(n) => n.to_string(),
    }
}

pub fn format_bottlenecks(report: &BottleneckReport) -> String {
    let mut out = String::new();
    if report.wait.is_empty() {
        out.push_str("No wait-time bottlenecks\n");
    } else {
        out.push_str("Wait-time bottlenecks:\n");
        for b in &report.wait {
            let _ = writeln!(
                out,
                "  {:<24} {:<7} avg wait {} (max {}), ~{} queued, {} gap{} [{}]",
                b.resource,
                b.severity.to_string().to_uppercase(),
                format_seconds(b.average_wait_seconds),
                format_seconds(b.max_wait_seconds),
                b.estimated_queue_length,
                b.wait_samples,
                if b.wait_samples == 1 { "" } else { "s" },
                b.activity,
            );
        }
    }
    if !report.processing.is_empty() {
        out.push_str("Processing time by resource:\n");
        for p in &report.processing {
            let _ = writeln!(
                out,
                "  {:<24} {:<7} avg {} over {} run{}",
                p.resource,
                p.severity.to_string().to_uppercase(),
                format_seconds(p.average_processing_seconds),
                p.samples,
                if p.samples == 1 { "" } else { "s" },
            );
        }
    }
    out
}

pub fn format_temporal(p: &TemporalPatterns) -> String {
    let mut out = format!("{} failures\n", p.total_failures());
    if let Some((hour, n)) = p.peak_failure_hour() {
        let _ = writeln!(out, "Peak hour: {:02}:00 UTC ({} failures)", hour, n);
    }
    if let Some((resource, n)) = p.top_failure_resource() {
        let _ = writeln!(out, "Most failures: {} ({})", resource, n);
    }
    for (day, n) in &p.failures_by_day {
        let anomalies = p.anomalies_by_day.get(day).copied().unwrap_or(0);
        let _ = writeln!(out, "  {}  failures {:>4}  anomalies {:>4}", day, n, anomalies);
    }
    out
}

pub fn format_failures(report: &FailureReport) -> String {
    let heading = match report.mode {
        CategorizationMode::RootCause => "root causes",
        CategorizationMode::Symptom => "symptoms only (no failure descriptions)",
    };
    let mut out = format!("{} failures, {}\n", report.total_failures, heading);
    if report.undescribed_failures > 0 {
        let _ = writeln!(out, "{} failures without a description not categorized", report.undescribed_failures);
    }
    for p in &report.patterns {
        let _ = writeln!(
            out,
            "  {:>5.1}%  {:>4}  {}  (e.g. {})",
            p.percentage,
            p.count,
            p.label,
            p.example_cases.join(", ")
        );
    }
    out
}

pub fn format_analysis(report: &AnalysisReport) -> String {
    let mut out = format!("Analysis run {} over {} events\n\n", report.run_id, report.event_count);
    for (title, body) in [
        ("Cases", format_reconstruction(&report.reconstruction)),
        ("Anomalies", format_anomalies(&report.anomalies)),
        ("Bottlenecks", format_bottlenecks(&report.bottlenecks)),
        ("Temporal patterns", format_temporal(&report.temporal)),
        ("Failure causes", format_failures(&report.failures)),
    ] {
        let _ = writeln!(out, "=== {} ===\n{}", title, body);
    }
    let flagged: Vec<_> = report.utilization.iter().filter(|u| u.is_anomaly).collect();
    if !flagged.is_empty() {
        out.push_str("=== Utilization ===\n");
        for u in flagged {
            let _ = writeln!(out, "  {}", u.reason);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bottleneck::{Bottleneck, Severity};

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(42.04), "42.0s");
        assert_eq!(format_seconds(185.0), "3m 05s");
        assert_eq!(format_seconds(3720.0), "1h 02m");
    }

    #[test]
    fn test_format_bottlenecks() {
        let report = BottleneckReport {
            wait: vec![Bottleneck {
                resource: "/pm/punch_gill".into(),
                activity: "punch".into(),
                average_wait_seconds: 310.0,
                max_wait_seconds: 400.0,
                wait_samples: 4,
                estimated_queue_length: 6,
                severity: Severity::High,
            }],
            processing: vec![],
        };
        let s = format_bottlenecks(&report);
        assert!(s.contains("/pm/punch_gill"));
        assert!(s.contains("HIGH"));
        assert!(s.contains("5m 10s"));
        assert!(s.contains("4 gaps"));
    }

    #[test]
    fn test_format_failures_symptom_heading() {
        let report = FailureReport {
            mode: CategorizationMode::Symptom,
            total_failures: 0,
            undescribed_failures: 0,
            patterns: vec![],
        };
        assert!(format_failures(&report).contains("symptoms only"));
    }
}
