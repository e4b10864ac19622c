//! SQLite storage layer -- raw events, reconstructed records, analysis runs.

pub mod schema;

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::events::RawEvent;
use crate::pipeline::AnalysisReport;
use crate::reconstruct::Case;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: impl AsRef<Path>) -> Result<Pool> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create database directory {}", parent.display()))?;
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)
        .with_context(|| format!("failed to open database {}", path.display()))?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

fn to_text(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn from_text(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("stored timestamp '{text}' is not RFC 3339"))
}

/// Serialized name of a unit enum variant, as written by serde.
fn variant_name<T: Serialize>(value: &T) -> Result<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(anyhow!("expected a string variant, got {other}")),
    }
}

fn parse_variant<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(text.to_string()))
        .with_context(|| format!("unknown stored variant '{text}'"))
}

/// Append events to the raw event log. Returns the number written.
pub fn save_events(pool: &Pool, events: &[RawEvent]) -> Result<usize> {
    let mut conn = pool.get()?;
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO raw_events (case_id, activity, resource, transition, outcome, timestamp,
                                     instance, planned_duration, service_duration, failure_description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for e in events {
            stmt.execute(params![
                e.case_id,
                e.activity,
                e.resource,
                e.transition.to_string(),
                e.outcome.map(|o| o.to_string()),
                to_text(e.timestamp),
                e.instance.map(|n| n as i64),
                e.planned_duration,
                e.service_duration,
                e.failure_description,
            ])?;
        }
    }
    tx.commit()?;
    debug!(count = events.len(), "stored raw events");
    Ok(events.len())
}

struct EventRow {
    case_id: String,
    activity: String,
    resource: Option<String>,
    transition: String,
    outcome: Option<String>,
    timestamp: String,
    instance: Option<i64>,
    planned_duration: Option<String>,
    service_duration: Option<String>,
    failure_description: Option<String>,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            case_id: row.get(0)?,
            activity: row.get(1)?,
            resource: row.get(2)?,
            transition: row.get(3)?,
            outcome: row.get(4)?,
            timestamp: row.get(5)?,
            instance: row.get(6)?,
            planned_duration: row.get(7)?,
            service_duration: row.get(8)?,
            failure_description: row.get(9)?,
        })
    }

    fn into_event(self) -> Result<RawEvent> {
        let transition = self
            .transition
            .parse()
            .map_err(|_| anyhow!("stored transition '{}' is not recognized", self.transition))?;
        Ok(RawEvent {
            case_id: self.case_id,
            activity: self.activity,
            resource: self.resource,
            transition,
            outcome: self.outcome.as_deref().and_then(|o| o.parse().ok()),
            timestamp: from_text(&self.timestamp)?,
            instance: self.instance.and_then(|n| u64::try_from(n).ok()),
            planned_duration: self.planned_duration,
            service_duration: self.service_duration,
            failure_description: self.failure_description,
        })
    }
}

/// Load the full raw event log in insertion order.
pub fn load_events(pool: &Pool) -> Result<Vec<RawEvent>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT case_id, activity, resource, transition, outcome, timestamp,
                instance, planned_duration, service_duration, failure_description
         FROM raw_events ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], EventRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(EventRow::into_event).collect()
}

/// Persist one analysis run: the full report plus its activity and case rows.
pub fn save_report(pool: &Pool, report: &AnalysisReport) -> Result<()> {
    let run_id = report.run_id.to_string();
    let report_json = serde_json::to_string(report).context("failed to serialize analysis report")?;

    let mut conn = pool.get()?;
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO analysis_runs (run_id, generated_at, event_count, report_json)
         VALUES (?1, ?2, ?3, ?4)",
        params![run_id, to_text(report.generated_at), report.event_count as i64, report_json],
    )?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO activities (run_id, case_id, activity, instance_json, resource,
                                     scheduled_at, started_at, completed_at,
                                     planned_duration_seconds, actual_duration_seconds,
                                     status, failure_description, is_anomaly, anomaly_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )?;
        for a in &report.reconstruction.activities {
            stmt.execute(params![
                run_id,
                a.case_id,
                a.activity,
                serde_json::to_string(&a.instance)?,
                a.resource,
                a.scheduled_at.map(to_text),
                a.started_at.map(to_text),
                a.completed_at.map(to_text),
                a.planned_duration_seconds,
                a.actual_duration_seconds,
                variant_name(&a.status)?,
                a.failure_description,
                a.is_anomaly,
                a.anomaly_score,
            ])?;
        }
    }
    {
        let mut stmt = tx.prepare(
            "INSERT INTO cases (run_id, case_id, start_time, end_time, status,
                                activity_count, failure_count, anomaly_count, total_duration_seconds)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for c in &report.reconstruction.cases {
            stmt.execute(params![
                run_id,
                c.case_id,
                to_text(c.start_time),
                c.end_time.map(to_text),
                variant_name(&c.status)?,
                c.activity_count as i64,
                c.failure_count as i64,
                c.anomaly_count as i64,
                c.total_duration_seconds,
            ])?;
        }
    }
    tx.commit()?;

    info!(
        %run_id,
        activities = report.reconstruction.activities.len(),
        cases = report.reconstruction.cases.len(),
        "stored analysis run"
    );
    Ok(())
}

/// Most recently generated report, if any run has been stored.
pub fn latest_report(pool: &Pool) -> Result<Option<AnalysisReport>> {
    let conn = pool.get()?;
    let json: Option<String> = conn
        .query_row(
            "SELECT report_json FROM analysis_runs ORDER BY generated_at DESC, created_at DESC, rowid DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    json.map(|j| serde_json::from_str(&j).context("stored analysis report is corrupt"))
        .transpose()
}

/// Case rows of the most recent run, ordered by start time.
pub fn latest_cases(pool: &Pool) -> Result<Vec<Case>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT c.case_id, c.start_time, c.end_time, c.status, c.activity_count,
                c.failure_count, c.anomaly_count, c.total_duration_seconds
         FROM cases c
         WHERE c.run_id = (SELECT run_id FROM analysis_runs
                           ORDER BY generated_at DESC, created_at DESC, rowid DESC LIMIT 1)
         ORDER BY c.start_time, c.case_id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, Option<f64>>(7)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(case_id, start, end, status, activities, failures, anomalies, total)| {
            Ok(Case {
                case_id,
                start_time: from_text(&start)?,
                end_time: end.as_deref().map(from_text).transpose()?,
                status: parse_variant(&status)?,
                activity_count: activities as usize,
                failure_count: failures as usize,
                anomaly_count: anomalies as usize,
                total_duration_seconds: total,
            })
        })
        .collect()
}
