//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Current schema version recorded in `schema_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// Create all tables if missing. Safe to run on every open.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS raw_events (
            id INTEGER PRIMARY KEY,
            case_id TEXT NOT NULL,
            activity TEXT NOT NULL,
            resource TEXT,
            transition TEXT NOT NULL,
            outcome TEXT,
            timestamp TEXT NOT NULL,
            instance INTEGER,
            planned_duration TEXT,
            service_duration TEXT,
            failure_description TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS analysis_runs (
            run_id TEXT PRIMARY KEY,
            generated_at TEXT NOT NULL,
            event_count INTEGER NOT NULL,
            report_json TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS activities (
            id INTEGER PRIMARY KEY,
            run_id TEXT NOT NULL,
            case_id TEXT NOT NULL,
            activity TEXT NOT NULL,
            instance_json TEXT NOT NULL,
            resource TEXT NOT NULL,
            scheduled_at TEXT,
            started_at TEXT,
            completed_at TEXT,
            planned_duration_seconds REAL,
            actual_duration_seconds REAL,
            status TEXT NOT NULL,
            failure_description TEXT,
            is_anomaly INTEGER NOT NULL DEFAULT 0,
            anomaly_score REAL NOT NULL DEFAULT 0,
            FOREIGN KEY (run_id) REFERENCES analysis_runs(run_id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS cases (
            id INTEGER PRIMARY KEY,
            run_id TEXT NOT NULL,
            case_id TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT,
            status TEXT NOT NULL,
            activity_count INTEGER NOT NULL,
            failure_count INTEGER NOT NULL,
            anomaly_count INTEGER NOT NULL,
            total_duration_seconds REAL,
            FOREIGN KEY (run_id) REFERENCES analysis_runs(run_id) ON DELETE CASCADE,
            UNIQUE (run_id, case_id)
        );

        CREATE INDEX IF NOT EXISTS idx_raw_events_case ON raw_events(case_id, timestamp);
        CREATE INDEX IF NOT EXISTS idx_analysis_runs_generated ON analysis_runs(generated_at);
        CREATE INDEX IF NOT EXISTS idx_activities_run ON activities(run_id, case_id);
        CREATE INDEX IF NOT EXISTS idx_activities_resource ON activities(run_id, resource);
        CREATE INDEX IF NOT EXISTS idx_cases_run ON cases(run_id);",
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [SCHEMA_VERSION],
    )?;

    Ok(())
}
