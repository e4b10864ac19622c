//! Raw lifecycle events as delivered by the ingestion side.

pub mod ingest;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("event {index}: missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("event {index}: unparsable timestamp '{value}'")]
    InvalidTimestamp { index: usize, value: String },

    #[error("event {index}: unknown lifecycle transition '{value}'")]
    InvalidTransition { index: usize, value: String },

    #[error("line {line}: malformed event record: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read event input")]
    Io(#[from] std::io::Error),
}

/// Lifecycle transition of one activity instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Scheduled,
    Start,
    Complete,
}

impl FromStr for Transition {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "schedule" | "scheduled" => Ok(Transition::Scheduled),
            "start" | "started" => Ok(Transition::Start),
            "complete" | "completed" => Ok(Transition::Complete),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transition::Scheduled => write!(f, "scheduled"),
            Transition::Start => write!(f, "start"),
            Transition::Complete => write!(f, "complete"),
        }
    }
}

/// Outcome state reported alongside a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Success,
    Failure,
    InProgress,
}

impl FromStr for Outcome {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" | "successful" | "ok" => Ok(Outcome::Success),
            "failure" | "failed" | "fail" | "error" => Ok(Outcome::Failure),
            "in-progress" | "in_progress" | "inprogress" | "ongoing" => Ok(Outcome::InProgress),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failure => write!(f, "failure"),
            Outcome::InProgress => write!(f, "in-progress"),
        }
    }
}

/// One lifecycle transition, validated. Never mutated after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub case_id: String,
    pub activity: String,
    pub resource: Option<String>,
    pub transition: Transition,
    pub outcome: Option<Outcome>,
    pub timestamp: DateTime<Utc>,
    /// Per-instance sequence number assigned by the source, if any.
    pub instance: Option<u64>,
    pub planned_duration: Option<String>,
    pub service_duration: Option<String>,
    pub failure_description: Option<String>,
}

/// Untyped record as it arrives from a file, queue or database cursor.
///
/// Accepts both plain field names and the XES-style names used by event-log
/// exports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default, alias = "case:concept:name", alias = "case")]
    pub case_id: Option<String>,
    #[serde(default, alias = "concept:name")]
    pub activity: Option<String>,
    #[serde(default, alias = "org:resource", alias = "station")]
    pub resource: Option<String>,
    #[serde(default, alias = "lifecycle:transition", alias = "transition")]
    pub lifecycle: Option<String>,
    #[serde(default, alias = "lifecycle:state", alias = "outcome")]
    pub state: Option<String>,
    #[serde(default, alias = "time:timestamp")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub instance: Option<u64>,
    #[serde(default, alias = "planned_operation_time")]
    pub planned_duration: Option<String>,
    #[serde(default, alias = "operation_end_time")]
    pub service_duration: Option<String>,
    #[serde(default, alias = "failure")]
    pub failure_description: Option<String>,
}

impl RawRecord {
    /// Validate a record into a [`RawEvent`]. `index` is only used in errors.
    pub fn into_event(self, index: usize) -> Result<RawEvent, EventError> {
        let case_id = non_empty(self.case_id).ok_or(EventError::MissingField {
            index,
            field: "case_id",
        })?;
        let activity = non_empty(self.activity).ok_or(EventError::MissingField {
            index,
            field: "activity",
        })?;
        let ts_text = non_empty(self.timestamp).ok_or(EventError::MissingField {
            index,
            field: "timestamp",
        })?;
        let timestamp = parse_timestamp(&ts_text).ok_or(EventError::InvalidTimestamp {
            index,
            value: ts_text.clone(),
        })?;
        let lifecycle = non_empty(self.lifecycle).ok_or(EventError::MissingField {
            index,
            field: "lifecycle",
        })?;
        let transition = lifecycle
            .parse::<Transition>()
            .map_err(|_| EventError::InvalidTransition {
                index,
                value: lifecycle.clone(),
            })?;

        let outcome = non_empty(self.state).and_then(|s| match s.parse::<Outcome>() {
            Ok(o) => Some(o),
            Err(_) => {
                tracing::debug!(index, state = %s, "ignoring unknown outcome state");
                None
            }
        });

        Ok(RawEvent {
            case_id,
            activity,
            resource: non_empty(self.resource),
            transition,
            outcome,
            timestamp,
            instance: self.instance,
            planned_duration: non_empty(self.planned_duration),
            service_duration: non_empty(self.service_duration),
            failure_description: non_empty(self.failure_description),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Parse an event timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}
