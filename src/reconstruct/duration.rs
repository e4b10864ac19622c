//! Duration-text parsing for planned and completed service times.

use regex::Regex;
use std::sync::LazyLock;

/// `N days HH:MM:SS[.f]`, `HH:MM:SS[.f]` or `MM:SS[.f]`.
static CLOCK_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?P<days>\d+)\s+days?,?\s*)?(?:(?P<hours>\d+):)?(?P<minutes>\d+):(?P<seconds>\d+(?:\.\d+)?)$",
    )
    .expect("clock duration regex is valid")
});

/// `N days` with no clock part.
static DAYS_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<days>\d+)\s+days?$").expect("days-only regex is valid")
});

/// Parse duration text into seconds.
///
/// Returns `None` for empty, unparsable or negative input. A plain number is
/// taken as seconds.
pub fn parse_duration_seconds(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = CLOCK_DURATION.captures(text) {
        let days = caps
            .name("days")
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0);
        let hours = caps
            .name("hours")
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0);
        let minutes: f64 = caps.name("minutes")?.as_str().parse().ok()?;
        let seconds: f64 = caps.name("seconds")?.as_str().parse().ok()?;
        return Some(days * 86_400.0 + hours * 3_600.0 + minutes * 60.0 + seconds);
    }

    if let Some(caps) = DAYS_ONLY.captures(text) {
        let days: f64 = caps.name("days")?.as_str().parse().ok()?;
        return Some(days * 86_400.0);
    }

    match text.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Some(v),
        _ => None,
    }
}
