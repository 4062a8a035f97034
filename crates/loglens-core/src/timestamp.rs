//! Best-effort timestamp extraction from raw log lines.
//!
//! The first `YYYY-MM-DDTHH:MM:SS` substring in a line is read as a
//! local wall-clock time. A UTC offset suffix (`Z`, `+05:30`, `-0800`) is
//! matched so it never leaks into the captured fields, but it is not
//! applied: `2025-12-17T16:16:00+05:30` means 16:16 local time.
//!
//! Extraction never fails. Lines without a usable timestamp get the
//! current wall-clock time, so callers must not treat the result as the
//! true event time.

use std::sync::OnceLock;

use chrono::{Local, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const ISO_PATTERN: &str = r"(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2})(?:Z|[+-]\d{2}:?\d{2})?";

/// The compiled [`ISO_PATTERN`]; `None` only if it fails to compile, in
/// which case no line yields a timestamp.
fn iso_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(ISO_PATTERN).ok())
        .as_ref()
}

/// Current wall-clock time as fractional seconds since the epoch.
pub fn now_epoch() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Parse the first ISO-8601-like timestamp in `line` as local time.
///
/// Only the first match is considered; a malformed first match (e.g. month
/// 13) yields `None` even if a valid one follows. Ambiguous local times
/// (DST fold) resolve to the earlier instant; non-existent ones (DST gap)
/// yield `None`.
pub fn parse_timestamp(line: &str) -> Option<f64> {
    let captures = iso_pattern()?.captures(line)?;
    let fields = captures.get(1)?.as_str();
    let naive = NaiveDateTime::parse_from_str(fields, ISO_FORMAT).ok()?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    Some(local.timestamp() as f64)
}

/// Parse a timestamp from `line`, falling back to the current time.
pub fn extract_timestamp(line: &str) -> f64 {
    parse_timestamp(line).unwrap_or_else(now_epoch)
}
