// ── Remote timestamps ──
//
// The remote sends ISO-8601 timestamps with anywhere from zero to seven
// fractional digits (`2025-03-07T16:35:07.3687629+00:00`). Everything past
// whole seconds is dropped before parsing and the result is taken as UTC.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta, Utc};

use crate::error::CoreError;

const WHOLE_SECONDS_LEN: usize = 19;
const WHOLE_SECONDS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parse a remote timestamp, truncated to whole seconds, as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CoreError> {
    let whole: String = raw.chars().take(WHOLE_SECONDS_LEN).collect();
    NaiveDateTime::parse_from_str(&whole, WHOLE_SECONDS_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| CoreError::InvalidTimestamp {
            value: raw.to_owned(),
            reason: e.to_string(),
        })
}

/// Time elapsed between `observed` and `now`. The remote clock is
/// sometimes ahead of ours, so future timestamps count as zero.
pub fn event_age(observed: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - observed)
        .max(TimeDelta::zero())
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Render a timestamp in the configured display offset.
pub fn display_in(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset)
        .format("%Y-%m-%d %H:%M:%S %:z")
        .to_string()
}
