// ⏰ Temporal helpers - storage encoding + caller-facing rendering
//
// Two representations of every timestamp:
// 1. Stored: RFC 3339 UTC with millisecond precision (sorts lexicographically)
// 2. Rendered: "<date> <time>" in the caller's timezone, for listings

use chrono::{DateTime, FixedOffset, Offset, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Largest offset any real timezone uses (UTC+14:00)
pub const MAX_OFFSET_MINUTES: i32 = 14 * 60;

// ============================================================================
// STORAGE ENCODING
// ============================================================================

/// Encode for a TEXT column. Fixed width, so ORDER BY on the text is time order.
pub fn to_stored(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn from_stored(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Client submission times arrive as epoch milliseconds
pub fn from_epoch_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

// ============================================================================
// CALLER TIMEZONE
// ============================================================================

/// Timezone the caller wants timestamps rendered in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerTimeZone {
    offset: FixedOffset,
}

impl CallerTimeZone {
    pub fn utc() -> Self {
        CallerTimeZone { offset: Utc.fix() }
    }

    /// Offset in minutes east of UTC; None when outside ±14h
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        if minutes.abs() > MAX_OFFSET_MINUTES {
            return None;
        }
        FixedOffset::east_opt(minutes * 60).map(|offset| CallerTimeZone { offset })
    }

    pub fn offset_minutes(&self) -> i32 {
        self.offset.local_minus_utc() / 60
    }

    /// Render a timestamp as the date/time pair shown next to every entry
    pub fn render(&self, ts: DateTime<Utc>) -> FormattedDateTime {
        let local = ts.with_timezone(&self.offset);
        FormattedDateTime {
            date_string: local.format("%m/%d/%Y").to_string(),
            time_string: local.format("%-I:%M:%S %p").to_string(),
        }
    }
}

impl Default for CallerTimeZone {
    fn default() -> Self {
        Self::utc()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedDateTime {
    pub date_string: String,
    pub time_string: String,
}

impl std::fmt::Display for FormattedDateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.date_string, self.time_string)
    }
}

// ============================================================================
// TESTS
// ============================================================================
