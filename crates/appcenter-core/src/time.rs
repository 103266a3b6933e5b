//! Unix-second timestamps used by catalog records.

use time::{Duration, OffsetDateTime};

/// Current UTC time as unix seconds.
pub fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// UTC unix seconds `days` from now.
pub fn unix_after_days(days: i64) -> i64 {
    (OffsetDateTime::now_utc() + Duration::days(days)).unix_timestamp()
}
