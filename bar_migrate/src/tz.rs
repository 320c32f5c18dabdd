//! Regional time zone helpers.
//!
//! Bars are anchored to [`MARKET_TZ`] (Asia/Shanghai). In memory a bar's timestamp is a
//! zone-qualified `DateTime<Tz>`; in the target table it is stored as naive wall-clock text
//! (`YYYY-MM-DD HH:MM:SS`), which is what the trading platform reads back and re-localizes.
//!
//! Notes:
//! - Shanghai has not observed DST since 1991, so any trading-day midnight maps to a
//!   single instant. Older wall times can be ambiguous or nonexistent; [`localize`] takes
//!   a [`DstPolicy`] for those.
//! - The stored text sorts chronologically, which the `MAX(datetime)` cursor relies on.

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

/// Zone every bar timestamp is anchored to.
pub const MARKET_TZ: Tz = chrono_tz::Asia::Shanghai;

/// Storage format of `dbbardata.datetime`.
pub const DB_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Policy for wall times that do not map to exactly one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DstPolicy {
    /// Error on ambiguous or nonexistent local times.
    Strict,
    /// For ambiguous local times pick the earlier instant; nonexistent times still error.
    PreferEarliest,
}

/// Attach [`MARKET_TZ`] to a naive wall time.
pub fn localize(naive: NaiveDateTime, policy: DstPolicy) -> anyhow::Result<DateTime<Tz>> {
    use chrono::offset::LocalResult::*;
    match MARKET_TZ.from_local_datetime(&naive) {
        Single(dt) => Ok(dt),
        Ambiguous(earliest, _) => match policy {
            DstPolicy::PreferEarliest => Ok(earliest),
            DstPolicy::Strict => Err(anyhow!("ambiguous local time {naive} in {MARKET_TZ}")),
        },
        None => Err(anyhow!("nonexistent local time {naive} in {MARKET_TZ}")),
    }
}

/// Midnight of `date` in [`MARKET_TZ`].
pub fn market_midnight(date: NaiveDate) -> anyhow::Result<DateTime<Tz>> {
    localize(date.and_time(chrono::NaiveTime::MIN), DstPolicy::Strict)
}

/// Encode a timestamp as stored in the target table (wall-clock time in [`MARKET_TZ`]).
pub fn to_db_string<Z: TimeZone>(dt: &DateTime<Z>) -> String {
    dt.with_timezone(&MARKET_TZ)
        .format(DB_DATETIME_FORMAT)
        .to_string()
}

/// Decode a stored `dbbardata.datetime` value.
///
/// Accepts the canonical format, fractional seconds, and a bare date (midnight).
pub fn parse_db_datetime(s: &str) -> anyhow::Result<DateTime<Tz>> {
    let s = s.trim();
    let naive = NaiveDateTime::parse_from_str(s, DB_DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .with_context(|| format!("bad stored datetime: {s}"))?;
    localize(naive, DstPolicy::PreferEarliest)
}
