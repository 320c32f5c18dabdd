//! Source row -> target bar.
//!
//! [`transform`] is pure: it validates one [`SourceBar`], applies the run's
//! [`VolumeUnit`], and anchors the date to midnight in [`crate::tz::MARKET_TZ`]. A rejected
//! row comes back as a [`ValidationError`] naming the symbol and date; the caller counts it
//! and moves on.

use std::{collections::BTreeMap, fmt, str::FromStr};

use anyhow::bail;
use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::symbol::{Exchange, SymbolInfo};
use crate::tz;

/// Shares per lot on both domestic exchanges.
pub const LOT_SIZE: f64 = 100.0;

/// Fraction of `high < low` rows above which a symbol's high/low columns are treated as
/// swapped at ingestion.
pub const SWAPPED_HIGH_LOW_RATIO: f64 = 0.9;

/// Fewest candidate rows a symbol needs before the swap check applies. Smaller slices
/// (a few new days in an incremental run) are validated row by row.
pub const MIN_SWAP_SAMPLE: usize = 20;

/// One row of the source `daily_data` table, as stored.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceBar {
    /// Source-native symbol.
    pub symbol: String,
    /// Trading date as stored (normally `YYYY-MM-DD`).
    pub date: String,
    /// Opening price.
    pub open: Option<f64>,
    /// Highest price.
    pub high: Option<f64>,
    /// Lowest price.
    pub low: Option<f64>,
    /// Closing price.
    pub close: Option<f64>,
    /// Traded volume, in the unit configured for the run.
    pub volume: Option<f64>,
    /// Traded value.
    pub amount: Option<f64>,
    /// Turnover rate in percent.
    pub turnover_rate: Option<f64>,
}

/// Bar interval. Only daily bars are migrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    /// One trading day.
    #[serde(rename = "1d")]
    Daily,
}

impl Interval {
    /// Code stored in the target table.
    pub const fn as_str(self) -> &'static str {
        match self {
            Interval::Daily => "1d",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of the source volume column. Supplied once per run, never inferred per row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum VolumeUnit {
    /// Volume is already in shares.
    #[default]
    Share,
    /// Volume is in lots of [`LOT_SIZE`] shares.
    Lot,
}

impl VolumeUnit {
    /// Factor converting this unit to shares.
    pub const fn multiplier(self) -> f64 {
        match self {
            VolumeUnit::Share => 1.0,
            VolumeUnit::Lot => LOT_SIZE,
        }
    }

    /// Config/CLI spelling.
    pub const fn as_str(self) -> &'static str {
        match self {
            VolumeUnit::Share => "share",
            VolumeUnit::Lot => "lot",
        }
    }
}

impl FromStr for VolumeUnit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "share" | "shares" => Ok(VolumeUnit::Share),
            "lot" | "lots" => Ok(VolumeUnit::Lot),
            other => bail!("volume unit must be share or lot, got '{other}'"),
        }
    }
}

/// A normalized bar in the target layout.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetBar {
    /// Six-digit code.
    pub symbol: String,
    /// Listing venue.
    pub exchange: Exchange,
    /// Always [`Interval::Daily`].
    pub interval: Interval,
    /// Midnight of the trading date in [`crate::tz::MARKET_TZ`].
    pub datetime: DateTime<Tz>,
    /// Opening price.
    pub open: f64,
    /// Highest price.
    pub high: f64,
    /// Lowest price.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Volume in shares.
    pub volume: f64,
    /// Traded value, when the source had one.
    pub turnover: Option<f64>,
    /// Opaque metadata, written as JSON (NULL when empty).
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl TargetBar {
    /// `"600519.SSE"`.
    pub fn vt_symbol(&self) -> String {
        format!("{}.{}", self.symbol, self.exchange)
    }
}

/// What was wrong with a rejected row.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    /// The date column is not a real calendar date.
    BadDate,
    /// A required column is NULL.
    Missing(&'static str),
    /// A required column is NaN or infinite.
    NotFinite(&'static str),
    /// A price or volume is below zero.
    Negative(&'static str, f64),
    /// `high < low`.
    HighBelowLow {
        /// High price.
        high: f64,
        /// Low price.
        low: f64,
    },
    /// The date has no midnight in the market zone.
    Unanchorable,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::BadDate => write!(f, "date is not a calendar date"),
            ValidationIssue::Missing(field) => write!(f, "{field} is missing"),
            ValidationIssue::NotFinite(field) => write!(f, "{field} is not finite"),
            ValidationIssue::Negative(field, v) => write!(f, "{field} is negative ({v})"),
            ValidationIssue::HighBelowLow { high, low } => {
                write!(f, "high {high} is below low {low}")
            }
            ValidationIssue::Unanchorable => write!(f, "no local midnight for date"),
        }
    }
}

/// A source row that cannot become a bar.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid row {symbol} {date}: {issue}")]
pub struct ValidationError {
    /// Symbol of the offending row.
    pub symbol: String,
    /// Date of the offending row, as stored.
    pub date: String,
    /// What was wrong.
    pub issue: ValidationIssue,
}

/// Parse a source date. Accepts `YYYY-MM-DD`, the same followed by a time part
/// (`" 00:00:00"` / `"T00:00:00"`), and `YYYYMMDD`.
pub fn parse_source_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if s.len() > 10 && matches!(s.as_bytes()[10], b' ' | b'T') {
        if let Some(day) = s.get(..10) {
            return NaiveDate::parse_from_str(day, "%Y-%m-%d").ok();
        }
    }
    if s.len() == 8 {
        return NaiveDate::parse_from_str(s, "%Y%m%d").ok();
    }
    None
}

/// Validate and convert one source row.
pub fn transform(
    row: &SourceBar,
    identity: &SymbolInfo,
    volume_unit: VolumeUnit,
) -> Result<TargetBar, ValidationError> {
    let reject = |issue| ValidationError {
        symbol: row.symbol.clone(),
        date: row.date.clone(),
        issue,
    };

    let date = parse_source_date(&row.date).ok_or_else(|| reject(ValidationIssue::BadDate))?;
    let open = required(row.open, "open").map_err(reject)?;
    let high = required(row.high, "high").map_err(reject)?;
    let low = required(row.low, "low").map_err(reject)?;
    let close = required(row.close, "close").map_err(reject)?;
    let volume = required(row.volume, "volume").map_err(reject)?;

    if high < low {
        return Err(reject(ValidationIssue::HighBelowLow { high, low }));
    }

    let datetime = tz::market_midnight(date).map_err(|_| reject(ValidationIssue::Unanchorable))?;

    let mut extra = BTreeMap::new();
    if let Some(rate) = row.turnover_rate.filter(|v| v.is_finite()) {
        extra.insert("turnover_rate".to_string(), serde_json::Value::from(rate));
    }

    Ok(TargetBar {
        symbol: identity.symbol.clone(),
        exchange: identity.exchange,
        interval: Interval::Daily,
        datetime,
        open,
        high,
        low,
        close,
        volume: volume * volume_unit.multiplier(),
        turnover: row.amount.filter(|v| v.is_finite()),
        extra,
    })
}

fn required(value: Option<f64>, field: &'static str) -> Result<f64, ValidationIssue> {
    let v = value.ok_or(ValidationIssue::Missing(field))?;
    if !v.is_finite() {
        return Err(ValidationIssue::NotFinite(field));
    }
    if v < 0.0 {
        return Err(ValidationIssue::Negative(field, v));
    }
    Ok(v)
}

/// Swap `high` and `low` on every row when there are at least [`MIN_SWAP_SAMPLE`] rows and
/// more than [`SWAPPED_HIGH_LOW_RATIO`] of them have `high < low`, the signature of a
/// column mix-up at ingestion.
///
/// Returns the number of rows swapped (0 when the threshold is not met).
pub fn repair_swapped_high_low(rows: &mut [SourceBar]) -> usize {
    if rows.len() < MIN_SWAP_SAMPLE {
        return 0;
    }
    let inverted = rows
        .iter()
        .filter(|r| matches!((r.high, r.low), (Some(h), Some(l)) if h < l))
        .count();
    if (inverted as f64) / (rows.len() as f64) <= SWAPPED_HIGH_LOW_RATIO {
        return 0;
    }
    for row in rows.iter_mut() {
        std::mem::swap(&mut row.high, &mut row.low);
    }
    rows.len()
}
