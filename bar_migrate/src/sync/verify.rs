//! Post-run verification.
//!
//! For each checked symbol the target must hold, within the datetime span of the bars
//! handed to it, exactly as many bars as were handed (newly written plus already present).
//! Bars stored at dates the run read but did not hand over (rejected rows, rolled back
//! batches) are left out of that count. Every checked symbol is also listed with its total
//! count and first/last datetime.

use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::symbol::Exchange;
use crate::target::{SeriesKey, TargetStore};
use crate::transform::Interval;
use crate::tz;

/// Which symbols to verify after the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMode {
    /// No verification.
    #[default]
    Off,
    /// Every symbol that was synced.
    All,
    /// An evenly spread sample of at most this many symbols.
    Sample(usize),
}

/// What one synced symbol should look like in the target.
#[derive(Debug, Clone)]
pub struct Expectation {
    /// Symbol as given to the run.
    pub symbol: String,
    /// Six-digit code.
    pub code: String,
    /// Listing venue.
    pub exchange: Exchange,
    /// Valid bars handed to the target.
    pub handed: u64,
    /// Datetime span of the handed bars; `None` when nothing was handed.
    pub span: Option<(DateTime<Tz>, DateTime<Tz>)>,
    /// Dates read from the source but not handed to the target.
    pub excluded: Vec<DateTime<Tz>>,
}

impl Expectation {
    fn key(&self) -> SeriesKey<'_> {
        SeriesKey {
            symbol: &self.code,
            exchange: self.exchange,
            interval: Interval::Daily,
        }
    }
}

/// The target disagrees with what the run handed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("verification mismatch for {vt_symbol}: expected {expected} bars, found {actual}")]
pub struct VerificationMismatch {
    /// `"600519.SSE"`.
    pub vt_symbol: String,
    /// Bars handed to the target.
    pub expected: u64,
    /// Bars found in the handed span.
    pub actual: u64,
}

/// Listing line for one checked symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedSymbol {
    /// `"600519.SSE"`.
    pub vt_symbol: String,
    /// Total bars stored for the series.
    pub count: u64,
    /// Earliest stored bar.
    pub first: Option<String>,
    /// Latest stored bar.
    pub last: Option<String>,
}

/// Result of the verification step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// Checked symbols, in processing order.
    pub checked: Vec<VerifiedSymbol>,
    /// Symbols whose counts disagree.
    pub mismatches: Vec<VerificationMismatch>,
}

/// Indices of the symbols `mode` selects out of `total`.
///
/// `Sample(n)` spreads `n` picks evenly, always starting with the first symbol, so the
/// selection is stable across runs.
pub fn select(mode: VerifyMode, total: usize) -> Vec<usize> {
    match mode {
        VerifyMode::Off => Vec::new(),
        VerifyMode::All => (0..total).collect(),
        VerifyMode::Sample(n) if n == 0 || total == 0 => Vec::new(),
        VerifyMode::Sample(n) if n >= total => (0..total).collect(),
        VerifyMode::Sample(n) => (0..n).map(|i| i * total / n).collect(),
    }
}

/// Check one symbol against the target.
pub fn verify_symbol<T: TargetStore + ?Sized>(
    target: &mut T,
    expected: &Expectation,
) -> anyhow::Result<(VerifiedSymbol, Option<VerificationMismatch>)> {
    let key = expected.key();
    let overview = target.overview(key)?;
    let listed = VerifiedSymbol {
        vt_symbol: key.vt_symbol(),
        count: overview.count,
        first: overview.start.as_ref().map(tz::to_db_string),
        last: overview.end.as_ref().map(tz::to_db_string),
    };

    let actual = match &expected.span {
        Some((start, end)) => {
            let excluded: Vec<DateTime<Tz>> = expected
                .excluded
                .iter()
                .filter(|dt| *dt >= start && *dt <= end)
                .copied()
                .collect();
            let in_span = target.count_between(key, start, end)?;
            in_span.saturating_sub(target.count_at(key, &excluded)?)
        }
        None => 0,
    };
    let mismatch = (actual != expected.handed).then(|| VerificationMismatch {
        vt_symbol: key.vt_symbol(),
        expected: expected.handed,
        actual,
    });

    Ok((listed, mismatch))
}
