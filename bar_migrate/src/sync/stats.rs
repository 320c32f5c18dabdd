//! Run counters and the per-symbol / per-run reports.

use indexmap::IndexMap;
use serde::Serialize;

use super::SyncMode;
use super::verify::VerificationReport;
use crate::error::Issue;

/// Row counters for one symbol (or a whole run).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowCounts {
    /// Source rows considered for writing.
    pub read: u64,
    /// Bars newly inserted.
    pub written: u64,
    /// Rows not written because the target already has them.
    pub skipped: u64,
    /// Rows rejected by validation or lost with a failed batch.
    pub failed: u64,
}

/// Outcome of one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolStatus {
    /// Every row was written, skipped as present, or rejected by validation.
    Synced,
    /// At least one batch failed to commit.
    Partial,
    /// Nothing was attempted (unresolvable symbol or read failure).
    Failed,
}

/// What happened to one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolReport {
    /// `"600519.SSE"`, absent when the symbol did not resolve.
    pub vt_symbol: Option<String>,
    /// Outcome.
    pub status: SymbolStatus,
    /// Row counters.
    #[serde(flatten)]
    pub rows: RowCounts,
    /// Rows whose high/low columns were swapped back before validation.
    #[serde(skip_serializing_if = "is_zero")]
    pub repaired: u64,
    /// First bar handed to the target, as stored.
    pub first: Option<String>,
    /// Last bar handed to the target, as stored.
    pub last: Option<String>,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl SymbolReport {
    /// A symbol nothing was attempted for.
    pub fn failed(vt_symbol: Option<String>) -> Self {
        Self {
            vt_symbol,
            status: SymbolStatus::Failed,
            rows: RowCounts::default(),
            repaired: 0,
            first: None,
            last: None,
        }
    }
}

/// Aggregate counters of a run.
///
/// Partial stats (one per symbol, or one per worker) combine with [`RunStats::merge`];
/// merging is associative and commutative apart from `elapsed_ms`, which takes the max.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Symbols attempted, including failed ones.
    pub symbols_processed: u64,
    /// Symbols skipped as a whole.
    pub symbols_failed: u64,
    /// Source rows considered for writing.
    pub rows_read: u64,
    /// Bars newly inserted.
    pub rows_written: u64,
    /// Rows already present in the target.
    pub rows_skipped: u64,
    /// Rows rejected or lost with a failed batch.
    pub rows_failed: u64,
    /// Wall time of the run in milliseconds.
    pub elapsed_ms: u64,
}

impl RunStats {
    /// Stats contributed by a single symbol.
    pub fn of_symbol(report: &SymbolReport) -> Self {
        Self {
            symbols_processed: 1,
            symbols_failed: u64::from(report.status == SymbolStatus::Failed),
            rows_read: report.rows.read,
            rows_written: report.rows.written,
            rows_skipped: report.rows.skipped,
            rows_failed: report.rows.failed,
            elapsed_ms: 0,
        }
    }

    /// Fold `other` into `self`.
    pub fn merge(&mut self, other: &RunStats) {
        self.symbols_processed += other.symbols_processed;
        self.symbols_failed += other.symbols_failed;
        self.rows_read += other.rows_read;
        self.rows_written += other.rows_written;
        self.rows_skipped += other.rows_skipped;
        self.rows_failed += other.rows_failed;
        self.elapsed_ms = self.elapsed_ms.max(other.elapsed_ms);
    }
}

/// Everything a run produced, printed as the JSON summary.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Mode the run used.
    pub mode: SyncMode,
    /// Aggregate counters.
    pub stats: RunStats,
    /// Per-symbol outcome, keyed by the symbol as given, in processing order.
    pub symbols: IndexMap<String, SymbolReport>,
    /// Non-fatal problems, in the order they happened.
    pub issues: Vec<Issue>,
    /// Present when verification ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationReport>,
}

impl RunReport {
    /// An empty report for a run in `mode`.
    pub fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            stats: RunStats::default(),
            symbols: IndexMap::new(),
            issues: Vec::new(),
            verification: None,
        }
    }

    /// Add one symbol's outcome.
    pub fn record(&mut self, symbol: &str, report: SymbolReport) {
        self.stats.merge(&RunStats::of_symbol(&report));
        self.symbols.insert(symbol.to_string(), report);
    }

    /// Whether the run recorded no issue at all.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}
