//! The migration pipeline.
//!
//! [`SyncService::run`] drives one run end to end:
//!
//! 1. prepare the target schema,
//! 2. enumerate candidate symbols (explicit list or everything in the source),
//! 3. per symbol: map to an exchange, read the target cursor (incremental mode), read the
//!    source rows after it, transform them, write them in batches,
//! 4. optionally verify what was written,
//! 5. return a [`RunReport`].
//!
//! Failures are isolated: a bad row is counted and skipped, a failed batch loses only its
//! own rows, an unresolvable symbol is skipped. Only store setup aborts the run
//! ([`SetupError`]). Symbols are processed sequentially; per-symbol counters are folded
//! into the run totals with [`RunStats::merge`].

pub mod stats;
pub mod verify;

use std::time::Instant;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, field, info, info_span, warn};

use crate::error::{Issue, MigrateError, SetupError};
use crate::source::SourceStore;
use crate::symbol::{self, SymbolInfo};
use crate::target::{SeriesKey, TargetStore};
use crate::transform::{self, Interval, TargetBar, VolumeUnit};
use crate::tz;

pub use stats::{RowCounts, RunReport, RunStats, SymbolReport, SymbolStatus};
pub use verify::{Expectation, VerificationReport, VerifyMode};

/// Rows per write transaction unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// How much of the source a run copies.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Every source row; rows already present are skipped by the target.
    Full,
    /// Only rows dated after the latest bar already in the target.
    #[default]
    Incremental,
}

/// Knobs of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    /// Full or incremental.
    pub mode: SyncMode,
    /// Explicit symbols; `None` means every symbol in the source.
    pub symbols: Option<Vec<String>>,
    /// Rows per symbol, earliest first.
    pub limit: Option<usize>,
    /// Number of symbols taken from the candidate list.
    pub max_symbols: Option<usize>,
    /// Unit of the source volume column.
    pub volume_unit: VolumeUnit,
    /// Post-run verification.
    pub verify: VerifyMode,
    /// Rows per write transaction. Must be positive.
    pub batch_size: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            symbols: None,
            limit: None,
            max_symbols: None,
            volume_unit: VolumeUnit::default(),
            verify: VerifyMode::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not started.
    Idle,
    /// Preparing the target and listing symbols.
    Enumerating,
    /// Mapping a symbol to its exchange.
    Mapping,
    /// Reading the cursor and the source rows.
    Reading,
    /// Validating and converting rows.
    Transforming,
    /// Writing batches.
    Writing,
    /// Checking the target.
    Verifying,
    /// Finished with a report.
    Done,
    /// Stopped by a setup error.
    Aborted,
}

/// Copies daily bars from a [`SourceStore`] into a [`TargetStore`].
pub struct SyncService<S, T> {
    source: S,
    target: T,
    options: SyncOptions,
    phase: Phase,
}

struct SymbolOutcome {
    report: SymbolReport,
    expectation: Option<Expectation>,
}

impl<S: SourceStore, T: TargetStore> SyncService<S, T> {
    /// Build a service over two opened stores.
    pub fn new(source: S, target: T, options: SyncOptions) -> Self {
        Self {
            source,
            target,
            options,
            phase: Phase::Idle,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Give the stores back.
    pub fn into_stores(self) -> (S, T) {
        (self.source, self.target)
    }

    /// Execute one run.
    pub fn run(&mut self) -> Result<RunReport, SetupError> {
        let started = Instant::now();
        self.phase = Phase::Enumerating;

        let candidates = match self.prepare() {
            Ok(c) => c,
            Err(e) => {
                self.phase = Phase::Aborted;
                return Err(e);
            }
        };

        let mode = self.options.mode;
        let total = candidates.len();
        info!(?mode, symbols = total, "migration started");

        let mut report = RunReport::new(mode);
        let mut expectations = Vec::new();
        for (i, raw) in candidates.iter().enumerate() {
            let outcome = self.sync_symbol(raw, &mut report.issues);
            let r = &outcome.report;
            info!(
                "[{}/{}] {} {:?}: read={} written={} skipped={} failed={}",
                i + 1,
                total,
                r.vt_symbol.as_deref().unwrap_or(raw),
                r.status,
                r.rows.read,
                r.rows.written,
                r.rows.skipped,
                r.rows.failed,
            );
            expectations.extend(outcome.expectation);
            report.record(raw, outcome.report);
        }

        if self.options.verify != VerifyMode::Off {
            self.phase = Phase::Verifying;
            report.verification = Some(self.verify(&expectations, &mut report.issues));
        }

        report.stats.elapsed_ms = started.elapsed().as_millis() as u64;
        self.phase = Phase::Done;

        let s = &report.stats;
        info!(
            symbols = s.symbols_processed,
            symbols_failed = s.symbols_failed,
            rows_written = s.rows_written,
            rows_skipped = s.rows_skipped,
            rows_failed = s.rows_failed,
            elapsed_ms = s.elapsed_ms,
            "migration finished"
        );
        if !report.is_clean() {
            warn!(issues = report.issues.len(), "migration finished with issues");
        }
        Ok(report)
    }

    fn prepare(&mut self) -> Result<Vec<String>, SetupError> {
        self.target.ensure_schema().map_err(SetupError::Schema)?;

        let mut candidates = match &self.options.symbols {
            Some(list) => list.clone(),
            None => self.source.list_symbols().map_err(SetupError::ListSymbols)?,
        };
        if let Some(max) = self.options.max_symbols {
            candidates.truncate(max);
        }
        Ok(candidates)
    }

    fn sync_symbol(&mut self, raw: &str, issues: &mut Vec<Issue>) -> SymbolOutcome {
        let span = info_span!("sync.symbol", symbol = %raw, exchange = field::Empty);
        let _enter = span.enter();

        self.phase = Phase::Mapping;
        let identity = match symbol::resolve(raw) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "skipping symbol");
                issues.push(Issue::new(raw, &e.into()));
                return SymbolOutcome {
                    report: SymbolReport::failed(None),
                    expectation: None,
                };
            }
        };

        span.record("exchange", identity.exchange.as_str());
        let vt_symbol = identity.vt_symbol();
        match self.migrate_symbol(raw, &identity, issues) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "skipping symbol");
                issues.push(Issue::new(raw, &e));
                SymbolOutcome {
                    report: SymbolReport::failed(Some(vt_symbol)),
                    expectation: None,
                }
            }
        }
    }

    fn migrate_symbol(
        &mut self,
        raw: &str,
        identity: &SymbolInfo,
        issues: &mut Vec<Issue>,
    ) -> Result<SymbolOutcome, MigrateError> {
        let key = SeriesKey {
            symbol: &identity.symbol,
            exchange: identity.exchange,
            interval: Interval::Daily,
        };
        let code = identity.source_code();
        let mut counts = RowCounts::default();

        self.phase = Phase::Reading;
        let cursor: Option<NaiveDate> = match self.options.mode {
            SyncMode::Full => None,
            SyncMode::Incremental => self
                .target
                .latest_datetime(key)
                .map_err(|source| MigrateError::TargetRead {
                    symbol: raw.to_string(),
                    source,
                })?
                .map(|dt| dt.date_naive()),
        };
        let read_failed = |source| MigrateError::SourceRead {
            symbol: raw.to_string(),
            source,
        };

        let mut rows = self.source.read_rows(code, cursor).map_err(read_failed)?;
        if let Some(cursor) = cursor {
            counts.skipped += self
                .source
                .count_rows_through(code, cursor)
                .map_err(read_failed)?;
            // The store filters on date text; drop anything whose parsed date is still
            // at or before the cursor.
            let before = rows.len();
            rows.retain(|r| transform::parse_source_date(&r.date).is_none_or(|d| d > cursor));
            counts.skipped += (before - rows.len()) as u64;
            debug!(%cursor, "incremental cursor");
        }
        if let Some(limit) = self.options.limit {
            rows.truncate(limit);
        }
        counts.read = rows.len() as u64;

        self.phase = Phase::Transforming;
        let repaired = transform::repair_swapped_high_low(&mut rows);
        if repaired > 0 {
            warn!(rows = repaired, "high and low columns look swapped; repaired");
        }

        let mut bars: Vec<TargetBar> = Vec::with_capacity(rows.len());
        let mut excluded = Vec::new();
        for row in &rows {
            match transform::transform(row, identity, self.options.volume_unit) {
                Ok(bar) => bars.push(bar),
                Err(e) => {
                    warn!(error = %e, "rejecting row");
                    excluded.extend(
                        transform::parse_source_date(&row.date)
                            .and_then(|d| tz::market_midnight(d).ok()),
                    );
                    counts.failed += 1;
                    issues.push(Issue::new(raw, &e.into()));
                }
            }
        }
        bars.sort_by_key(|b| b.datetime);

        self.phase = Phase::Writing;
        let mut status = SymbolStatus::Synced;
        let mut handed = 0usize;
        for batch in bars.chunks(self.options.batch_size.max(1)) {
            match self.target.upsert_batch(batch) {
                Ok(outcome) => {
                    debug!(
                        written = outcome.written,
                        skipped = outcome.skipped,
                        "batch committed"
                    );
                    counts.written += outcome.written;
                    counts.skipped += outcome.skipped;
                    handed += batch.len();
                }
                Err(e) => {
                    warn!(error = %e, rows = batch.len(), "batch rolled back");
                    counts.failed += batch.len() as u64;
                    excluded.extend(batch.iter().map(|b| b.datetime));
                    status = SymbolStatus::Partial;
                    issues.push(Issue::new(raw, &e.into()));
                }
            }
        }

        let span = bars
            .first()
            .zip(bars.last())
            .map(|(first, last)| (first.datetime, last.datetime));
        Ok(SymbolOutcome {
            report: SymbolReport {
                vt_symbol: Some(identity.vt_symbol()),
                status,
                rows: counts,
                repaired: repaired as u64,
                first: span.as_ref().map(|(first, _)| tz::to_db_string(first)),
                last: span.as_ref().map(|(_, last)| tz::to_db_string(last)),
            },
            expectation: Some(Expectation {
                symbol: raw.to_string(),
                code: identity.symbol.clone(),
                exchange: identity.exchange,
                handed: handed as u64,
                span,
                excluded,
            }),
        })
    }

    fn verify(
        &mut self,
        expectations: &[Expectation],
        issues: &mut Vec<Issue>,
    ) -> VerificationReport {
        let mut out = VerificationReport::default();
        for i in verify::select(self.options.verify, expectations.len()) {
            let expected = &expectations[i];
            match verify::verify_symbol(&mut self.target, expected) {
                Ok((listed, mismatch)) => {
                    info!(
                        "{}: {} bars, {} .. {}",
                        listed.vt_symbol,
                        listed.count,
                        listed.first.as_deref().unwrap_or("-"),
                        listed.last.as_deref().unwrap_or("-"),
                    );
                    out.checked.push(listed);
                    if let Some(m) = mismatch {
                        warn!(error = %m, "verification failed");
                        issues.push(Issue::new(&expected.symbol, &m.clone().into()));
                        out.mismatches.push(m);
                    }
                }
                Err(source) => {
                    let e = MigrateError::TargetRead {
                        symbol: expected.symbol.clone(),
                        source,
                    };
                    warn!(error = %e, "verification failed");
                    issues.push(Issue::new(&expected.symbol, &e));
                }
            }
        }
        out
    }
}
