#![allow(dead_code)]

use std::path::PathBuf;

use bar_migrate::models::StoredBar;
use bar_migrate::schema::daily_data;
use bar_migrate::source::{SqliteSourceStore, StoreResult};
use bar_migrate::symbol;
use bar_migrate::sync::{SyncOptions, SyncService};
use bar_migrate::target::{
    BarOverview, SeriesKey, SqliteTargetStore, TargetStore, WriteError, WriteOutcome,
};
use bar_migrate::transform::{Interval, SourceBar, TargetBar};
use chrono::DateTime;
use chrono_tz::Tz;
use diesel::prelude::*;
use diesel::sql_query;
use tempfile::TempDir;

pub struct TestEnv {
    _dir: TempDir,           // keep alive for the life of the test
    pub source_path: String, // <tmpdir>/source.db
    pub target_path: String, // <tmpdir>/target.db
}

/// Temp dir with an empty `daily_data` table in the source database.
pub fn setup() -> TestEnv {
    let dir = TempDir::new().expect("tempdir");
    let path = |name: &str| {
        let mut p = PathBuf::from(dir.path());
        p.push(name);
        p.to_string_lossy().to_string()
    };
    let env = TestEnv {
        source_path: path("source.db"),
        target_path: path("target.db"),
        _dir: dir,
    };

    let mut conn = source_conn(&env);
    sql_query(
        "CREATE TABLE daily_data (
            symbol TEXT NOT NULL,
            date TEXT NOT NULL,
            open REAL,
            high REAL,
            low REAL,
            close REAL,
            volume REAL,
            amount REAL,
            turnover_rate REAL,
            PRIMARY KEY (symbol, date)
        )",
    )
    .execute(&mut conn)
    .expect("create daily_data");
    env
}

/// Writable connection to the source database (the ingestion side's view).
pub fn source_conn(env: &TestEnv) -> SqliteConnection {
    SqliteConnection::establish(&env.source_path).expect("open source")
}

/// A well-formed source row.
pub fn row(symbol: &str, date: &str, volume: f64) -> SourceBar {
    SourceBar {
        symbol: symbol.into(),
        date: date.into(),
        open: Some(10.0),
        high: Some(11.0),
        low: Some(9.5),
        close: Some(10.5),
        volume: Some(volume),
        amount: Some(volume * 10.0),
        turnover_rate: Some(0.25),
    }
}

pub fn seed(env: &TestEnv, rows: &[SourceBar]) {
    use daily_data::dsl as dd;
    let mut conn = source_conn(env);
    for r in rows {
        diesel::insert_into(dd::daily_data)
            .values((
                dd::symbol.eq(&r.symbol),
                dd::date.eq(&r.date),
                dd::open.eq(r.open),
                dd::high.eq(r.high),
                dd::low.eq(r.low),
                dd::close.eq(r.close),
                dd::volume.eq(r.volume),
                dd::amount.eq(r.amount),
                dd::turnover_rate.eq(r.turnover_rate),
            ))
            .execute(&mut conn)
            .expect("seed daily_data");
    }
}

pub fn source(env: &TestEnv) -> SqliteSourceStore {
    SqliteSourceStore::open(&env.source_path).expect("open source read-only")
}

pub fn target(env: &TestEnv) -> SqliteTargetStore {
    SqliteTargetStore::open(&env.target_path).expect("open target")
}

pub fn service(
    env: &TestEnv,
    options: SyncOptions,
) -> SyncService<SqliteSourceStore, SqliteTargetStore> {
    SyncService::new(source(env), target(env), options)
}

pub fn key(code: &str) -> SeriesKey<'_> {
    SeriesKey {
        symbol: code,
        exchange: symbol::resolve(code).expect("known code").exchange,
        interval: Interval::Daily,
    }
}

/// Bars of one series as stored in the target.
pub fn stored(env: &TestEnv, code: &str) -> Vec<StoredBar> {
    target(env).bars(key(code)).expect("read target bars")
}

/// A [`TargetStore`] that can be told to misbehave.
pub struct FlakyTarget {
    pub inner: SqliteTargetStore,
    pub calls: usize,
    /// 1-based `upsert_batch` calls that fail.
    pub fail_calls: Vec<usize>,
    /// Report batches as written without writing them.
    pub swallow_writes: bool,
    pub fail_schema: bool,
}

impl FlakyTarget {
    pub fn new(inner: SqliteTargetStore) -> Self {
        Self {
            inner,
            calls: 0,
            fail_calls: Vec::new(),
            swallow_writes: false,
            fail_schema: false,
        }
    }
}

impl TargetStore for FlakyTarget {
    fn ensure_schema(&mut self) -> anyhow::Result<()> {
        if self.fail_schema {
            anyhow::bail!("database is locked");
        }
        self.inner.ensure_schema()
    }

    fn upsert_batch(&mut self, rows: &[TargetBar]) -> Result<WriteOutcome, WriteError> {
        self.calls += 1;
        if self.fail_calls.contains(&self.calls) {
            return Err(WriteError::Database {
                rows: rows.len(),
                source: diesel::result::Error::RollbackTransaction,
            });
        }
        if self.swallow_writes {
            return Ok(WriteOutcome {
                written: rows.len() as u64,
                skipped: 0,
            });
        }
        self.inner.upsert_batch(rows)
    }

    fn latest_datetime(&mut self, key: SeriesKey<'_>) -> StoreResult<Option<DateTime<Tz>>> {
        self.inner.latest_datetime(key)
    }

    fn count_between(
        &mut self,
        key: SeriesKey<'_>,
        start: &DateTime<Tz>,
        end: &DateTime<Tz>,
    ) -> StoreResult<u64> {
        self.inner.count_between(key, start, end)
    }

    fn count_at(&mut self, key: SeriesKey<'_>, datetimes: &[DateTime<Tz>]) -> StoreResult<u64> {
        self.inner.count_at(key, datetimes)
    }

    fn overview(&mut self, key: SeriesKey<'_>) -> StoreResult<BarOverview> {
        self.inner.overview(key)
    }
}
