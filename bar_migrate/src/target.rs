//! Write side: the trading platform's `dbbardata` table.
//!
//! ## Idempotence
//! The natural key `(symbol, exchange, interval, datetime)` carries a unique index.
//! Inserts use `ON CONFLICT (..) DO NOTHING` on exactly that key, so a bar that is already
//! present is left untouched and counted as skipped, while any other constraint violation
//! still fails the batch.
//!
//! ## Adopted tables
//! A `dbbardata` created by the platform or an older loader is kept as is.
//! [`TargetStore::ensure_schema`] adds the `gateway_name` and `extra` columns when they are
//! missing, and when that table declares `turnover` NOT NULL a missing turnover is written
//! as 0.
//!
//! ## Transactions
//! Each [`TargetStore::upsert_batch`] call runs inside one `BEGIN IMMEDIATE` transaction.
//! A failed batch rolls back on its own; batches committed earlier in the run stay durable.

use chrono::DateTime;
use chrono_tz::Tz;
use diesel::dsl::{count_star, max, min};
use diesel::prelude::*;

use crate::db::connection::connect_sqlite;
use crate::db::migrate::{self, BarTableLayout};
use crate::models::{NewBarRow, StoredBar};
use crate::schema::dbbardata::{self, dsl as bd};
use crate::source::StoreResult;
use crate::symbol::Exchange;
use crate::transform::{Interval, TargetBar};
use crate::tz;

/// Bind parameters per `count_at` query.
const COUNT_AT_CHUNK: usize = 500;

/// Identifies one bar series in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesKey<'a> {
    /// Six-digit code.
    pub symbol: &'a str,
    /// Listing venue.
    pub exchange: Exchange,
    /// Bar interval.
    pub interval: Interval,
}

impl SeriesKey<'_> {
    /// `"600519.SSE"`.
    pub fn vt_symbol(&self) -> String {
        format!("{}.{}", self.symbol, self.exchange)
    }
}

/// Counts from one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Newly inserted bars.
    pub written: u64,
    /// Bars whose natural key was already present.
    pub skipped: u64,
}

/// A batch could not be committed.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The metadata blob could not be encoded.
    #[error("cannot encode metadata for {vt_symbol}")]
    Encode {
        /// Offending series.
        vt_symbol: String,
        /// Encoder error.
        #[source]
        source: serde_json::Error,
    },
    /// The database rejected the batch.
    #[error("batch of {rows} bars failed")]
    Database {
        /// Size of the rolled back batch.
        rows: usize,
        /// Database error.
        #[source]
        source: diesel::result::Error,
    },
}

/// Row count and datetime span of a series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarOverview {
    /// Number of bars.
    pub count: u64,
    /// Earliest bar.
    pub start: Option<DateTime<Tz>>,
    /// Latest bar.
    pub end: Option<DateTime<Tz>>,
}

/// The target store contract.
pub trait TargetStore {
    /// Create the bar table and its unique index if absent, or adopt an existing one.
    /// Safe on every startup.
    fn ensure_schema(&mut self) -> anyhow::Result<()>;

    /// Insert `rows` in one transaction, leaving existing natural keys untouched.
    fn upsert_batch(&mut self, rows: &[TargetBar]) -> Result<WriteOutcome, WriteError>;

    /// Latest stored datetime of a series; `None` when it was never synced.
    fn latest_datetime(&mut self, key: SeriesKey<'_>) -> StoreResult<Option<DateTime<Tz>>>;

    /// Number of bars of a series with `start <= datetime <= end`.
    fn count_between(
        &mut self,
        key: SeriesKey<'_>,
        start: &DateTime<Tz>,
        end: &DateTime<Tz>,
    ) -> StoreResult<u64>;

    /// Number of bars of a series stored at any of `datetimes`.
    fn count_at(&mut self, key: SeriesKey<'_>, datetimes: &[DateTime<Tz>]) -> StoreResult<u64>;

    /// Count and span of a series.
    fn overview(&mut self, key: SeriesKey<'_>) -> StoreResult<BarOverview>;
}

/// [`TargetStore`] over a SQLite file.
pub struct SqliteTargetStore {
    conn: SqliteConnection,
    layout: BarTableLayout,
}

impl SqliteTargetStore {
    /// Open (creating if needed) the target database.
    pub fn open(path: &str) -> anyhow::Result<Self> {
        Ok(Self::from_connection(connect_sqlite(path)?))
    }

    /// Wrap an already open connection.
    pub fn from_connection(conn: SqliteConnection) -> Self {
        Self {
            conn,
            layout: BarTableLayout::default(),
        }
    }

    /// All bars of a series, ascending by datetime.
    pub fn bars(&mut self, key: SeriesKey<'_>) -> StoreResult<Vec<StoredBar>> {
        let rows = bd::dbbardata
            .filter(bd::symbol.eq(key.symbol))
            .filter(bd::exchange.eq(key.exchange.as_str()))
            .filter(bd::interval.eq(key.interval.as_str()))
            .order(bd::datetime.asc())
            .select(StoredBar::as_select())
            .load(&mut self.conn)?;
        Ok(rows)
    }

    /// Total number of bars in the table.
    pub fn total_count(&mut self) -> StoreResult<u64> {
        let n: i64 = bd::dbbardata.count().get_result(&mut self.conn)?;
        Ok(n as u64)
    }
}

impl TargetStore for SqliteTargetStore {
    fn ensure_schema(&mut self) -> anyhow::Result<()> {
        migrate::run_pending(&mut self.conn)?;
        self.layout = migrate::adopt_bar_table(&mut self.conn)?;
        Ok(())
    }

    fn upsert_batch(&mut self, rows: &[TargetBar]) -> Result<WriteOutcome, WriteError> {
        if rows.is_empty() {
            return Ok(WriteOutcome::default());
        }

        let turnover_required = self.layout.turnover_required;
        let new_rows = rows
            .iter()
            .map(|bar| {
                let mut row = NewBarRow::from_bar(bar).map_err(|source| WriteError::Encode {
                    vt_symbol: bar.vt_symbol(),
                    source,
                })?;
                if turnover_required {
                    row.turnover.get_or_insert(0.0);
                }
                Ok(row)
            })
            .collect::<Result<Vec<_>, WriteError>>()?;

        let written = self
            .conn
            .immediate_transaction::<_, diesel::result::Error, _>(|conn| {
                let mut written = 0u64;
                for row in &new_rows {
                    written += diesel::insert_into(dbbardata::table)
                        .values(row)
                        .on_conflict((bd::symbol, bd::exchange, bd::interval, bd::datetime))
                        .do_nothing()
                        .execute(conn)? as u64;
                }
                Ok(written)
            })
            .map_err(|source| WriteError::Database {
                rows: rows.len(),
                source,
            })?;

        Ok(WriteOutcome {
            written,
            skipped: rows.len() as u64 - written,
        })
    }

    fn latest_datetime(&mut self, key: SeriesKey<'_>) -> StoreResult<Option<DateTime<Tz>>> {
        let latest: Option<String> = bd::dbbardata
            .filter(bd::symbol.eq(key.symbol))
            .filter(bd::exchange.eq(key.exchange.as_str()))
            .filter(bd::interval.eq(key.interval.as_str()))
            .select(max(bd::datetime))
            .first(&mut self.conn)?;
        latest.as_deref().map(tz::parse_db_datetime).transpose()
    }

    fn count_between(
        &mut self,
        key: SeriesKey<'_>,
        start: &DateTime<Tz>,
        end: &DateTime<Tz>,
    ) -> StoreResult<u64> {
        let n: i64 = bd::dbbardata
            .filter(bd::symbol.eq(key.symbol))
            .filter(bd::exchange.eq(key.exchange.as_str()))
            .filter(bd::interval.eq(key.interval.as_str()))
            .filter(bd::datetime.ge(tz::to_db_string(start)))
            .filter(bd::datetime.le(tz::to_db_string(end)))
            .count()
            .get_result(&mut self.conn)?;
        Ok(n as u64)
    }

    fn count_at(&mut self, key: SeriesKey<'_>, datetimes: &[DateTime<Tz>]) -> StoreResult<u64> {
        let mut wanted: Vec<String> = datetimes.iter().map(tz::to_db_string).collect();
        wanted.sort();
        wanted.dedup();

        let mut total = 0u64;
        for chunk in wanted.chunks(COUNT_AT_CHUNK) {
            let n: i64 = bd::dbbardata
                .filter(bd::symbol.eq(key.symbol))
                .filter(bd::exchange.eq(key.exchange.as_str()))
                .filter(bd::interval.eq(key.interval.as_str()))
                .filter(bd::datetime.eq_any(chunk.to_vec()))
                .count()
                .get_result(&mut self.conn)?;
            total += n as u64;
        }
        Ok(total)
    }

    fn overview(&mut self, key: SeriesKey<'_>) -> StoreResult<BarOverview> {
        let (count, start, end): (i64, Option<String>, Option<String>) = bd::dbbardata
            .filter(bd::symbol.eq(key.symbol))
            .filter(bd::exchange.eq(key.exchange.as_str()))
            .filter(bd::interval.eq(key.interval.as_str()))
            .select((count_star(), min(bd::datetime), max(bd::datetime)))
            .first(&mut self.conn)?;
        Ok(BarOverview {
            count: count as u64,
            start: start.as_deref().map(tz::parse_db_datetime).transpose()?,
            end: end.as_deref().map(tz::parse_db_datetime).transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol;
    use diesel::connection::SimpleConnection;
    use crate::transform::{SourceBar, VolumeUnit, transform};

    fn store() -> SqliteTargetStore {
        let mut s = SqliteTargetStore::from_connection(
            SqliteConnection::establish(":memory:").unwrap(),
        );
        s.ensure_schema().unwrap();
        s
    }

    fn bar(code: &str, date: &str, volume: f64) -> TargetBar {
        let src = SourceBar {
            symbol: code.into(),
            date: date.into(),
            open: Some(1.0),
            high: Some(2.0),
            low: Some(0.5),
            close: Some(1.5),
            volume: Some(volume),
            amount: None,
            turnover_rate: None,
        };
        transform(&src, &symbol::resolve(code).unwrap(), VolumeUnit::Share).unwrap()
    }

    fn key(code: &str) -> SeriesKey<'_> {
        SeriesKey {
            symbol: code,
            exchange: symbol::resolve(code).unwrap().exchange,
            interval: Interval::Daily,
        }
    }

    #[test]
    fn ensure_schema_is_idempotent() {
        let mut s = store();
        s.ensure_schema().unwrap();
        s.ensure_schema().unwrap();
        assert_eq!(s.total_count().unwrap(), 0);
    }

    #[test]
    fn duplicate_keys_are_skipped_not_overwritten() {
        let mut s = store();
        let first = s
            .upsert_batch(&[bar("600519", "2024-01-02", 100.0), bar("600519", "2024-01-03", 200.0)])
            .unwrap();
        assert_eq!(first, WriteOutcome { written: 2, skipped: 0 });

        // Same key, different volume: the stored row must keep the original value.
        let second = s
            .upsert_batch(&[bar("600519", "2024-01-02", 999.0), bar("600519", "2024-01-04", 300.0)])
            .unwrap();
        assert_eq!(second, WriteOutcome { written: 1, skipped: 1 });

        let stored = s.bars(key("600519")).unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].volume, 100.0);
        assert_eq!(stored[0].datetime, "2024-01-02 00:00:00");
    }

    #[test]
    fn same_date_on_other_exchange_is_a_different_key() {
        let mut s = store();
        let mut sz = bar("600519", "2024-01-02", 1.0);
        sz.exchange = Exchange::Szse;
        let out = s
            .upsert_batch(&[bar("600519", "2024-01-02", 1.0), sz])
            .unwrap();
        assert_eq!(out.written, 2);
    }

    #[test]
    fn latest_datetime_and_overview() {
        let mut s = store();
        assert_eq!(s.latest_datetime(key("000001")).unwrap(), None);

        s.upsert_batch(&[
            bar("000001", "2024-01-03", 1.0),
            bar("000001", "2024-01-02", 1.0),
            bar("600000", "2024-02-01", 1.0),
        ])
        .unwrap();

        let latest = s.latest_datetime(key("000001")).unwrap().unwrap();
        assert_eq!(tz::to_db_string(&latest), "2024-01-03 00:00:00");

        let ov = s.overview(key("000001")).unwrap();
        assert_eq!(ov.count, 2);
        assert_eq!(tz::to_db_string(&ov.start.unwrap()), "2024-01-02 00:00:00");

        let empty = s.overview(key("300750")).unwrap();
        assert_eq!(empty, BarOverview { count: 0, start: None, end: None });

        let start = bar("000001", "2024-01-03", 1.0).datetime;
        assert_eq!(s.count_between(key("000001"), &start, &start).unwrap(), 1);

        let missing = bar("000001", "2024-01-05", 1.0).datetime;
        assert_eq!(
            s.count_at(key("000001"), &[start, start, missing]).unwrap(),
            1
        );
        assert_eq!(s.count_at(key("000001"), &[]).unwrap(), 0);
    }

    #[test]
    fn non_key_constraint_violation_fails_the_whole_batch() {
        let mut s = store();
        let mut bad = bar("600519", "2024-01-03", 1.0);
        bad.open = f64::NAN; // NaN binds as NULL and violates NOT NULL

        let err = s
            .upsert_batch(&[bar("600519", "2024-01-02", 1.0), bad])
            .unwrap_err();
        assert!(matches!(err, WriteError::Database { rows: 2, .. }));
        assert_eq!(s.total_count().unwrap(), 0, "batch must roll back");
    }

    #[test]
    fn adopted_table_gets_metadata_columns_and_zero_turnover() {
        let mut s = SqliteTargetStore::from_connection(
            SqliteConnection::establish(":memory:").unwrap(),
        );
        s.conn
            .batch_execute(
                "CREATE TABLE dbbardata (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    symbol TEXT NOT NULL,
                    exchange TEXT NOT NULL,
                    datetime TEXT NOT NULL,
                    interval TEXT NOT NULL,
                    volume REAL NOT NULL,
                    turnover REAL NOT NULL,
                    open_interest REAL NOT NULL,
                    open_price REAL NOT NULL,
                    high_price REAL NOT NULL,
                    low_price REAL NOT NULL,
                    close_price REAL NOT NULL
                );",
            )
            .unwrap();
        s.ensure_schema().unwrap();

        let out = s.upsert_batch(&[bar("600519", "2024-01-02", 100.0)]).unwrap();
        assert_eq!(out.written, 1);

        let stored = s.bars(key("600519")).unwrap();
        assert_eq!(stored[0].turnover, Some(0.0));
        assert_eq!(stored[0].gateway_name, "DB");
        assert_eq!(stored[0].extra, None);
    }
}
