//! Read side: the ingestion store's `daily_data` table.
//!
//! The store is opened read-only and never written. Rows come back in ascending date
//! order; the date filter is a text comparison on ISO dates, so callers still re-check
//! parsed dates (see [`crate::sync`]).

use chrono::NaiveDate;
use diesel::prelude::*;

use crate::db::connection::connect_sqlite_read_only;
use crate::models::DailyDataRow;
use crate::schema::daily_data::dsl as dd;
use crate::transform::SourceBar;

/// Result type for store reads.
pub type StoreResult<T> = anyhow::Result<T>;

/// The source store contract consumed by the sync service.
pub trait SourceStore {
    /// Distinct symbols present in the store, sorted.
    fn list_symbols(&mut self) -> StoreResult<Vec<String>>;

    /// Rows of `symbol` dated strictly after `from_exclusive` (all rows when `None`),
    /// ascending by date.
    fn read_rows(
        &mut self,
        symbol: &str,
        from_exclusive: Option<NaiveDate>,
    ) -> StoreResult<Vec<SourceBar>>;

    /// Number of rows of `symbol` dated on or before `through`.
    fn count_rows_through(&mut self, symbol: &str, through: NaiveDate) -> StoreResult<u64>;
}

/// [`SourceStore`] over a SQLite file.
pub struct SqliteSourceStore {
    conn: SqliteConnection,
}

impl SqliteSourceStore {
    /// Open an existing source database read-only.
    pub fn open(path: &str) -> anyhow::Result<Self> {
        Ok(Self::from_connection(connect_sqlite_read_only(path)?))
    }

    /// Wrap an already open connection (tests use writable temp databases).
    pub fn from_connection(conn: SqliteConnection) -> Self {
        Self { conn }
    }
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl SourceStore for SqliteSourceStore {
    fn list_symbols(&mut self) -> StoreResult<Vec<String>> {
        let symbols = dd::daily_data
            .select(dd::symbol)
            .distinct()
            .order(dd::symbol.asc())
            .load::<String>(&mut self.conn)?;
        Ok(symbols)
    }

    fn read_rows(
        &mut self,
        symbol: &str,
        from_exclusive: Option<NaiveDate>,
    ) -> StoreResult<Vec<SourceBar>> {
        let mut query = dd::daily_data
            .filter(dd::symbol.eq(symbol))
            .select(DailyDataRow::as_select())
            .order(dd::date.asc())
            .into_boxed();
        if let Some(from) = from_exclusive {
            query = query.filter(dd::date.gt(iso(from)));
        }

        let rows = query.load::<DailyDataRow>(&mut self.conn)?;
        Ok(rows.into_iter().map(SourceBar::from).collect())
    }

    fn count_rows_through(&mut self, symbol: &str, through: NaiveDate) -> StoreResult<u64> {
        let n: i64 = dd::daily_data
            .filter(dd::symbol.eq(symbol))
            .filter(dd::date.le(iso(through)))
            .count()
            .get_result(&mut self.conn)?;
        Ok(n as u64)
    }
}
