//! Diesel row types for the two stores.
//!
//! - [`DailyDataRow`] reads [`crate::schema::daily_data`] (source, read-only).
//! - [`NewBarRow`] writes and [`StoredBar`] reads [`crate::schema::dbbardata`] (target).
//!
//! Conversion to and from the domain types in [`crate::transform`] lives here so the
//! transformer stays free of storage concerns.

use diesel::prelude::*;

use crate::schema::{daily_data, dbbardata};
use crate::transform::{SourceBar, TargetBar};
use crate::tz;

/// A row of `daily_data`.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = daily_data, check_for_backend(diesel::sqlite::Sqlite))]
pub struct DailyDataRow {
    /// Source-native symbol.
    pub symbol: String,
    /// Trading date text.
    pub date: String,
    /// Opening price.
    pub open: Option<f64>,
    /// Highest price.
    pub high: Option<f64>,
    /// Lowest price.
    pub low: Option<f64>,
    /// Closing price.
    pub close: Option<f64>,
    /// Volume in the source unit.
    pub volume: Option<f64>,
    /// Traded value.
    pub amount: Option<f64>,
    /// Turnover rate.
    pub turnover_rate: Option<f64>,
}

impl From<DailyDataRow> for SourceBar {
    fn from(r: DailyDataRow) -> Self {
        SourceBar {
            symbol: r.symbol,
            date: r.date,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            volume: r.volume,
            amount: r.amount,
            turnover_rate: r.turnover_rate,
        }
    }
}

/// `gateway_name` written with every bar.
pub const GATEWAY_NAME: &str = "DB";

/// Insertable form of a [`TargetBar`].
#[derive(Debug, Insertable)]
#[diesel(table_name = dbbardata, treat_none_as_default_value = false)]
pub struct NewBarRow<'a> {
    /// Six-digit code.
    pub symbol: &'a str,
    /// `SSE` / `SZSE`.
    pub exchange: &'static str,
    /// Wall-clock text in the market zone.
    pub datetime: String,
    /// `1d`.
    pub interval: &'static str,
    /// Volume in shares.
    pub volume: f64,
    /// Traded value.
    pub turnover: Option<f64>,
    /// Always 0 for equities.
    pub open_interest: f64,
    /// Opening price.
    pub open_price: f64,
    /// Highest price.
    pub high_price: f64,
    /// Lowest price.
    pub low_price: f64,
    /// Closing price.
    pub close_price: f64,
    /// Origin tag the platform keeps per bar.
    pub gateway_name: &'static str,
    /// JSON object, NULL when there is no metadata.
    pub extra: Option<String>,
}

impl<'a> NewBarRow<'a> {
    /// Map a bar to its stored form.
    pub fn from_bar(bar: &'a TargetBar) -> serde_json::Result<Self> {
        let extra = if bar.extra.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&bar.extra)?)
        };
        Ok(NewBarRow {
            symbol: &bar.symbol,
            exchange: bar.exchange.as_str(),
            datetime: tz::to_db_string(&bar.datetime),
            interval: bar.interval.as_str(),
            volume: bar.volume,
            turnover: bar.turnover,
            open_interest: 0.0,
            open_price: bar.open,
            high_price: bar.high,
            low_price: bar.low,
            close_price: bar.close,
            gateway_name: GATEWAY_NAME,
            extra,
        })
    }
}

/// A bar as read back from `dbbardata`.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = dbbardata, check_for_backend(diesel::sqlite::Sqlite))]
pub struct StoredBar {
    /// Six-digit code.
    pub symbol: String,
    /// `SSE` / `SZSE`.
    pub exchange: String,
    /// Wall-clock text in the market zone.
    pub datetime: String,
    /// `1d`.
    pub interval: String,
    /// Volume in shares.
    pub volume: f64,
    /// Traded value.
    pub turnover: Option<f64>,
    /// Opening price.
    pub open_price: f64,
    /// Highest price.
    pub high_price: f64,
    /// Lowest price.
    pub low_price: f64,
    /// Closing price.
    pub close_price: f64,
    /// Origin tag.
    pub gateway_name: String,
    /// JSON metadata.
    pub extra: Option<String>,
}
