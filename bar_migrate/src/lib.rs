//! Migrates daily equity bars from the ingestion store (`daily_data`) into the trading
//! platform's bar store (`dbbardata`).
//!
//! Pipeline: [`symbol`] resolves each ticker to its exchange, [`transform`] validates and
//! converts rows, [`target`] writes them idempotently, and [`sync`] drives a run and
//! reports on it.

#![deny(missing_docs)]

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod obs;
#[allow(missing_docs)]
pub mod schema;
pub mod source;
pub mod symbol;
pub mod sync;
pub mod target;
pub mod transform;
pub mod tz;

pub use error::{Issue, MigrateError, SetupError};
pub use sync::{RunReport, SyncMode, SyncOptions, SyncService};
