//! Database utilities for connections and schema migrations.
//!
//! This module provides:
//! - SQLite connection helpers: [`connection::connect_sqlite`] opens (and creates) a writable
//!   database with WAL journaling and a 5000ms busy_timeout; [`connection::connect_sqlite_read_only`]
//!   opens an existing database without ever creating or altering it.
//! - Embedded Diesel migrations for the target layout: [`migrate::run_pending`] and
//!   [`migrate::run_sqlite`].
//!
//! Example:
//! ```no_run
//! use bar_migrate::db::{connection, migrate};
//!
//! let db_path = std::env::temp_dir().join("bar_migrate_example.db");
//! let mut conn = connection::connect_sqlite(db_path.to_str().unwrap()).expect("connect");
//! migrate::run_pending(&mut conn).expect("migrations");
//! ```

pub mod connection;
pub mod migrate;
