//! SQLite connection helpers.
//!
//! The target store is opened with [`connect_sqlite`], which creates missing parent
//! directories and applies WAL journaling plus a 5000ms busy_timeout. The source store is
//! owned by the ingestion side, so [`connect_sqlite_read_only`] opens it through a
//! `mode=ro` URI: a missing file is an error instead of a freshly created empty database.

use std::path::Path;

use anyhow::{Context, bail};
use diesel::{Connection, RunQueryDsl, SqliteConnection, sql_query};

/// Open a writable SQLite connection and apply connection-wide PRAGMAs.
///
/// `database_url` is a file path or `:memory:`.
pub fn connect_sqlite(database_url: &str) -> anyhow::Result<SqliteConnection> {
    if database_url != ":memory:" {
        if let Some(parent) = Path::new(database_url).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create parent directory {}", parent.display()))?;
            }
        }
    }

    let mut conn = SqliteConnection::establish(database_url)
        .with_context(|| format!("open sqlite database {database_url}"))?;

    sql_query("PRAGMA journal_mode=WAL;").execute(&mut conn)?;
    sql_query("PRAGMA busy_timeout=5000;").execute(&mut conn)?;
    Ok(conn)
}

/// Open an existing SQLite database read-only.
pub fn connect_sqlite_read_only(path: &str) -> anyhow::Result<SqliteConnection> {
    if !Path::new(path).is_file() {
        bail!("sqlite database not found: {path}");
    }

    let uri = format!("file:{}?mode=ro", encode_uri_path(path));
    let mut conn =
        SqliteConnection::establish(&uri).with_context(|| format!("open sqlite database {path}"))?;

    sql_query("PRAGMA busy_timeout=5000;").execute(&mut conn)?;
    Ok(conn)
}

// '?' and '#' end the path part of an sqlite URI, '%' starts an escape.
fn encode_uri_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '%' => out.push_str("%25"),
            '?' => out.push_str("%3f"),
            '#' => out.push_str("%23"),
            _ => out.push(c),
        }
    }
    out
}
