//! Embedded migrations for the target layout.

use anyhow::anyhow;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{Integer, Text};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::info;

/// Embedded Diesel migrations bundled with this crate.
///
/// Every statement is `IF NOT EXISTS`, so applying them to a platform database that
/// already carries `dbbardata` only records the migration version.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Applies all pending migrations on an open connection.
pub fn run_pending(conn: &mut SqliteConnection) -> anyhow::Result<()> {
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!(e))?;
    Ok(())
}

/// Columns this crate writes that a `dbbardata` created by another tool may lack, with the
/// statement that adds each one.
const ADDED_COLUMNS: &[(&str, &str)] = &[
    (
        "gateway_name",
        "ALTER TABLE dbbardata ADD COLUMN gateway_name TEXT NOT NULL DEFAULT 'DB'",
    ),
    ("extra", "ALTER TABLE dbbardata ADD COLUMN extra TEXT"),
];

/// Constraints of the `dbbardata` actually found in the database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BarTableLayout {
    /// `turnover` is declared NOT NULL, so a missing turnover must be written as 0.
    pub turnover_required: bool,
}

#[derive(QueryableByName)]
struct ColumnInfo {
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Integer)]
    notnull: i32,
}

/// Brings a pre-existing `dbbardata` up to the columns [`crate::models::NewBarRow`] writes
/// and reports the constraints the writer has to honour.
///
/// Run after [`run_pending`]; on a table the migrations created this is a no-op.
pub fn adopt_bar_table(conn: &mut SqliteConnection) -> anyhow::Result<BarTableLayout> {
    let columns: Vec<ColumnInfo> =
        sql_query("SELECT name, \"notnull\" FROM pragma_table_info('dbbardata')").load(conn)?;
    if columns.is_empty() {
        anyhow::bail!("table dbbardata is missing");
    }

    for (name, ddl) in ADDED_COLUMNS {
        if !columns.iter().any(|c| c.name == *name) {
            info!(column = *name, "adding missing column to dbbardata");
            conn.batch_execute(ddl)?;
        }
    }

    Ok(BarTableLayout {
        turnover_required: columns
            .iter()
            .any(|c| c.name == "turnover" && c.notnull != 0),
    })
}

/// Opens the SQLite database at `url` (see [`crate::db::connection::connect_sqlite`]) and
/// applies all pending migrations.
pub fn run_sqlite(url: &str) -> anyhow::Result<()> {
    let mut conn = crate::db::connection::connect_sqlite(url)?;
    run_pending(&mut conn)
}
