use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use bar_migrate::config::{self, MigrateConfig};
use bar_migrate::obs::{self, LogFormat};
use bar_migrate::source::SqliteSourceStore;
use bar_migrate::sync::{SyncMode, SyncService, VerifyMode};
use bar_migrate::target::SqliteTargetStore;
use bar_migrate::transform::VolumeUnit;
use bar_migrate::{RunReport, SetupError};

const DEFAULT_SOURCE_DB: &str = "stocks_eastmoney.db";
const DEFAULT_TARGET_DB: &str = "vnpy_data.db";

#[derive(Parser)]
#[command(
    version,
    about = "Sync daily bars from daily_data into the trading platform's dbbardata"
)]
struct Cli {
    /// TOML run configuration; flags override its values.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Source database (contains daily_data).
    #[arg(long, value_name = "PATH", env = "BAR_MIGRATE_SOURCE_DB")]
    source_db: Option<PathBuf>,

    /// Target database (dbbardata is created if missing, adopted otherwise).
    #[arg(long, value_name = "PATH", env = "BAR_MIGRATE_TARGET_DB")]
    target_db: Option<PathBuf>,

    /// Copy everything, or only rows after the latest stored bar.
    #[arg(long, value_enum)]
    mode: Option<SyncMode>,

    /// Symbols to sync, e.g. 600519 000001.SZ (default: all in source).
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    symbols: Option<Vec<String>>,

    /// Rows per symbol, earliest first.
    #[arg(long)]
    limit: Option<usize>,

    /// Only the first N symbols.
    #[arg(long)]
    max_symbols: Option<usize>,

    /// Unit of the source volume column.
    #[arg(long, value_enum)]
    volume_unit: Option<VolumeUnit>,

    /// Verify every synced symbol after the run.
    #[arg(long, conflicts_with = "verify_sample")]
    verify: bool,

    /// Verify an evenly spread sample of N symbols.
    #[arg(long, value_name = "N")]
    verify_sample: Option<usize>,

    /// Rows per write transaction.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Log filter, e.g. debug or bar_migrate=trace (BAR_MIGRATE_LOG takes precedence).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log line format on stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Cli {
    fn into_config(self) -> Result<MigrateConfig> {
        let mut cfg = match &self.config {
            Some(path) => config::load_config_path(path)?,
            None => MigrateConfig::default(),
        };

        if let Some(v) = self.source_db {
            cfg.source_db = Some(v);
        }
        if let Some(v) = self.target_db {
            cfg.target_db = Some(v);
        }
        if let Some(v) = self.mode {
            cfg.mode = v;
        }
        if let Some(v) = self.symbols {
            cfg.symbols = Some(v);
        }
        if let Some(v) = self.limit {
            cfg.limit = Some(v);
        }
        if let Some(v) = self.max_symbols {
            cfg.max_symbols = Some(v);
        }
        if let Some(v) = self.volume_unit {
            cfg.volume_unit = v;
        }
        if self.verify {
            cfg.verify = VerifyMode::All;
        }
        if let Some(n) = self.verify_sample {
            cfg.verify = VerifyMode::Sample(n);
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }

        config::normalize_config(&mut cfg).context("invalid arguments")?;
        Ok(cfg)
    }
}

#[derive(Serialize)]
struct Summary<'a> {
    source_db: String,
    target_db: String,
    #[serde(flatten)]
    report: &'a RunReport,
}

fn absolute(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    obs::init_tracing(&cli.log_level, cli.log_format)?;

    let cfg = cli.into_config()?;
    let source_path = cfg
        .source_db
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCE_DB));
    let target_path = cfg
        .target_db
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TARGET_DB));

    let source_str = source_path.to_string_lossy();
    let target_str = target_path.to_string_lossy();
    let source = SqliteSourceStore::open(&source_str).map_err(|source| SetupError::OpenSource {
        path: source_str.to_string(),
        source,
    })?;
    let target = SqliteTargetStore::open(&target_str).map_err(|source| SetupError::OpenTarget {
        path: target_str.to_string(),
        source,
    })?;

    let mut service = SyncService::new(source, target, cfg.sync_options());
    let report = service.run()?;

    let summary = Summary {
        source_db: absolute(&source_path),
        target_db: absolute(&target_path),
        report: &report,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed_and_every_flag_has_help() {
        let cmd = Cli::command();
        for arg in cmd.get_arguments() {
            let id = arg.get_id().as_str();
            if id == "help" || id == "version" {
                continue;
            }
            assert!(arg.get_help().is_some(), "--{id} has no help text");
        }
        cmd.debug_assert();
    }

    #[test]
    fn flags_override_the_mode() {
        let cli = Cli::try_parse_from(["bar-migrate", "--mode", "full", "--verify-sample", "3"])
            .unwrap();
        let cfg = cli.into_config().unwrap();
        assert_eq!(cfg.mode, SyncMode::Full);
        assert_eq!(cfg.verify, VerifyMode::Sample(3));
    }
}
