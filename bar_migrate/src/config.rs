//! Run configuration: parsing, normalization, and loading.
//!
//! A TOML file describes one migration run. Every key is optional; command-line flags
//! override whatever the file sets.
//!
//! ```toml
//! source_db = "data/stock_data.db"
//! target_db = "~/.vntrader/database.db"
//! mode = "incremental"          # or "full"
//! symbols = ["600519", "000001.SZ"]
//! limit = 1000                  # rows per symbol
//! max_symbols = 50
//! volume_unit = "share"         # or "lot"
//! verify = { sample = 5 }       # or "off" / "all"
//! batch_size = 500
//! ```
//!
//! Entrypoints:
//! - Parse + normalize from a TOML string: [`load_config_str`]
//! - Parse + normalize from a file path: [`load_config_path`]

use std::{collections::HashSet, path::PathBuf};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::sync::{DEFAULT_BATCH_SIZE, SyncMode, SyncOptions, VerifyMode};
use crate::transform::VolumeUnit;

/// Contents of a run configuration file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct MigrateConfig {
    /// Ingestion store (read-only).
    pub source_db: Option<PathBuf>,
    /// Trading platform store (created if missing).
    pub target_db: Option<PathBuf>,
    /// Full or incremental.
    pub mode: SyncMode,
    /// Explicit symbols; absent means every symbol in the source.
    pub symbols: Option<Vec<String>>,
    /// Rows per symbol, earliest first.
    pub limit: Option<usize>,
    /// Number of symbols to process.
    pub max_symbols: Option<usize>,
    /// Unit of the source volume column.
    pub volume_unit: VolumeUnit,
    /// Post-run verification.
    pub verify: VerifyMode,
    /// Rows per write transaction.
    pub batch_size: usize,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            source_db: None,
            target_db: None,
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

impl MigrateConfig {
    /// Run options for the sync service.
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            mode: self.mode,
            symbols: self.symbols.clone(),
            limit: self.limit,
            max_symbols: self.max_symbols,
            volume_unit: self.volume_unit,
            verify: self.verify,
            batch_size: self.batch_size,
        }
    }
}

/// Summary of changes performed during normalization.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct NormalizationReport {
    /// Symbols that changed when trimming/uppercasing.
    pub symbols_rewritten: usize,
    /// Duplicate symbols removed.
    pub symbols_deduped: usize,
}

/// Normalize a config in place.
///
/// - Trim + uppercase symbols, drop duplicates keeping the first occurrence
/// - An empty symbol list means "every symbol"
///
/// Errors:
/// - Blank symbol entries
/// - `batch_size`, `limit`, `max_symbols` or a verification sample of zero
pub fn normalize_config(cfg: &mut MigrateConfig) -> anyhow::Result<NormalizationReport> {
    let mut report = NormalizationReport::default();

    if let Some(list) = cfg.symbols.take() {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(list.len());
        for raw in list {
            let s = raw.trim().to_uppercase();
            if s.is_empty() {
                bail!("symbol entries cannot be empty after trimming");
            }
            if s != raw {
                report.symbols_rewritten += 1;
            }
            if seen.insert(s.clone()) {
                out.push(s);
            } else {
                report.symbols_deduped += 1;
            }
        }
        if !out.is_empty() {
            cfg.symbols = Some(out);
        }
    }

    if cfg.batch_size == 0 {
        bail!("batch_size must be positive");
    }
    if cfg.limit == Some(0) {
        bail!("limit must be positive");
    }
    if cfg.max_symbols == Some(0) {
        bail!("max_symbols must be positive");
    }
    if cfg.verify == VerifyMode::Sample(0) {
        bail!("verification sample must be positive");
    }

    Ok(report)
}

/// Parse and normalize a config from a TOML string.
pub fn load_config_str(toml_str: &str) -> anyhow::Result<MigrateConfig> {
    let mut cfg: MigrateConfig = toml::from_str(toml_str).context("failed to parse config TOML")?;
    normalize_config(&mut cfg).context("invalid config")?;
    Ok(cfg)
}

/// Read a config file from disk, parse, and normalize it.
pub fn load_config_path(path: impl AsRef<std::path::Path>) -> anyhow::Result<MigrateConfig> {
    let text = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("read config file {}", path.as_ref().display()))?;
    load_config_str(&text)
}
