//! Error taxonomy of a migration run.
//!
//! Only [`SetupError`] aborts a run. Everything else is scoped to one symbol, one row or
//! one batch: the sync service converts it into an [`Issue`] on the run report and keeps
//! going.

use serde::Serialize;

use crate::symbol::SymbolError;
use crate::sync::verify::VerificationMismatch;
use crate::target::WriteError;
use crate::transform::ValidationError;

/// A store could not be opened or prepared; the run cannot start.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// The source store is missing or unreadable.
    #[error("cannot open source store {path}")]
    OpenSource {
        /// Configured location.
        path: String,
        /// Cause.
        #[source]
        source: anyhow::Error,
    },
    /// The target store cannot be opened or created.
    #[error("cannot open target store {path}")]
    OpenTarget {
        /// Configured location.
        path: String,
        /// Cause.
        #[source]
        source: anyhow::Error,
    },
    /// The bar table or its unique index cannot be created.
    #[error("cannot prepare target schema")]
    Schema(#[source] anyhow::Error),
    /// The source symbol listing failed.
    #[error("cannot enumerate source symbols")]
    ListSymbols(#[source] anyhow::Error),
}

/// Any failure a run can run into.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Fatal, see [`SetupError`].
    #[error(transparent)]
    FatalSetup(#[from] SetupError),
    /// The symbol maps to no exchange; the symbol is skipped.
    #[error(transparent)]
    UnresolvableSymbol(#[from] SymbolError),
    /// Reading a symbol's source rows failed; the symbol is skipped.
    #[error("cannot read source rows for {symbol}")]
    SourceRead {
        /// Symbol being read.
        symbol: String,
        /// Cause.
        #[source]
        source: anyhow::Error,
    },
    /// Reading the target cursor failed; the symbol is skipped.
    #[error("cannot read target state for {symbol}")]
    TargetRead {
        /// Symbol being read.
        symbol: String,
        /// Cause.
        #[source]
        source: anyhow::Error,
    },
    /// One row was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// One batch was rolled back.
    #[error(transparent)]
    Write(#[from] WriteError),
    /// The target does not hold what was handed to it.
    #[error(transparent)]
    VerificationMismatch(#[from] VerificationMismatch),
}

/// Pipeline step an [`Issue`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Store setup.
    Setup,
    /// Symbol mapping.
    Symbol,
    /// Source read.
    SourceRead,
    /// Target cursor read.
    TargetRead,
    /// Row validation.
    Validation,
    /// Batch write.
    Write,
    /// Post-run verification.
    Verification,
}

impl MigrateError {
    /// Step the error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            MigrateError::FatalSetup(_) => Stage::Setup,
            MigrateError::UnresolvableSymbol(_) => Stage::Symbol,
            MigrateError::SourceRead { .. } => Stage::SourceRead,
            MigrateError::TargetRead { .. } => Stage::TargetRead,
            MigrateError::Validation(_) => Stage::Validation,
            MigrateError::Write(_) => Stage::Write,
            MigrateError::VerificationMismatch(_) => Stage::Verification,
        }
    }
}

/// A non-fatal problem, as listed in the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    /// Symbol as given to the run.
    pub symbol: String,
    /// Where it happened.
    pub stage: Stage,
    /// Error chain, outermost first.
    pub message: String,
}

impl Issue {
    /// Record `err` against `symbol`.
    pub fn new(symbol: impl Into<String>, err: &MigrateError) -> Self {
        Self {
            symbol: symbol.into(),
            stage: err.stage(),
            message: error_chain(err),
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut cause = err.source();
    while let Some(e) = cause {
        message.push_str(": ");
        message.push_str(&e.to_string());
        cause = e.source();
    }
    message
}
