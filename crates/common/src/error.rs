use serde::Serialize;
use thiserror::Error;

/// Failures that halt a refresh. None of them is fatal to the host process;
/// the next refresh starts from scratch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("schema mismatch: missing {missing:?}, found columns {found:?}")]
    SchemaMismatch {
        missing: Vec<String>,
        found: Vec<String>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LedgerError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable(_) => "source_unavailable",
            Self::SchemaMismatch { .. } => "schema_mismatch",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Per-row problems found during ingestion. These never halt the pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordIssue {
    #[error("row {row}: unparsable date {raw:?} for {name}")]
    InvalidDate { row: usize, name: String, raw: String },

    #[error("row {row}: skipped, {reason}")]
    UnidentifiedRecord { row: usize, reason: String },

    /// A payout row still counts as a payout event when its amount is unusable.
    #[error("row {row}: payout for {name} has unusable amount {raw:?}, counted with zero amount")]
    InvalidPayoutAmount { row: usize, name: String, raw: String },
}

impl RecordIssue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidDate { .. } => "invalid_date",
            Self::UnidentifiedRecord { .. } => "unidentified_record",
            Self::InvalidPayoutAmount { .. } => "invalid_payout_amount",
        }
    }

    pub fn row(&self) -> usize {
        match self {
            Self::InvalidDate { row, .. }
            | Self::UnidentifiedRecord { row, .. }
            | Self::InvalidPayoutAmount { row, .. } => *row,
        }
    }
}
