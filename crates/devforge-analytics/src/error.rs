//! Analytics-pipeline error taxonomy (spec §7: `StorageFailure` is logged
//! and absorbed, never surfaced to an invocation caller).

use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("storage backend failed: {0}")]
    StorageFailure(#[source] anyhow::Error),

    #[error("export failed: {0}")]
    ExportFailure(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
