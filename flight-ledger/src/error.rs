//! Errors surfaced by ledger computations.

use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

/// Per-computation failures. Per-record problems never land here; they become
/// [`crate::models::ProcessingNote`]s instead.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Client not found: {0}")]
    ClientNotFound(Uuid),

    #[error("Incomplete retrieval of {resource} at offset {offset} after {fetched} rows: {reason}")]
    IncompleteRetrieval {
        resource: &'static str,
        offset: usize,
        fetched: usize,
        reason: String,
    },

    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Store(#[from] AppError),
}

impl LedgerError {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::ClientNotFound(_) => "client_not_found",
            LedgerError::IncompleteRetrieval { .. } => "incomplete_retrieval",
            LedgerError::InvariantViolation(_) => "invariant_violation",
            LedgerError::InvalidQuery(_) => "invalid_query",
            LedgerError::Store(_) => "store_error",
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::ClientNotFound(id) => {
                AppError::NotFound(anyhow::anyhow!("Client {} not found", id))
            }
            LedgerError::InvalidQuery(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            LedgerError::Store(inner) => inner,
            err @ LedgerError::IncompleteRetrieval { .. } => {
                AppError::DatabaseError(anyhow::Error::new(err))
            }
            err @ LedgerError::InvariantViolation(_) => {
                AppError::InternalError(anyhow::Error::new(err))
            }
        }
    }
}
