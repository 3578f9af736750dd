use thiserror::Error;

use crate::domain::{Cents, LedgerId, PostingError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Ledger not found: {0}")]
    LedgerNotFound(String),

    #[error("Ledger already exists for {0}")]
    LedgerAlreadyExists(String),

    #[error("Invalid owner: {0}")]
    InvalidOwner(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid description: {0}")]
    InvalidDescription(String),

    #[error("Invalid purchase: {0}")]
    InvalidPurchase(String),

    #[error("Insufficient balance for this transaction: balance {balance}, required {required}")]
    InsufficientFunds { balance: Cents, required: Cents },

    #[error("Ledger {0} was modified concurrently, retry the operation")]
    ConcurrentModification(LedgerId),

    #[error("Ledger {0} is busy, timed out waiting for its lock")]
    LedgerBusy(LedgerId),

    #[error("Database error: {0}")]
    Persistence(#[from] anyhow::Error),
}

/// Coarse classification for whoever turns errors into responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or incomplete request; nothing was changed.
    ///
    /// Covers a non-positive amount as well as a missing description, owner,
    /// phone number or network (`InvalidAmount`, `InvalidDescription`,
    /// `InvalidOwner`, `InvalidPurchase`). Callers that only know an
    /// "invalid amount" class should map all of them to it.
    InvalidRequest,
    /// A debit would have driven the balance negative; nothing was changed
    InsufficientFunds,
    NotFound,
    /// Lost a race with another writer; safe to retry
    Conflict,
    /// Storage failure; the operation must be treated as not applied
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidAmount(_)
            | AppError::InvalidDescription(_)
            | AppError::InvalidPurchase(_)
            | AppError::InvalidOwner(_) => ErrorKind::InvalidRequest,
            AppError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            AppError::LedgerNotFound(_) => ErrorKind::NotFound,
            AppError::LedgerAlreadyExists(_)
            | AppError::ConcurrentModification(_)
            | AppError::LedgerBusy(_) => ErrorKind::Conflict,
            AppError::Persistence(_) => ErrorKind::Internal,
        }
    }

    /// True when repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::ConcurrentModification(_) | AppError::LedgerBusy(_)
        )
    }
}

impl From<PostingError> for AppError {
    fn from(err: PostingError) -> Self {
        match err {
            PostingError::NonPositiveAmount(_) => {
                AppError::InvalidAmount("Amount must be greater than 0".to_string())
            }
            PostingError::Overflow(_) => {
                AppError::InvalidAmount("Amount is too large for this wallet".to_string())
            }
            PostingError::EmptyDescription => {
                AppError::InvalidDescription("Description is required".to_string())
            }
            PostingError::InsufficientFunds { balance, requested } => AppError::InsufficientFunds {
                balance,
                required: requested,
            },
            err @ PostingError::OutOfOrder { .. } => AppError::Persistence(err.into()),
        }
    }
}
