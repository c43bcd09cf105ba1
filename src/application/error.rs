use thiserror::Error;

use crate::domain::{AccountId, Cents, TransferStage};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Insufficient funds in account {account}: balance {balance}, required {required}")]
    InsufficientFunds {
        account: AccountId,
        balance: Cents,
        required: Cents,
    },

    #[error("Transfer aborted at stage {stage}: {reason}")]
    TransferAborted { stage: TransferStage, reason: String },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl LedgerError {
    /// True when the same request may succeed if issued again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::TransferAborted { .. })
    }

    pub(crate) fn aborted(stage: TransferStage, reason: impl std::fmt::Display) -> Self {
        LedgerError::TransferAborted {
            stage,
            reason: reason.to_string(),
        }
    }
}
