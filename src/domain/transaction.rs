use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, Cents};

pub type TransactionId = i64;

/// A ledger entry recording one committed transfer.
/// Entries are append-only: they are never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Monotonically increasing, assigned by the store
    pub id: TransactionId,
    /// Sender (balance decreases)
    pub from_id: AccountId,
    /// Receiver (balance increases)
    pub to_id: AccountId,
    /// Amount in cents (always positive)
    pub amount: Cents,
    /// Assigned by the store when the entry is written
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Returns true if the account is the sender or the receiver of this entry.
    pub fn involves(&self, account_id: AccountId) -> bool {
        self.from_id == account_id || self.to_id == account_id
    }

    /// Signed effect of this entry on the given account's balance.
    pub fn delta_for(&self, account_id: AccountId) -> Cents {
        if self.to_id == account_id {
            self.amount
        } else if self.from_id == account_id {
            -self.amount
        } else {
            0
        }
    }
}

/// Stages a single transfer attempt moves through.
///
/// Only `Committed` and `Aborted` are ever observable from outside the engine;
/// the intermediate stages are reported in logs and in abort errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStage {
    Started,
    LocksAcquired,
    Validated,
    Mutated,
    LogAppended,
    Committed,
    Aborted,
}

impl TransferStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStage::Started => "started",
            TransferStage::LocksAcquired => "locks_acquired",
            TransferStage::Validated => "validated",
            TransferStage::Mutated => "mutated",
            TransferStage::LogAppended => "log_appended",
            TransferStage::Committed => "committed",
            TransferStage::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for TransferStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
