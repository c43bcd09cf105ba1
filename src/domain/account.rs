use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Cents;

pub type AccountId = i64;

/// A named account holding a non-negative balance.
///
/// Accounts are provisioned outside of the transfer engine; the engine only
/// ever changes `balance`, and only through a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    /// Current balance in cents (never negative once committed)
    pub balance: Cents,
    /// Balance the account was opened with, used to replay the ledger
    pub opening_balance: Cents,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create an account that has not been persisted yet. The id is assigned by the store.
    pub fn new(name: impl Into<String>, opening_balance: Cents) -> Self {
        Self {
            id: 0,
            name: name.into(),
            balance: opening_balance,
            opening_balance,
            created_at: Utc::now(),
        }
    }

    pub fn can_cover(&self, amount: Cents) -> bool {
        self.balance >= amount
    }
}

/// Returns true if `id` can name a persisted account.
pub fn is_valid_account_id(id: AccountId) -> bool {
    id > 0
}
