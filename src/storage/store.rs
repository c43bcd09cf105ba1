use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Account, AccountId, Cents, Transaction};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Account {0} is not held by this scope")]
    NotHeld(AccountId),

    #[error("Balance of account {account} would become negative: {balance} + ({delta})")]
    NegativeBalance {
        account: AccountId,
        balance: Cents,
        delta: Cents,
    },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage for account balances and the transaction log.
///
/// Reads observe committed state only. All mutation goes through an
/// [`AtomicScope`] obtained from [`LedgerStore::begin`].
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Scope: AtomicScope;

    /// Provision a new account. Not part of the transfer path.
    async fn open_account(&self, name: &str, opening_balance: Cents) -> StoreResult<Account>;

    async fn get_account(&self, id: AccountId) -> StoreResult<Option<Account>>;

    async fn list_accounts(&self) -> StoreResult<Vec<Account>>;

    /// Committed entries where the account is sender or receiver, most recent first.
    async fn query_by_account(&self, id: AccountId) -> StoreResult<Vec<Transaction>>;

    /// All committed entries, oldest first.
    async fn list_transactions(&self) -> StoreResult<Vec<Transaction>>;

    async fn begin(&self) -> StoreResult<Self::Scope>;

    async fn close(&self) {}
}

/// An all-or-nothing unit of work over balances and the transaction log.
///
/// Dropping a scope without calling [`AtomicScope::commit`] discards every
/// staged effect and releases every exclusive hold it took.
#[async_trait]
pub trait AtomicScope: Send {
    /// Take the exclusive hold on an account and return its committed state.
    /// Waits while another scope holds the same account.
    async fn acquire_exclusive(&mut self, id: AccountId) -> StoreResult<Option<Account>>;

    /// Change a held account's balance by `delta`.
    async fn apply_delta(&mut self, id: AccountId, delta: Cents) -> StoreResult<()>;

    /// Record a ledger entry; durable only once the scope commits.
    async fn append(
        &mut self,
        from_id: AccountId,
        to_id: AccountId,
        amount: Cents,
    ) -> StoreResult<Transaction>;

    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}
