use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};

use crate::domain::{
    Account, AccountId, Cents, IntegrityReport, Transaction, TransferStage,
    build_integrity_report, is_valid_account_id,
};
use crate::storage::{AtomicScope, LedgerStore, SqliteStore, StoreError};

use super::{EngineConfig, LedgerError};

/// The transfer engine: the only component allowed to move funds.
///
/// Every transfer runs inside one atomic scope of the injected store. Holds on
/// both accounts are taken in ascending id order before any balance is read
/// for validation, so two transfers sharing an account are serialized and can
/// never wait on each other in a cycle.
pub struct LedgerEngine<S: LedgerStore> {
    store: S,
    config: EngineConfig,
}

impl LedgerEngine<SqliteStore> {
    /// Open (creating if needed) a SQLite database at the given path.
    pub async fn init(database_path: &str, config: EngineConfig) -> Result<Self, LedgerError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let store = SqliteStore::init(&db_url).await?;
        Ok(Self::with_config(store, config))
    }

    /// Connect to an existing SQLite database.
    pub async fn connect(database_path: &str, config: EngineConfig) -> Result<Self, LedgerError> {
        let db_url = format!("sqlite:{}", database_path);
        let store = SqliteStore::connect(&db_url).await?;
        Ok(Self::with_config(store, config))
    }
}

impl<S: LedgerStore> LedgerEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Shut down the underlying store.
    pub async fn close(self) {
        self.store.close().await;
    }

    // ========================
    // Account operations
    // ========================

    /// Provision a new account with an opening balance.
    pub async fn open_account(
        &self,
        name: &str,
        opening_balance: Cents,
    ) -> Result<Account, LedgerError> {
        if name.trim().is_empty() {
            return Err(LedgerError::InvalidInput(
                "Account name cannot be empty".to_string(),
            ));
        }
        if opening_balance < 0 {
            return Err(LedgerError::InvalidInput(format!(
                "Opening balance cannot be negative: {}",
                opening_balance
            )));
        }

        let account = self
            .store
            .open_account(name, opening_balance)
            .await
            .map_err(storage_error)?;
        info!(account_id = account.id, name = %account.name, "Opened account");
        Ok(account)
    }

    /// Read the committed state of an account.
    pub async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        validate_account_id(id)?;
        self.store
            .get_account(id)
            .await
            .map_err(storage_error)?
            .ok_or(LedgerError::AccountNotFound(id))
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        self.store.list_accounts().await.map_err(storage_error)
    }

    /// Committed ledger entries involving the account, most recent first.
    /// An account with no history (or no account at all) yields an empty list.
    pub async fn get_transaction_history(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, LedgerError> {
        validate_account_id(account_id)?;
        let history = self
            .store
            .query_by_account(account_id)
            .await
            .map_err(storage_error)?;
        debug!(account_id, entries = history.len(), "Fetched transaction history");
        Ok(history)
    }

    /// Verify committed balances against the ledger.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, LedgerError> {
        let accounts = self.list_accounts().await?;
        let transactions = self
            .store
            .list_transactions()
            .await
            .map_err(storage_error)?;
        Ok(build_integrity_report(&accounts, &transactions))
    }

    // ========================
    // Transfer operations
    // ========================

    /// Move `amount` cents from one account to another.
    ///
    /// Either the debit, the credit and the ledger entry all become durable
    /// together, or none of them do. Returns the new ledger entry.
    #[tracing::instrument(skip(self))]
    pub async fn transfer_funds(
        &self,
        from_id: AccountId,
        to_id: AccountId,
        amount: Cents,
    ) -> Result<Transaction, LedgerError> {
        validate_transfer(from_id, to_id, amount)?;

        let mut scope = self
            .store
            .begin()
            .await
            .map_err(|e| LedgerError::aborted(TransferStage::Started, e))?;
        debug!(stage = %TransferStage::Started, "Opened atomic scope");

        match self.run_transfer(&mut scope, from_id, to_id, amount).await {
            Ok(entry) => {
                if let Err(e) = scope.commit().await {
                    warn!(
                        stage = %TransferStage::Aborted,
                        error = %e,
                        "Commit failed, transfer rolled back"
                    );
                    return Err(LedgerError::aborted(TransferStage::LogAppended, e));
                }
                info!(
                    stage = %TransferStage::Committed,
                    transaction_id = entry.id,
                    "Transfer committed"
                );
                Ok(entry)
            }
            Err(err) => {
                if let Err(e) = scope.rollback().await {
                    warn!(error = %e, "Rollback failed; scope discarded on drop");
                }
                let stage = TransferStage::Aborted;
                match &err {
                    LedgerError::InvariantViolation(msg) => {
                        error!(%stage, %msg, "Transfer violated a ledger invariant")
                    }
                    other => warn!(%stage, error = %other, "Transfer rejected"),
                }
                Err(err)
            }
        }
    }

    /// Everything between opening and committing the scope. On error the
    /// caller discards the scope, so no effect staged here survives.
    async fn run_transfer(
        &self,
        scope: &mut S::Scope,
        from_id: AccountId,
        to_id: AccountId,
        amount: Cents,
    ) -> Result<Transaction, LedgerError> {
        let deadline = Instant::now() + self.config.lock_timeout;
        let (first, second) = lock_order(from_id, to_id);

        let first_account = self.acquire(scope, first, deadline).await?;
        let second_account = self.acquire(scope, second, deadline).await?;
        debug!(stage = %TransferStage::LocksAcquired, first, second, "Holds acquired");

        let (sender, receiver) = if first == from_id {
            (first_account, second_account)
        } else {
            (second_account, first_account)
        };
        let sender = sender.ok_or(LedgerError::AccountNotFound(from_id))?;
        receiver.ok_or(LedgerError::AccountNotFound(to_id))?;

        if !sender.can_cover(amount) {
            return Err(LedgerError::InsufficientFunds {
                account: from_id,
                balance: sender.balance,
                required: amount,
            });
        }
        debug!(stage = %TransferStage::Validated, balance = sender.balance, "Transfer validated");

        scope
            .apply_delta(from_id, -amount)
            .await
            .map_err(|e| mutation_error(TransferStage::Validated, e))?;
        scope
            .apply_delta(to_id, amount)
            .await
            .map_err(|e| mutation_error(TransferStage::Validated, e))?;
        debug!(stage = %TransferStage::Mutated, "Balances updated");

        let entry = scope
            .append(from_id, to_id, amount)
            .await
            .map_err(|e| mutation_error(TransferStage::Mutated, e))?;
        debug!(stage = %TransferStage::LogAppended, transaction_id = entry.id, "Ledger entry appended");

        Ok(entry)
    }

    async fn acquire(
        &self,
        scope: &mut S::Scope,
        id: AccountId,
        deadline: Instant,
    ) -> Result<Option<Account>, LedgerError> {
        match timeout_at(deadline, scope.acquire_exclusive(id)).await {
            Ok(Ok(account)) => Ok(account),
            Ok(Err(e)) => Err(LedgerError::aborted(TransferStage::Started, e)),
            Err(_) => Err(LedgerError::aborted(
                TransferStage::Started,
                format!(
                    "timed out after {:?} waiting for account {}",
                    self.config.lock_timeout, id
                ),
            )),
        }
    }
}

/// Holds are always taken lowest id first.
pub fn lock_order(a: AccountId, b: AccountId) -> (AccountId, AccountId) {
    if a <= b { (a, b) } else { (b, a) }
}

fn validate_account_id(id: AccountId) -> Result<(), LedgerError> {
    if !is_valid_account_id(id) {
        return Err(LedgerError::InvalidInput(format!(
            "Account ID must be positive, got {}",
            id
        )));
    }
    Ok(())
}

fn validate_transfer(
    from_id: AccountId,
    to_id: AccountId,
    amount: Cents,
) -> Result<(), LedgerError> {
    validate_account_id(from_id)?;
    validate_account_id(to_id)?;
    if from_id == to_id {
        return Err(LedgerError::InvalidInput(format!(
            "Cannot transfer from account {} to itself",
            from_id
        )));
    }
    if amount <= 0 {
        return Err(LedgerError::InvalidInput(format!(
            "Amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

fn mutation_error(stage: TransferStage, err: StoreError) -> LedgerError {
    match err {
        StoreError::NotHeld(_) | StoreError::NegativeBalance { .. } => {
            LedgerError::InvariantViolation(err.to_string())
        }
        StoreError::Backend(e) => LedgerError::aborted(stage, e),
    }
}

fn storage_error(err: StoreError) -> LedgerError {
    match err {
        StoreError::Backend(e) => LedgerError::Storage(e),
        other => LedgerError::Storage(other.into()),
    }
}
