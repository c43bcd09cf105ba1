use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::domain::{Account, AccountId, Cents, Transaction};

use super::locks::{AccountHold, AccountLocks};
use super::store::{AtomicScope, LedgerStore, StoreError, StoreResult};

#[derive(Default)]
struct MemoryState {
    accounts: BTreeMap<AccountId, Account>,
    transactions: Vec<Transaction>,
    next_account_id: AccountId,
}

/// In-memory balance store and transaction log.
///
/// Scopes stage their effects and publish them under a single write lock on
/// commit, so readers see a transfer either entirely or not at all.
///
/// Like SQLite, one scope at a time may write: the writer turn is taken at the
/// first staged effect and kept until commit or drop, so ledger ids and
/// timestamps are handed out in commit order.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    locks: AccountLocks,
    writer: Arc<Mutex<()>>,
    next_transaction_id: Arc<AtomicI64>,
    fail_commits: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent commit fail with a backend error until reset.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of accounts currently held by open scopes.
    pub fn held_accounts(&self) -> usize {
        self.locks.active()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    type Scope = MemoryScope;

    async fn open_account(&self, name: &str, opening_balance: Cents) -> StoreResult<Account> {
        if opening_balance < 0 {
            return Err(anyhow::anyhow!(
                "Opening balance cannot be negative: {}",
                opening_balance
            )
            .into());
        }

        let mut state = self.state.write().await;
        state.next_account_id += 1;
        let mut account = Account::new(name, opening_balance);
        account.id = state.next_account_id;
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        Ok(self.state.read().await.accounts.get(&id).cloned())
    }

    async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        Ok(self.state.read().await.accounts.values().cloned().collect())
    }

    async fn query_by_account(&self, id: AccountId) -> StoreResult<Vec<Transaction>> {
        let state = self.state.read().await;
        let mut history: Vec<Transaction> = state
            .transactions
            .iter()
            .filter(|tx| tx.involves(id))
            .cloned()
            .collect();
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(history)
    }

    async fn list_transactions(&self) -> StoreResult<Vec<Transaction>> {
        let mut all = self.state.read().await.transactions.clone();
        all.sort_by_key(|tx| tx.id);
        Ok(all)
    }

    async fn begin(&self) -> StoreResult<MemoryScope> {
        Ok(MemoryScope {
            store: self.clone(),
            holds: Vec::new(),
            writer: None,
            balances: HashMap::new(),
            deltas: Vec::new(),
            entries: Vec::new(),
        })
    }
}

pub struct MemoryScope {
    store: MemoryStore,
    holds: Vec<AccountHold>,
    writer: Option<OwnedMutexGuard<()>>,
    balances: HashMap<AccountId, Cents>,
    deltas: Vec<(AccountId, Cents)>,
    entries: Vec<Transaction>,
}

impl MemoryScope {
    async fn take_writer_turn(&mut self) {
        if self.writer.is_none() {
            self.writer = Some(self.store.writer.clone().lock_owned().await);
        }
    }
}

#[async_trait]
impl AtomicScope for MemoryScope {
    async fn acquire_exclusive(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        if !self.holds.iter().any(|h| h.account_id() == id) {
            let hold = self.store.locks.acquire(id).await;
            self.holds.push(hold);
        }

        let mut account = self.store.get_account(id).await?;
        if let Some(account) = account.as_mut() {
            // Reflect anything this scope has already staged.
            let balance = *self.balances.entry(id).or_insert(account.balance);
            account.balance = balance;
        }
        Ok(account)
    }

    async fn apply_delta(&mut self, id: AccountId, delta: Cents) -> StoreResult<()> {
        let balance = *self.balances.get(&id).ok_or(StoreError::NotHeld(id))?;
        let updated = balance
            .checked_add(delta)
            .filter(|b| *b >= 0)
            .ok_or(StoreError::NegativeBalance {
                account: id,
                balance,
                delta,
            })?;

        self.take_writer_turn().await;
        self.balances.insert(id, updated);
        self.deltas.push((id, delta));
        Ok(())
    }

    async fn append(
        &mut self,
        from_id: AccountId,
        to_id: AccountId,
        amount: Cents,
    ) -> StoreResult<Transaction> {
        self.take_writer_turn().await;
        let id = self.store.next_transaction_id.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = Transaction {
            id,
            from_id,
            to_id,
            amount,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    async fn commit(self) -> StoreResult<()> {
        if self.store.fail_commits.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("injected commit failure").into());
        }

        let mut state = self.store.state.write().await;
        for (id, delta) in &self.deltas {
            let account = state
                .accounts
                .get_mut(id)
                .ok_or_else(|| anyhow::anyhow!("Account {} vanished while held", id))?;
            account.balance += delta;
        }
        state.transactions.extend(self.entries);
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}
