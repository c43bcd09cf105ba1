use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};

use crate::domain::{Account, AccountId, Cents, Transaction};

use super::locks::{AccountHold, AccountLocks};
use super::store::{AtomicScope, LedgerStore, StoreError, StoreResult};
use super::MIGRATION_001_INITIAL;

/// How long a writer waits on SQLite's own write lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed balance store and transaction log.
///
/// Exclusive holds live in-process, so a database file must be owned by a
/// single `SqliteStore` (and its clones) at a time.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    locks: AccountLocks,
}

impl SqliteStore {
    /// Create a new store with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: AccountLocks::new(),
        }
    }

    /// Connect to a SQLite database URL (e.g. `sqlite:ledger.db?mode=rwc`).
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let store = Self::connect(database_url).await?;
        store.migrate().await?;
        Ok(store)
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account> {
        let created_at_str: String = row.get("created_at");

        Ok(Account {
            id: row.get("id"),
            name: row.get("name"),
            balance: row.get("balance"),
            opening_balance: row.get("opening_balance"),
            created_at: parse_timestamp(&created_at_str)?,
        })
    }

    fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
        let created_at_str: String = row.get("created_at");

        Ok(Transaction {
            id: row.get("id"),
            from_id: row.get("from_id"),
            to_id: row.get("to_id"),
            amount: row.get("amount"),
            created_at: parse_timestamp(&created_at_str)?,
        })
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    type Scope = SqliteScope;

    async fn open_account(&self, name: &str, opening_balance: Cents) -> StoreResult<Account> {
        if opening_balance < 0 {
            return Err(anyhow::anyhow!(
                "Opening balance cannot be negative: {}",
                opening_balance
            )
            .into());
        }

        let mut account = Account::new(name, opening_balance);
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO accounts (name, balance, opening_balance, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&account.name)
        .bind(account.balance)
        .bind(account.opening_balance)
        .bind(format_timestamp(account.created_at))
        .fetch_one(&self.pool)
        .await
        .context("Failed to save account")?;

        account.id = id;
        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, balance, opening_balance, created_at
            FROM accounts
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_account(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        let rows = sqlx::query(
            "SELECT id, name, balance, opening_balance, created_at FROM accounts ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list accounts")?;

        Ok(rows
            .iter()
            .map(Self::row_to_account)
            .collect::<Result<Vec<_>>>()?)
    }

    async fn query_by_account(&self, id: AccountId) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, from_id, to_id, amount, created_at
            FROM transactions
            WHERE from_id = ? OR to_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(id)
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch transaction history")?;

        Ok(rows
            .iter()
            .map(Self::row_to_transaction)
            .collect::<Result<Vec<_>>>()?)
    }

    async fn list_transactions(&self) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query(
            "SELECT id, from_id, to_id, amount, created_at FROM transactions ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions")?;

        Ok(rows
            .iter()
            .map(Self::row_to_transaction)
            .collect::<Result<Vec<_>>>()?)
    }

    async fn begin(&self) -> StoreResult<SqliteScope> {
        Ok(SqliteScope {
            pool: self.pool.clone(),
            locks: self.locks.clone(),
            tx: None,
            holds: Vec::new(),
            balances: HashMap::new(),
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Atomic scope over a SQLite database.
///
/// The SQL transaction is opened at the first write: a deferred transaction
/// that reads before writing cannot wait for SQLite's write lock, while one
/// that starts with a write goes through the busy handler. Balances are read
/// under the in-process hold, so nothing can change them in between.
pub struct SqliteScope {
    pool: SqlitePool,
    locks: AccountLocks,
    tx: Option<sqlx::Transaction<'static, Sqlite>>,
    holds: Vec<AccountHold>,
    balances: HashMap<AccountId, Cents>,
}

impl SqliteScope {
    async fn writer(&mut self) -> StoreResult<&mut sqlx::Transaction<'static, Sqlite>> {
        if self.tx.is_none() {
            let tx = self
                .pool
                .begin()
                .await
                .context("Failed to begin transaction")?;
            self.tx = Some(tx);
        }
        self.tx
            .as_mut()
            .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("transaction not started")))
    }
}

#[async_trait]
impl AtomicScope for SqliteScope {
    async fn acquire_exclusive(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        if !self.holds.iter().any(|h| h.account_id() == id) {
            let hold = self.locks.acquire(id).await;
            self.holds.push(hold);
        }

        let query = sqlx::query(
            "SELECT id, name, balance, opening_balance, created_at FROM accounts WHERE id = ?",
        )
        .bind(id);
        let row = match self.tx.as_mut() {
            Some(tx) => query.fetch_optional(&mut **tx).await,
            None => query.fetch_optional(&self.pool).await,
        }
        .context("Failed to fetch held account")?;

        let account = row.as_ref().map(SqliteStore::row_to_account).transpose()?;
        if let Some(account) = &account {
            self.balances.insert(id, account.balance);
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

        let tx = self.writer().await?;
        let result = sqlx::query("UPDATE accounts SET balance = ? WHERE id = ? AND balance = ?")
            .bind(updated)
            .bind(id)
            .bind(balance)
            .execute(&mut **tx)
            .await
            .with_context(|| format!("Failed to update balance of account {}", id))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "Balance of account {} changed while held",
                id
            )));
        }

        self.balances.insert(id, updated);
        Ok(())
    }

    async fn append(
        &mut self,
        from_id: AccountId,
        to_id: AccountId,
        amount: Cents,
    ) -> StoreResult<Transaction> {
        let created_at = Utc::now();
        let tx = self.writer().await?;
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO transactions (from_id, to_id, amount, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(from_id)
        .bind(to_id)
        .bind(amount)
        .bind(format_timestamp(created_at))
        .fetch_one(&mut **tx)
        .await
        .context("Failed to record transaction")?;

        Ok(Transaction {
            id,
            from_id,
            to_id,
            amount,
            created_at: truncate_to_micros(created_at),
        })
    }

    async fn commit(mut self) -> StoreResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await.context("Failed to commit transaction")?;
        }
        // Holds drop with `self`, after the commit is durable.
        Ok(())
    }

    async fn rollback(mut self) -> StoreResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback()
                .await
                .context("Failed to roll back transaction")?;
        }
        Ok(())
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    // Fixed width, so text order is chronological order.
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    parse_timestamp(&format_timestamp(ts)).unwrap_or(ts)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp: {}", s))?
        .with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_text_sorts_chronologically() {
        let early = DateTime::parse_from_rfc3339("2024-01-01T10:00:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = DateTime::parse_from_rfc3339("2024-01-01T10:00:05.120500Z")
            .unwrap()
            .with_timezone(&Utc);

        assert!(format_timestamp(early) < format_timestamp(later));
        assert_eq!(parse_timestamp(&format_timestamp(later)).unwrap(), later);
    }
}
