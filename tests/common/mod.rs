// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use fundflow::application::{EngineConfig, LedgerEngine};
use fundflow::domain::{Account, Cents};
use fundflow::storage::{LedgerStore, MemoryStore, SqliteStore};
use tempfile::TempDir;

/// Helper to create an engine over a temporary SQLite database
pub async fn test_engine() -> Result<(LedgerEngine<SqliteStore>, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let engine = LedgerEngine::init(db_path.to_str().unwrap(), EngineConfig::default()).await?;
    Ok((engine, temp_dir))
}

/// Helper to create an engine over the in-memory store
pub fn memory_engine() -> LedgerEngine<MemoryStore> {
    LedgerEngine::new(MemoryStore::new())
}

/// Open accounts in order; with a fresh store they get ids 1, 2, 3, ...
pub async fn open_accounts<S: LedgerStore>(
    engine: &LedgerEngine<S>,
    accounts: &[(&str, Cents)],
) -> Result<Vec<Account>> {
    let mut opened = Vec::with_capacity(accounts.len());
    for (name, balance) in accounts {
        opened.push(engine.open_account(name, *balance).await?);
    }
    Ok(opened)
}

/// Test fixture: Alice and Bob
pub struct StandardAccounts;

impl StandardAccounts {
    /// Alice (id 1) with 1000.00 and Bob (id 2) with 500.00
    pub async fn alice_and_bob<S: LedgerStore>(engine: &LedgerEngine<S>) -> Result<()> {
        open_accounts(engine, &[("Alice", 100000), ("Bob", 50000)]).await?;
        Ok(())
    }

    /// Alice (id 1) with only 100.00 and Bob (id 2) with 500.00
    pub async fn poor_alice_and_bob<S: LedgerStore>(engine: &LedgerEngine<S>) -> Result<()> {
        open_accounts(engine, &[("Alice", 10000), ("Bob", 50000)]).await?;
        Ok(())
    }
}

/// Balances of the given accounts, in order
pub async fn balances<S: LedgerStore>(
    engine: &LedgerEngine<S>,
    ids: &[i64],
) -> Result<Vec<Cents>> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        out.push(engine.get_account(*id).await?.balance);
    }
    Ok(out)
}
