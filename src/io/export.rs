use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

use crate::application::LedgerEngine;
use crate::domain::{Account, AccountId, Transaction};
use crate::storage::LedgerStore;

/// Account statement for JSON export
#[derive(Debug, Clone, Serialize)]
pub struct HistorySnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub account_id: AccountId,
    pub transactions: Vec<Transaction>,
}

/// Exporter for writing ledger data to CSV or JSON
pub struct Exporter<'a, S: LedgerStore> {
    engine: &'a LedgerEngine<S>,
}

impl<'a, S: LedgerStore> Exporter<'a, S> {
    pub fn new(engine: &'a LedgerEngine<S>) -> Self {
        Self { engine }
    }

    /// Export an account's history to CSV, most recent first
    pub async fn export_history_csv<W: Write>(
        &self,
        account_id: AccountId,
        writer: W,
    ) -> Result<usize> {
        let history = self.engine.get_transaction_history(account_id).await?;
        write_transactions_csv(&history, writer)
    }

    /// Export an account's history as a JSON document
    pub async fn export_history_json<W: Write>(
        &self,
        account_id: AccountId,
        mut writer: W,
    ) -> Result<HistorySnapshot> {
        let transactions = self.engine.get_transaction_history(account_id).await?;
        let snapshot = HistorySnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            account_id,
            transactions,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;

        Ok(snapshot)
    }

    /// Export all accounts with their balances to CSV
    pub async fn export_accounts_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let accounts = self.engine.list_accounts().await?;
        write_accounts_csv(&accounts, writer)
    }

    /// Export all accounts as a JSON array
    pub async fn export_accounts_json<W: Write>(&self, mut writer: W) -> Result<usize> {
        let accounts = self.engine.list_accounts().await?;
        serde_json::to_writer_pretty(&mut writer, &accounts)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(accounts.len())
    }
}

pub fn write_transactions_csv<W: Write>(transactions: &[Transaction], writer: W) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["id", "from_id", "to_id", "amount_cents", "created_at"])?;

    for tx in transactions {
        csv_writer.write_record(&[
            tx.id.to_string(),
            tx.from_id.to_string(),
            tx.to_id.to_string(),
            tx.amount.to_string(),
            tx.created_at.to_rfc3339(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(transactions.len())
}

pub fn write_accounts_csv<W: Write>(accounts: &[Account], writer: W) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["id", "name", "balance_cents"])?;

    for account in accounts {
        csv_writer.write_record(&[
            account.id.to_string(),
            account.name.clone(),
            account.balance.to_string(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(accounts.len())
}
