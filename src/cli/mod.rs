use std::io::stdout;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};

use crate::application::{EngineConfig, LedgerEngine, LedgerError};
use crate::domain::{AccountId, format_cents, parse_cents};
use crate::io::Exporter;
use crate::logging::init_logging;
use crate::storage::SqliteStore;

/// Fundflow - account balances with atomic transfers
#[derive(Parser)]
#[command(name = "fundflow")]
#[command(about = "Move funds between accounts with an immutable audit trail")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "FUNDFLOW_DATABASE", default_value = "fundflow.db")]
    pub database: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Maximum time a transfer waits for busy accounts, in milliseconds
    #[arg(long, global = true, default_value_t = 5000)]
    pub lock_timeout_ms: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Open a new account
    Open {
        /// Display name of the account
        name: String,

        /// Opening balance (e.g., "1000.00" or "1000")
        #[arg(short, long, default_value = "0")]
        balance: String,
    },

    /// Show a single account
    Account {
        /// Account ID
        id: AccountId,
    },

    /// List all accounts
    Accounts {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Transfer funds between two accounts
    Transfer {
        /// Amount to transfer (e.g., "450.00" or "450")
        amount: String,

        /// Sender account ID
        #[arg(long)]
        from: AccountId,

        /// Receiver account ID
        #[arg(long)]
        to: AccountId,
    },

    /// Show the transaction history of an account, most recent first
    History {
        /// Account ID
        id: AccountId,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Verify balances against the ledger
    Check,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig::default().with_lock_timeout(Duration::from_millis(self.lock_timeout_ms))
    }

    pub async fn run(self) -> Result<()> {
        init_logging(self.verbose);
        let config = self.engine_config();

        let engine = match self.command {
            Commands::Init => LedgerEngine::init(&self.database, config).await?,
            _ => LedgerEngine::connect(&self.database, config)
                .await
                .with_context(|| {
                    format!(
                        "Cannot open database '{}'. Run 'fundflow init' first",
                        self.database
                    )
                })?,
        };

        let result = run_command(&engine, &self.database, self.command).await;
        engine.close().await;
        result
    }
}

async fn run_command(
    engine: &LedgerEngine<SqliteStore>,
    database: &str,
    command: Commands,
) -> Result<()> {
    match command {
        Commands::Init => {
            println!("Database initialized: {}", database);
        }

        Commands::Open { name, balance } => {
            let opening =
                parse_cents(&balance).context("Invalid balance format. Use '1000.00' or '1000'")?;
            let account = engine.open_account(&name, opening).await?;
            println!(
                "Opened account {}: {} ({})",
                account.id,
                account.name,
                format_cents(account.balance)
            );
        }

        Commands::Account { id } => {
            let account = engine.get_account(id).await.map_err(describe)?;
            println!("Account: {}", account.name);
            println!("  ID:       {}", account.id);
            println!("  Balance:  {}", format_cents(account.balance));
            println!(
                "  Opened:   {}",
                account.created_at.format("%Y-%m-%d %H:%M:%S")
            );
        }

        Commands::Accounts {
            format: OutputFormat::Json,
        } => {
            Exporter::new(engine)
                .export_accounts_json(stdout().lock())
                .await
                .map_err(describe_export)?;
        }

        Commands::Accounts {
            format: OutputFormat::Csv,
        } => {
            Exporter::new(engine)
                .export_accounts_csv(stdout().lock())
                .await
                .map_err(describe_export)?;
        }

        Commands::Accounts {
            format: OutputFormat::Table,
        } => {
            let accounts = engine.list_accounts().await?;
            if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!("{:>6} {:<24} {:>14}", "ID", "NAME", "BALANCE");
                println!("{}", "-".repeat(46));
                for account in accounts {
                    println!(
                        "{:>6} {:<24} {:>14}",
                        account.id,
                        truncate(&account.name, 24),
                        format_cents(account.balance)
                    );
                }
            }
        }

        Commands::Transfer { amount, from, to } => {
            let amount_cents =
                parse_cents(&amount).context("Invalid amount format. Use '450.00' or '450'")?;
            let entry = engine
                .transfer_funds(from, to, amount_cents)
                .await
                .map_err(describe)?;
            println!(
                "Transferred {} from account {} to account {} (transaction {})",
                format_cents(entry.amount),
                entry.from_id,
                entry.to_id,
                entry.id
            );
        }

        Commands::History { id, format } => match format {
            OutputFormat::Json => {
                Exporter::new(engine)
                    .export_history_json(id, stdout().lock())
                    .await
                    .map_err(describe_export)?;
            }
            OutputFormat::Csv => {
                Exporter::new(engine)
                    .export_history_csv(id, stdout().lock())
                    .await
                    .map_err(describe_export)?;
            }
            OutputFormat::Table => {
                let history = engine.get_transaction_history(id).await.map_err(describe)?;
                if history.is_empty() {
                    println!("No transactions found.");
                } else {
                    println!(
                        "{:>6} {:<20} {:>6} {:>6} {:>14}",
                        "ID", "DATE", "FROM", "TO", "AMOUNT"
                    );
                    println!("{}", "-".repeat(56));
                    for tx in history {
                        let signed = format_cents(tx.delta_for(id));
                        println!(
                            "{:>6} {:<20} {:>6} {:>6} {:>14}",
                            tx.id,
                            tx.created_at.format("%Y-%m-%d %H:%M:%S"),
                            tx.from_id,
                            tx.to_id,
                            signed
                        );
                    }
                }
            }
        },

        Commands::Check => {
            println!("Checking ledger integrity...\n");
            let report = engine.check_integrity().await?;

            println!("Accounts:      {}", report.account_count);
            println!("Transactions:  {}", report.transaction_count);
            println!("Total balance: {}", format_cents(report.total_balance));
            println!(
                "Total opening: {}  {}",
                format_cents(report.total_opening),
                if report.is_conserved() { "OK" } else { "MISMATCH!" }
            );
            println!();

            if report.is_healthy() {
                println!("Ledger is consistent.");
            } else {
                println!("Issues found:");
                for issue in &report.issues {
                    println!("  - {}", issue);
                }
                bail!("ledger integrity check failed");
            }
        }
    }
    Ok(())
}

/// Turn an engine error into a user-facing message, one per outcome.
fn describe(err: LedgerError) -> anyhow::Error {
    match err {
        LedgerError::AccountNotFound(id) => anyhow::anyhow!("Account {} does not exist", id),
        LedgerError::InsufficientFunds {
            account,
            balance,
            required,
        } => anyhow::anyhow!(
            "Account {} has {} but the transfer needs {}",
            account,
            format_cents(balance),
            format_cents(required)
        ),
        LedgerError::InvalidInput(msg) => anyhow::anyhow!("Invalid request: {}", msg),
        err @ LedgerError::TransferAborted { .. } => {
            anyhow::anyhow!("{}. No funds were moved; it is safe to retry", err)
        }
        other => other.into(),
    }
}

/// Exports report engine failures through anyhow; keep their messages consistent.
fn describe_export(err: anyhow::Error) -> anyhow::Error {
    match err.downcast::<LedgerError>() {
        Ok(err) => describe(err),
        Err(err) => err,
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
