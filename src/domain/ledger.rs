use std::collections::HashMap;

use serde::Serialize;

use super::{Account, AccountId, Cents, Transaction};

/// Compute the net effect of the ledger on every account it touches.
/// Returns a map of account_id -> (incoming - outgoing).
pub fn compute_net_flows(transactions: &[Transaction]) -> HashMap<AccountId, Cents> {
    let mut flows: HashMap<AccountId, Cents> = HashMap::new();

    for tx in transactions {
        *flows.entry(tx.from_id).or_insert(0) -= tx.amount;
        *flows.entry(tx.to_id).or_insert(0) += tx.amount;
    }

    flows
}

/// Result of verifying committed balances against the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub account_count: usize,
    pub transaction_count: usize,
    pub total_balance: Cents,
    pub total_opening: Cents,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }

    /// Sum of all balances equals sum of all opening balances.
    pub fn is_conserved(&self) -> bool {
        self.total_balance == self.total_opening
    }
}

/// Check committed accounts and ledger entries for consistency.
///
/// Every account must satisfy `opening + incoming - outgoing == balance`, no
/// balance may be negative, and every entry must be a positive amount moving
/// between two distinct, existing accounts.
pub fn build_integrity_report(
    accounts: &[Account],
    transactions: &[Transaction],
) -> IntegrityReport {
    let mut issues = Vec::new();
    let known: HashMap<AccountId, &Account> = accounts.iter().map(|a| (a.id, a)).collect();

    for tx in transactions {
        if tx.amount <= 0 {
            issues.push(format!("Transaction {} has non-positive amount {}", tx.id, tx.amount));
        }
        if tx.from_id == tx.to_id {
            issues.push(format!(
                "Transaction {} moves funds from account {} to itself",
                tx.id, tx.from_id
            ));
        }
        for id in [tx.from_id, tx.to_id] {
            if !known.contains_key(&id) {
                issues.push(format!(
                    "Transaction {} references missing account {}",
                    tx.id, id
                ));
            }
        }
    }

    let flows = compute_net_flows(transactions);
    for account in accounts {
        if account.balance < 0 {
            issues.push(format!(
                "Account {} ({}) has negative balance {}",
                account.id, account.name, account.balance
            ));
        }
        let expected = account.opening_balance + flows.get(&account.id).copied().unwrap_or(0);
        if expected != account.balance {
            issues.push(format!(
                "Account {} ({}) balance {} does not match ledger replay {}",
                account.id, account.name, account.balance, expected
            ));
        }
    }

    let total_balance: Cents = accounts.iter().map(|a| a.balance).sum();
    let total_opening: Cents = accounts.iter().map(|a| a.opening_balance).sum();
    if total_balance != total_opening {
        issues.push(format!(
            "Total balance {} differs from total opening balance {}",
            total_balance, total_opening
        ));
    }

    IntegrityReport {
        account_count: accounts.len(),
        transaction_count: transactions.len(),
        total_balance,
        total_opening,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn account(id: AccountId, opening: Cents, balance: Cents) -> Account {
        Account {
            id,
            name: format!("acct-{}", id),
            balance,
            opening_balance: opening,
            created_at: Utc::now(),
        }
    }

    fn tx(id: i64, from_id: AccountId, to_id: AccountId, amount: Cents) -> Transaction {
        Transaction {
            id,
            from_id,
            to_id,
            amount,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_net_flows_sum_to_zero() {
        let ledger = vec![tx(1, 1, 2, 1000), tx(2, 2, 3, 500), tx(3, 3, 1, 200)];
        let flows = compute_net_flows(&ledger);

        assert_eq!(flows.get(&1), Some(&-800));
        assert_eq!(flows.get(&2), Some(&500));
        assert_eq!(flows.get(&3), Some(&300));
        assert_eq!(flows.values().sum::<Cents>(), 0);
    }

    #[test]
    fn test_healthy_ledger() {
        let accounts = vec![account(1, 100000, 55000), account(2, 50000, 95000)];
        let ledger = vec![tx(1, 1, 2, 45000)];

        let report = build_integrity_report(&accounts, &ledger);
        assert!(report.is_healthy(), "{:?}", report.issues);
        assert!(report.is_conserved());
        assert_eq!(report.total_balance, 150000);
    }

    #[test]
    fn test_detects_balance_drift() {
        let accounts = vec![account(1, 100000, 60000), account(2, 50000, 95000)];
        let ledger = vec![tx(1, 1, 2, 45000)];

        let report = build_integrity_report(&accounts, &ledger);
        assert!(!report.is_healthy());
        assert!(!report.is_conserved());
        assert!(report.issues.iter().any(|i| i.contains("ledger replay")));
    }

    #[test]
    fn test_detects_dangling_reference() {
        let accounts = vec![account(1, 1000, 1000)];
        let ledger = vec![tx(1, 1, 99, 0)];

        let report = build_integrity_report(&accounts, &ledger);
        assert!(report.issues.iter().any(|i| i.contains("missing account 99")));
        assert!(report.issues.iter().any(|i| i.contains("non-positive")));
    }
}
