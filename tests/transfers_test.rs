mod common;

use anyhow::Result;
use common::{StandardAccounts, balances, memory_engine, test_engine};
use fundflow::application::LedgerError;

#[tokio::test]
async fn test_transfer_moves_funds_and_records_entry() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    StandardAccounts::alice_and_bob(&engine).await?;

    let entry = engine.transfer_funds(1, 2, 45000).await?;
    assert_eq!(entry.from_id, 1);
    assert_eq!(entry.to_id, 2);
    assert_eq!(entry.amount, 45000);

    assert_eq!(engine.get_account(1).await?.balance, 55000);
    assert_eq!(engine.get_account(2).await?.balance, 95000);

    let history = engine.get_transaction_history(1).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(
        (history[0].from_id, history[0].to_id, history[0].amount),
        (1, 2, 45000)
    );
    assert_eq!(history[0], entry);

    Ok(())
}

#[tokio::test]
async fn test_transfer_conserves_total() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    StandardAccounts::alice_and_bob(&engine).await?;

    let before: i64 = balances(&engine, &[1, 2]).await?.iter().sum();
    engine.transfer_funds(1, 2, 12345).await?;
    engine.transfer_funds(2, 1, 99).await?;
    let after: i64 = balances(&engine, &[1, 2]).await?.iter().sum();

    assert_eq!(before, after);
    Ok(())
}

#[tokio::test]
async fn test_insufficient_funds_changes_nothing() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    StandardAccounts::poor_alice_and_bob(&engine).await?;

    let err = engine.transfer_funds(1, 2, 45000).await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientFunds {
            account: 1,
            balance: 10000,
            required: 45000
        }
    ));

    assert_eq!(balances(&engine, &[1, 2]).await?, vec![10000, 50000]);
    assert!(engine.get_transaction_history(1).await?.is_empty());
    assert!(engine.get_transaction_history(2).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_transfer_of_entire_balance_is_allowed() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    StandardAccounts::poor_alice_and_bob(&engine).await?;

    engine.transfer_funds(1, 2, 10000).await?;
    assert_eq!(balances(&engine, &[1, 2]).await?, vec![0, 60000]);

    let err = engine.transfer_funds(1, 2, 1).await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

    Ok(())
}

#[tokio::test]
async fn test_transfer_to_missing_account() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    StandardAccounts::alice_and_bob(&engine).await?;

    let err = engine.transfer_funds(1, 999, 5000).await.unwrap_err();
    assert!(matches!(err, LedgerError::AccountNotFound(999)));
    assert_eq!(engine.get_account(1).await?.balance, 100000);
    assert!(engine.get_transaction_history(1).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_transfer_from_missing_account() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    StandardAccounts::alice_and_bob(&engine).await?;

    // The missing sender sorts after the receiver in lock order.
    let err = engine.transfer_funds(999, 1, 5000).await.unwrap_err();
    assert!(matches!(err, LedgerError::AccountNotFound(999)));
    assert_eq!(engine.get_account(1).await?.balance, 100000);

    Ok(())
}

#[tokio::test]
async fn test_get_missing_account() -> Result<()> {
    let (engine, _temp) = test_engine().await?;

    let err = engine.get_account(42).await.unwrap_err();
    assert!(matches!(err, LedgerError::AccountNotFound(42)));

    Ok(())
}

#[tokio::test]
async fn test_get_account_returns_name_and_balance() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    StandardAccounts::alice_and_bob(&engine).await?;

    let alice = engine.get_account(1).await?;
    assert_eq!(alice.id, 1);
    assert_eq!(alice.name, "Alice");
    assert_eq!(alice.balance, 100000);

    Ok(())
}

#[tokio::test]
async fn test_invalid_input_is_rejected_before_any_effect() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    StandardAccounts::alice_and_bob(&engine).await?;

    for (from, to, amount) in [(1, 1, 5000), (1, 2, 0), (1, 2, -100), (0, 2, 100), (1, -3, 100)] {
        let err = engine.transfer_funds(from, to, amount).await.unwrap_err();
        assert!(
            matches!(err, LedgerError::InvalidInput(_)),
            "({}, {}, {}) gave {:?}",
            from,
            to,
            amount,
            err
        );
    }

    assert_eq!(balances(&engine, &[1, 2]).await?, vec![100000, 50000]);
    assert!(engine.get_transaction_history(1).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_reads_reject_non_positive_ids() -> Result<()> {
    let engine = memory_engine();

    assert!(matches!(
        engine.get_account(0).await,
        Err(LedgerError::InvalidInput(_))
    ));
    assert!(matches!(
        engine.get_transaction_history(-1).await,
        Err(LedgerError::InvalidInput(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_history_is_empty_for_unknown_account() -> Result<()> {
    let (engine, _temp) = test_engine().await?;

    assert!(engine.get_transaction_history(77).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_history_matches_sender_or_receiver_most_recent_first() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    common::open_accounts(
        &engine,
        &[("Alice", 100000), ("Bob", 50000), ("Carol", 20000)],
    )
    .await?;

    let t1 = engine.transfer_funds(1, 2, 1000).await?;
    let t2 = engine.transfer_funds(2, 3, 2000).await?;
    let t3 = engine.transfer_funds(3, 1, 3000).await?;
    let t4 = engine.transfer_funds(2, 1, 4000).await?;

    let alice: Vec<i64> = engine
        .get_transaction_history(1)
        .await?
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(alice, vec![t4.id, t3.id, t1.id]);

    let carol = engine.get_transaction_history(3).await?;
    assert_eq!(
        carol.iter().map(|t| t.id).collect::<Vec<_>>(),
        vec![t3.id, t2.id]
    );
    assert!(carol.iter().all(|t| t.involves(3)));

    let bob = engine.get_transaction_history(2).await?;
    assert!(bob.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    assert_eq!(bob.len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_memory_store_behaves_like_sqlite() -> Result<()> {
    let engine = memory_engine();
    StandardAccounts::alice_and_bob(&engine).await?;

    engine.transfer_funds(1, 2, 45000).await?;
    assert_eq!(balances(&engine, &[1, 2]).await?, vec![55000, 95000]);

    let err = engine.transfer_funds(1, 2, 60000).await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    assert_eq!(engine.get_transaction_history(2).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_data_survives_reconnect() -> Result<()> {
    let (engine, temp) = test_engine().await?;
    StandardAccounts::alice_and_bob(&engine).await?;
    engine.transfer_funds(1, 2, 45000).await?;
    engine.close().await;

    let db_path = temp.path().join("test.db");
    let engine = fundflow::LedgerEngine::connect(
        db_path.to_str().unwrap(),
        fundflow::EngineConfig::default(),
    )
    .await?;

    assert_eq!(balances(&engine, &[1, 2]).await?, vec![55000, 95000]);
    assert_eq!(engine.get_transaction_history(1).await?.len(), 1);

    Ok(())
}
