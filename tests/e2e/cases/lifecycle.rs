//! Settlement life-cycle, from submission to a final status.

use crate::environment::{Environment, Event, Payout, Update};
use eyre::Result;
use settler::{
    chain::ChainError,
    settle::{Settlement, SettlementStatus},
};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn settles_and_confirms() -> Result<()> {
    let env = Environment::setup().await?;
    let payout = Payout::new(1);
    env.worker.submit(Settlement::new(payout.clone()));
    env.settle().await;

    let sent = env.chain.last_sent().unwrap();
    assert_eq!(sent.nonce, 0);
    assert_eq!(env.worker.working_nonce(), 1);

    // not executed yet
    assert_eq!(env.worker.monitor().update().await?, 0);

    // executed but not deep enough
    assert!(env.chain.mine(sent.hash, true));
    assert_eq!(env.worker.monitor().update().await?, 0);

    env.chain.advance_blocks(2);
    assert_eq!(env.worker.monitor().update().await?, 1);
    assert_eq!(env.worker.monitor().pending_count().await?, 0);

    assert_eq!(
        payout.updates(),
        vec![
            Update::Transaction(SettlementStatus::OffChainSettled, sent.hash, 0),
            Update::Status(SettlementStatus::OnChainSettled),
            Update::Status(SettlementStatus::OnChainConfirmed),
        ]
    );
    assert!(env.handler.events().is_empty());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn long_unexecuted_is_replaced_and_earlier_execution_is_reported() -> Result<()> {
    let env = Environment::setup().await?;
    let payout = Payout::new(1);
    env.worker.submit(Settlement::new(payout.clone()));
    env.settle().await;
    assert_eq!(env.worker.monitor().pending_count().await?, 1);
    let first = env.chain.last_sent().unwrap();

    env.chain.advance_blocks(12);
    assert_eq!(env.worker.monitor().update().await?, 0);
    env.settle().await;
    assert_eq!(env.worker.monitor().pending_count().await?, 1);

    let second = env.chain.last_sent().unwrap();
    assert_ne!(first.hash, second.hash);
    assert_eq!(second.nonce, 0);
    assert!(second.gas_price > first.gas_price);
    assert_eq!(env.handler.events(), vec![Event::LongUnexecuted(vec![1])]);

    // the original transaction wins the race
    env.chain.mine(first.hash, true);
    env.chain.advance_blocks(2);
    assert_eq!(env.worker.monitor().update().await?, 1);

    assert_eq!(
        payout.updates(),
        vec![
            Update::Transaction(SettlementStatus::OffChainSettled, first.hash, 0),
            Update::Status(SettlementStatus::OnChainSettled),
            Update::Transaction(SettlementStatus::OffChainSettled, second.hash, 0),
            Update::Status(SettlementStatus::OnChainSettled),
            Update::Transaction(SettlementStatus::OnChainSettled, first.hash, 0),
            Update::Status(SettlementStatus::OnChainConfirmed),
        ]
    );

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn confirms_in_nonce_order() -> Result<()> {
    let env = Environment::setup().await?;
    for id in [1, 2] {
        env.worker.submit(Settlement::new(Payout::new(id)));
        env.settle().await;
    }
    assert_eq!(env.worker.monitor().nonces().await?, vec![0, 1]);

    let sent = env.chain.sent();
    env.chain.mine(sent[1].hash, true);
    env.chain.advance_blocks(2);

    // nonce 0 blocks nonce 1
    assert_eq!(env.worker.monitor().update().await?, 0);

    env.chain.mine(sent[0].hash, true);
    env.chain.advance_blocks(2);
    assert_eq!(env.worker.monitor().update().await?, 2);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn execution_failure_pauses_the_pipeline() -> Result<()> {
    let env = Environment::setup().await?;
    let payout = Payout::new(1);
    env.worker.submit(Settlement::new(payout.clone()));
    env.settle().await;

    env.mine_last_and_confirm(false);
    assert_eq!(env.worker.monitor().update().await?, 0);
    assert!(env.worker.is_paused());
    assert_eq!(payout.statuses().last(), Some(&SettlementStatus::OnChainFailed));
    assert_eq!(env.handler.events(), vec![Event::Failure(vec![1])]);

    // nothing is sent until an operator resumes
    env.worker.submit(Settlement::new(Payout::new(2)));
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(env.chain.sent().len(), 1);

    env.worker.set_paused(false);
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(env.chain.sent().len(), 2);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn suppressed_failure_keeps_running() -> Result<()> {
    let env = Environment::setup().await?;
    let payout = Payout { suppress_failure: true, ..Payout::new(1) };
    env.worker.submit(Settlement::new(payout.clone()));
    env.settle().await;

    env.mine_last_and_confirm(false);
    env.worker.monitor().update().await?;
    assert!(!env.worker.is_paused());
    assert_eq!(payout.statuses().last(), Some(&SettlementStatus::OnChainFailed));
    assert!(env.handler.events().is_empty());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn mismatching_receipt_pauses_the_pipeline() -> Result<()> {
    let env = Environment::setup().await?;
    let payout = Payout { valid: false, ..Payout::new(1) };
    env.worker.submit(Settlement::new(payout.clone()));
    env.settle().await;

    env.mine_last_and_confirm(true);
    assert_eq!(env.worker.monitor().update().await?, 0);
    assert!(env.worker.is_paused());
    assert_eq!(
        payout.statuses().last(),
        Some(&SettlementStatus::OnChainReceiptValidationFailed)
    );
    assert_eq!(env.handler.events(), vec![Event::Failure(vec![1])]);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn full_pool_is_retried_after_pause_interval() -> Result<()> {
    let env = Environment::setup().await?;
    env.chain.push_send_error(ChainError::rejected(-32000, "txpool is full"));
    env.worker.submit(Settlement::new(Payout::new(1)));
    env.settle().await;

    assert!(env.chain.sent().is_empty());
    assert_eq!(env.handler.events(), vec![Event::PoolFull(vec![1])]);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(env.chain.last_sent().unwrap().nonce, 0);
    assert!(!env.worker.is_paused());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transport_errors_are_retried() -> Result<()> {
    let env = Environment::setup().await?;
    env.chain.push_send_error(ChainError::Transport("connection reset".into()));
    env.chain.push_send_error(ChainError::Transport("connection reset".into()));
    env.worker.submit(Settlement::new(Payout::new(1)));

    tokio::time::sleep(Duration::from_millis(2500)).await;
    let sent = env.chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].nonce, 0);
    assert!(env.handler.events().is_empty());

    Ok(())
}
