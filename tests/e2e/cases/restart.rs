//! Nonce reconciliation after a restart.

use crate::environment::{Environment, EnvironmentConfig, Payout};
use alloy::{primitives::B256, signers::local::PrivateKeySigner};
use eyre::Result;
use settler::{
    chain::InMemoryChain,
    settle::{Settlement, SettlementStatus},
    storage::{SettlementStorage, StorageApi},
};
use std::sync::Arc;

async fn spawn_at_nonce(nonce: u64) -> Result<Environment> {
    let config = EnvironmentConfig::default();
    let chain = Arc::new(InMemoryChain::new(config.confirmations));
    chain.set_nonce(nonce);
    Environment::spawn(chain, SettlementStorage::in_memory(), PrivateKeySigner::random(), config)
        .await
}

#[tokio::test(start_paused = true)]
async fn mined_transaction_is_not_resent() -> Result<()> {
    let env = spawn_at_nonce(7).await?;
    let payout = Payout::new(1);
    env.worker.submit(Settlement::new(payout.clone()));
    env.settle().await;

    let sent = env.chain.last_sent().unwrap();
    assert_eq!(sent.nonce, 7);
    assert_eq!(env.storage.read_last_transaction().await?.map(|last| last.nonce), Some(7));
    env.chain.mine(sent.hash, true);

    let env = env.restart().await?;
    assert_eq!(env.worker.working_nonce(), 8);

    env.worker.submit(Settlement::restore(payout, SettlementStatus::OnChainSettled, sent.hash, 7));
    env.settle().await;
    assert_eq!(env.chain.sent().len(), 1);
    assert_eq!(env.worker.monitor().nonces().await?, vec![7]);

    env.chain.advance_blocks(2);
    assert_eq!(env.worker.monitor().update().await?, 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unknown_transaction_reuses_its_nonce() -> Result<()> {
    let config = EnvironmentConfig::default();
    let chain = Arc::new(InMemoryChain::new(config.confirmations));
    chain.set_nonce(7);

    // persisted right before a crash, never reached the node
    let storage = SettlementStorage::in_memory();
    let lost = B256::repeat_byte(9);
    storage.write_last_transaction(lost, 7).await?;

    let env = Environment::spawn(chain, storage, PrivateKeySigner::random(), config).await?;
    assert_eq!(env.worker.working_nonce(), 7);

    let payout = Payout::new(1);
    env.worker.submit(Settlement::restore(
        payout.clone(),
        SettlementStatus::OffChainSettled,
        lost,
        7,
    ));
    env.settle().await;

    let sent = env.chain.last_sent().unwrap();
    assert_eq!(sent.nonce, 7);
    assert_ne!(sent.hash, lost);
    assert_eq!(env.worker.working_nonce(), 8);
    assert_eq!(env.storage.read_last_transaction().await?.map(|last| last.tx_hash), Some(sent.hash));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pending_transaction_resumes_after_it() -> Result<()> {
    let env = spawn_at_nonce(3).await?;
    env.worker.submit(Settlement::new(Payout::new(1)));
    env.settle().await;
    let sent = env.chain.last_sent().unwrap();

    // known to the node but not mined, the pending nonce is not reported yet
    env.chain.set_pending_nonce(3);
    let env = env.restart().await?;
    assert_eq!(env.worker.working_nonce(), 4);
    assert_eq!(env.chain.sent(), vec![sent]);

    Ok(())
}
