//! Broadcasting sent transactions to redundant endpoints.

use crate::environment::{Environment, EnvironmentConfig, Payout};
use eyre::Result;
use settler::{
    chain::{ChainError, InMemoryChain},
    config::RelayConfig,
    settle::Settlement,
    transactions::TransactionRelayer,
};
use std::{sync::Arc, time::Duration};

async fn settle_one(env: &Environment, id: u64) {
    env.worker.submit(Settlement::new(Payout::new(id)));
    env.settle().await;
}

#[tokio::test(start_paused = true)]
async fn failing_endpoint_is_skipped_then_resumed() -> Result<()> {
    let backup = Arc::new(InMemoryChain::default());
    let relayer = TransactionRelayer::new(RelayConfig::default());
    relayer.add_endpoint("Backup", backup.clone());

    let config = EnvironmentConfig { relayer: Some(relayer.clone()), ..Default::default() };
    let env = Environment::setup_with_config(config).await?;

    for _ in 0..10 {
        backup.push_send_error(ChainError::Transport("connection refused".into()));
    }
    for id in 0..10 {
        assert!(!relayer.stats()["backup"].skipped);
        settle_one(&env, id).await;
    }

    let stats = relayer.stats()["backup"];
    assert!(stats.skipped);
    assert_eq!(stats.num_io_errors, 10);

    // skipped for five minutes
    settle_one(&env, 10).await;
    assert_eq!(relayer.stats()["backup"].num_total, 10);
    assert!(backup.sent().is_empty());

    tokio::time::sleep(Duration::from_secs(300)).await;
    settle_one(&env, 11).await;
    let stats = relayer.stats()["backup"];
    assert!(!stats.skipped);
    assert_eq!(stats.num_total, 11);
    assert_eq!(backup.last_sent().map(|tx| tx.nonce), Some(11));
    assert_eq!(env.chain.sent().len(), 12);

    Ok(())
}
