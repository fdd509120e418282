//! Batching of queued settlements.

use crate::environment::{Environment, EnvironmentConfig, Payout};
use eyre::Result;
use settler::{config::WorkerConfig, settle::Settlement};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn five_payouts_settle_in_two_transactions() -> Result<()> {
    let mut config = EnvironmentConfig::default();
    config.settlement.worker = WorkerConfig {
        batch_size: 3,
        wait_countdown: 3,
        wait_interval: Duration::from_secs(1),
        ..Default::default()
    };
    let env = Environment::setup_with_config(config).await?;

    let payouts: Vec<_> = (1..=5).map(Payout::new).collect();
    for payout in &payouts {
        env.worker.submit(Settlement::new(payout.clone()));
    }
    env.settle().await;

    // the full batch goes out right away
    assert_eq!(env.chain.sent().len(), 1);
    assert_eq!(env.worker.pending_count(), 0);

    // the partial batch waits for more payouts first
    tokio::time::sleep(Duration::from_millis(3500)).await;
    let sent = env.chain.sent();
    assert_eq!(sent.iter().map(|tx| tx.nonce).collect::<Vec<_>>(), vec![0, 1]);

    // hooks are reported to the head of each batch
    assert_eq!(payouts[0].updates().len(), 2);
    assert!(payouts[1].updates().is_empty());
    assert_eq!(payouts[3].updates().len(), 2);
    assert_eq!(env.worker.monitor().nonces().await?, vec![0, 1]);

    Ok(())
}
