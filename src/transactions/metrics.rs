use metrics::{Counter, Gauge, Histogram};
use metrics_derive::Metrics;

/// Metrics for a [`SettlementWorker`](crate::transactions::SettlementWorker).
#[derive(Metrics)]
#[metrics(scope = "settlement")]
pub struct SettlementMetrics {
    /// Number of transactions sent with a fresh nonce.
    pub sent: Counter,
    /// Number of transactions sent again for an already sent settlement.
    pub resent: Counter,
    /// Number of confirmed settlements.
    pub confirmed: Counter,
    /// Number of settlements whose transaction failed on chain.
    pub failed: Counter,
    /// Number of transactions that stayed unexecuted for too long.
    pub long_unexecuted: Counter,
    /// Number of rejected broadcasts.
    pub send_errors: Counter,
    /// Number of items waiting to be sent.
    pub queued: Gauge,
    /// Number of settlements waiting for confirmation.
    pub pending: Gauge,
    /// Blocks between handing a transaction to the monitor and its execution.
    pub confirmation_blocks: Histogram,
}

/// Metrics of a single relay endpoint.
#[derive(Metrics)]
#[metrics(scope = "relay")]
pub struct RelayMetrics {
    /// Number of broadcasts.
    pub sent: Counter,
    /// Number of broadcasts rejected by the node.
    pub rpc_errors: Counter,
    /// Number of broadcasts that failed to reach the node.
    pub io_errors: Counter,
    /// Number of broadcasts that failed otherwise.
    pub unknown_errors: Counter,
    /// Number of times the endpoint was skipped.
    pub skipped: Counter,
}

/// Metrics of a [`HeartBeat`](crate::transactions::HeartBeat).
#[derive(Metrics)]
#[metrics(scope = "heartbeat")]
pub struct HeartBeatMetrics {
    /// Latest block number seen.
    pub block_number: Gauge,
    /// Number of failed beats.
    pub errors: Counter,
    /// Number of consecutive failed beats.
    pub consecutive_errors: Gauge,
}
